//! GRC Gate Policy Engine
//!
//! Declarative policy-as-code for governance, risk and compliance records.
//!
//! A policy document is YAML and specifies:
//! - Rules (scope match, conditions over resource paths, effect)
//! - Mutations applied to allowed resources
//! - Time-bounded exceptions that bypass named rules
//! - How matching rules are combined (short-circuit, conflict strategy)

pub mod condition;
pub mod conflict;
pub mod context;
pub mod enforcer;
pub mod mutation;
pub mod path;
pub mod rule;
pub mod store;
pub mod validate;

pub use condition::{
    compile_pattern, ConditionEvaluator, ConditionOp, PolicyCondition, DEFAULT_PATTERN_CAPACITY,
};
pub use conflict::ConflictStrategy;
pub use context::{PolicyContext, PolicyDecision};
pub use enforcer::PolicyEnforcer;
pub use mutation::{MutationApplier, MutationOp, PolicyMutation};
pub use path::{CompiledPath, PathResolver, Segment, DEFAULT_CACHE_CAPACITY};
pub use rule::{
    ExecutionOrder, ExecutionSettings, PolicyDocument, PolicyException, PolicyMatch, PolicyMetadata,
    PolicyMode, PolicyRule, PolicySpec, PolicyTarget, PrincipalMatch, Remediation, ResourceMatch,
};
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use validate::{validate_policy, ValidationIssue};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::conflict::ConflictStrategy;
    pub use crate::context::{PolicyContext, PolicyDecision};
    pub use crate::enforcer::PolicyEnforcer;
    pub use crate::rule::{PolicyDocument, PolicyException, PolicyMatch, PolicyRule};
    pub use crate::store::{InMemoryPolicyStore, PolicyStore};
    pub use crate::{PolicyCondition, PolicyMutation};
}
