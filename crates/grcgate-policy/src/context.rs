//! Evaluation input and output

use grcgate_core::{Effect, PolicyViolation, Severity, Value};
use serde::{Deserialize, Serialize};

use crate::rule::PolicyRule;

/// Everything the engine knows about the operation being attempted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyContext {
    /// create, update, delete, submit, approve, ...
    pub action: String,

    /// dev, staging, prod, ...
    pub environment: String,

    pub resource_type: String,

    /// The resource under evaluation. Mutations are applied to it in place.
    pub resource: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principal_roles: Vec<String>,
}

impl PolicyContext {
    pub fn new(
        action: impl Into<String>,
        environment: impl Into<String>,
        resource_type: impl Into<String>,
        resource: impl Into<Value>,
    ) -> Self {
        Self {
            action: action.into(),
            environment: environment.into(),
            resource_type: resource_type.into(),
            resource: resource.into(),
            principal_id: None,
            principal_roles: Vec::new(),
        }
    }

    /// Attach the acting principal
    pub fn with_principal<I, S>(mut self, id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.principal_id = Some(id.into());
        self.principal_roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub effect: Effect,

    /// `None` when the document's default effect applied
    pub matched_rule_id: Option<String>,

    pub message: Option<String>,

    pub remediation_hint: Option<String>,

    /// Whether any mutation changed the resource
    pub mutated: bool,

    pub severity: Option<Severity>,

    /// Ids of every rule whose conditions held, in evaluation order
    #[serde(default)]
    pub evaluated_rule_ids: Vec<String>,
}

impl PolicyDecision {
    /// Decision produced when no rule decided
    pub fn fallback(effect: Effect) -> Self {
        Self {
            effect,
            matched_rule_id: None,
            message: None,
            remediation_hint: None,
            mutated: false,
            severity: None,
            evaluated_rule_ids: Vec::new(),
        }
    }

    /// Decision taken by a rule
    pub fn from_rule(rule: &PolicyRule) -> Self {
        Self {
            effect: rule.effect,
            matched_rule_id: Some(rule.id.clone()),
            message: non_empty(&rule.message),
            remediation_hint: non_empty(&rule.remediation.hint),
            mutated: false,
            severity: Some(rule.severity),
            evaluated_rule_ids: Vec::new(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.effect.is_allow()
    }

    /// Describe this decision as a violation, filling gaps with generic text
    pub fn to_violation(&self) -> PolicyViolation {
        PolicyViolation::new(
            self.matched_rule_id.as_deref().unwrap_or("unknown"),
            self.message.as_deref().unwrap_or("Policy violation"),
            self.remediation_hint.as_deref().unwrap_or("Contact administrator"),
        )
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
