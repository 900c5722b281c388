//! Policy enforcement
//!
//! The [`PolicyEnforcer`] turns a [`PolicyContext`] into a [`PolicyDecision`]
//! against the store's current document:
//!
//! 1. target filter (resource types and environments)
//! 2. applicable rules (enabled, `match` satisfied) in ascending priority
//! 3. exceptions, then `when` conditions, per rule
//! 4. short-circuit or conflict strategy, then the default effect
//! 5. mutations when the final effect is allow
//! 6. one audit record
//!
//! Evaluation itself is synchronous; only the store and audit seams await.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use grcgate_core::{AuditLogger, AuditRecord, Effect, Error, Result};
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::condition::ConditionEvaluator;
use crate::context::{PolicyContext, PolicyDecision};
use crate::mutation::MutationApplier;
use crate::path::PathResolver;
use crate::rule::{PolicyDocument, PolicyMode, PolicyRule, PolicySpec};
use crate::store::PolicyStore;

/// Evaluates and enforces the current policy document
pub struct PolicyEnforcer {
    store: Arc<dyn PolicyStore>,
    audit: Arc<dyn AuditLogger>,
    resolver: Arc<PathResolver>,
    conditions: ConditionEvaluator,
    mutations: MutationApplier,

    /// Last snapshot that passed validation
    validated: RwLock<Option<Arc<PolicyDocument>>>,
}

impl PolicyEnforcer {
    pub fn new(store: Arc<dyn PolicyStore>, audit: Arc<dyn AuditLogger>) -> Self {
        Self::with_path_resolver(store, audit, Arc::new(PathResolver::new()))
    }

    /// Share a path resolver (and its compiled-path cache) with other components
    pub fn with_path_resolver(
        store: Arc<dyn PolicyStore>,
        audit: Arc<dyn AuditLogger>,
        resolver: Arc<PathResolver>,
    ) -> Self {
        Self {
            store,
            audit,
            conditions: ConditionEvaluator::new(Arc::clone(&resolver)),
            mutations: MutationApplier::new(Arc::clone(&resolver)),
            resolver,
            validated: RwLock::new(None),
        }
    }

    pub fn path_resolver(&self) -> &Arc<PathResolver> {
        &self.resolver
    }

    /// Evaluate the context. Mutations may be applied to `ctx.resource`.
    pub async fn evaluate(&self, ctx: &mut PolicyContext) -> Result<PolicyDecision> {
        self.run(ctx).await.map(|(_, decision)| decision)
    }

    pub async fn is_allowed(&self, ctx: &mut PolicyContext) -> Result<bool> {
        Ok(self.evaluate(ctx).await?.is_allowed())
    }

    /// Evaluate the context and reject denials with [`Error::Violation`].
    ///
    /// Documents in audit mode only log the denial and return the decision.
    pub async fn enforce(&self, ctx: &mut PolicyContext) -> Result<PolicyDecision> {
        let (policy, decision) = self.run(ctx).await?;

        if decision.is_allowed() {
            return Ok(decision);
        }

        let violation = decision.to_violation();
        match policy.spec.mode {
            PolicyMode::Enforce => Err(Error::Violation(violation)),
            PolicyMode::Audit => {
                warn!(
                    policy = %policy.metadata.name,
                    rule_id = %violation.rule_id,
                    resource_type = %ctx.resource_type,
                    action = %ctx.action,
                    message = %violation.message,
                    "policy denial not enforced (audit mode)"
                );
                Ok(decision)
            }
        }
    }

    async fn run(&self, ctx: &mut PolicyContext) -> Result<(Arc<PolicyDocument>, PolicyDecision)> {
        let started = Instant::now();

        let outcome = match self.snapshot().await {
            Ok(policy) => self.decide(&policy, ctx, Utc::now()).map(|d| (policy, d)),
            Err(e) => Err(e),
        };

        let (policy, decision) = match outcome {
            Ok(pair) => pair,
            Err(e) => {
                error!(
                    resource_type = %ctx.resource_type,
                    action = %ctx.action,
                    error = %e,
                    "policy evaluation failed"
                );
                return Err(e);
            }
        };

        let duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        debug!(
            policy = %policy.metadata.name,
            resource_type = %ctx.resource_type,
            action = %ctx.action,
            effect = %decision.effect,
            rule_id = decision.matched_rule_id.as_deref().unwrap_or("-"),
            duration_us,
            "policy decision"
        );

        let record = AuditRecord {
            timestamp: Utc::now(),
            action: ctx.action.clone(),
            environment: ctx.environment.clone(),
            resource_type: ctx.resource_type.clone(),
            effect: decision.effect,
            matched_rule_id: decision.matched_rule_id.clone(),
            policy_name: policy.metadata.name.clone(),
            policy_version: policy.metadata.version.clone(),
            duration_us,
        };
        if let Err(e) = self.audit.log_decision(&record).await {
            warn!(error = %e, "failed to record policy decision");
        }

        Ok((policy, decision))
    }

    /// Fetch the current document, validating each new snapshot once
    async fn snapshot(&self) -> Result<Arc<PolicyDocument>> {
        let policy = self.store.get_policy().await?;

        let known_good = self
            .validated
            .read()
            .as_ref()
            .map_or(false, |seen| Arc::ptr_eq(seen, &policy));
        if known_good {
            return Ok(policy);
        }

        if !self.store.validate_policy(&policy).await? {
            return Err(Error::invalid_policy(format!(
                "policy '{}' version '{}' failed validation",
                policy.metadata.name, policy.metadata.version
            )));
        }

        *self.validated.write() = Some(Arc::clone(&policy));
        Ok(policy)
    }

    /// Decide against a specific document at a given instant.
    ///
    /// No validation and no audit record; [`evaluate`](Self::evaluate) adds both.
    pub fn decide(
        &self,
        policy: &PolicyDocument,
        ctx: &mut PolicyContext,
        now: DateTime<Utc>,
    ) -> Result<PolicyDecision> {
        let spec = &policy.spec;

        if !spec.target.covers(ctx) {
            debug!(
                policy = %policy.metadata.name,
                resource_type = %ctx.resource_type,
                environment = %ctx.environment,
                "context outside policy target"
            );
            return Ok(PolicyDecision::fallback(spec.default_effect));
        }

        let mut applicable: Vec<&PolicyRule> = spec
            .rules
            .iter()
            .filter(|rule| rule.enabled && rule.matcher.matches(ctx))
            .collect();
        applicable.sort_by_key(|rule| rule.priority);

        let mut matched: Vec<&PolicyRule> = Vec::new();
        let mut staged: Vec<&PolicyRule> = Vec::new();
        let mut evaluated_ids = Vec::new();
        let mut decided: Option<&PolicyRule> = None;

        for rule in applicable {
            if let Some(exception) = active_exception(spec, rule, ctx, now) {
                debug!(rule_id = %rule.id, exception = %exception, "rule bypassed by exception");
                continue;
            }
            if !self.conditions.all_hold(&rule.when, &ctx.resource)? {
                continue;
            }

            evaluated_ids.push(rule.id.clone());
            match rule.effect {
                Effect::Mutate => staged.push(rule),
                _ if spec.execution.short_circuit => {
                    decided = Some(rule);
                    break;
                }
                _ => matched.push(rule),
            }
        }

        let winner = decided.or_else(|| spec.execution.conflict_strategy.resolve(&matched));
        let mut decision = match winner {
            Some(rule) => PolicyDecision::from_rule(rule),
            None => PolicyDecision::fallback(spec.default_effect),
        };
        decision.evaluated_rule_ids = evaluated_ids;

        if decision.is_allowed() {
            let mut changed = 0;
            for rule in staged.into_iter().chain(winner) {
                changed += self.mutations.apply(&rule.mutations, &mut ctx.resource)?;
            }
            decision.mutated = changed > 0;
        }

        Ok(decision)
    }
}

/// Id of the first unexpired exception that bypasses `rule` in this context
fn active_exception<'a>(
    spec: &'a PolicySpec,
    rule: &PolicyRule,
    ctx: &PolicyContext,
    now: DateTime<Utc>,
) -> Option<&'a str> {
    spec.exceptions
        .iter()
        .find(|e| e.bypasses(&rule.id) && !e.is_expired(now) && e.matcher.matches(ctx))
        .map(|e| e.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConflictStrategy, InMemoryPolicyStore, PolicyCondition, PolicyException, PolicyMutation};
    use chrono::Duration;
    use grcgate_core::{NoopAuditLogger, Value};
    use serde_json::json;

    fn enforcer(policy: PolicyDocument) -> PolicyEnforcer {
        PolicyEnforcer::new(Arc::new(InMemoryPolicyStore::new(policy)), Arc::new(NoopAuditLogger))
    }

    fn ctx(resource: serde_json::Value) -> PolicyContext {
        PolicyContext::new("create", "dev", "Evidence", Value::from(resource))
    }

    #[test]
    fn test_target_filter_uses_default_effect() {
        let mut policy = PolicyDocument::new("baseline", "1")
            .with_rule(PolicyRule::new("ALLOW_ALL", Effect::Allow));
        policy.spec.default_effect = Effect::Deny;
        policy.spec.target.resource_types = vec!["Risk".into()];

        let decision = enforcer(policy.clone())
            .decide(&policy, &mut ctx(json!({})), Utc::now())
            .unwrap();
        assert_eq!(decision.effect, Effect::Deny);
        assert!(decision.matched_rule_id.is_none());
    }

    #[test]
    fn test_mutations_wait_for_final_allow() {
        let mut policy = PolicyDocument::new("baseline", "1")
            .with_rule(
                PolicyRule::new("TAG", Effect::Mutate)
                    .priority(1)
                    .mutation(PolicyMutation::set("reviewed", true)),
            )
            .with_rule(PolicyRule::new("BLOCK", Effect::Deny).priority(2).when(PolicyCondition::equals("blocked", true)));
        policy.spec.execution.conflict_strategy = ConflictStrategy::DenyOverrides;

        let enforcer = enforcer(policy.clone());

        let mut denied = ctx(json!({ "blocked": true }));
        let decision = enforcer.decide(&policy, &mut denied, Utc::now()).unwrap();
        assert_eq!(decision.effect, Effect::Deny);
        assert!(!decision.mutated);
        assert_eq!(denied.resource.to_json(), json!({ "blocked": true }));

        let mut allowed = ctx(json!({ "blocked": false }));
        let decision = enforcer.decide(&policy, &mut allowed, Utc::now()).unwrap();
        assert_eq!(decision.effect, Effect::Allow);
        assert!(decision.matched_rule_id.is_none());
        assert_eq!(decision.evaluated_rule_ids, vec!["TAG".to_string()]);
        assert!(decision.mutated);
        assert_eq!(allowed.resource.to_json(), json!({ "blocked": false, "reviewed": true }));
    }

    #[test]
    fn test_exception_expiry_is_relative_to_now() {
        let now = Utc::now();
        let policy = PolicyDocument::new("baseline", "1")
            .with_rule(PolicyRule::new("DENY", Effect::Deny))
            .with_exception(PolicyException::new("WAIVER", ["DENY"], now + Duration::hours(1)));
        let enforcer = enforcer(policy.clone());

        let before = enforcer.decide(&policy, &mut ctx(json!({})), now).unwrap();
        assert_eq!(before.effect, Effect::Allow);

        let after = enforcer
            .decide(&policy, &mut ctx(json!({})), now + Duration::hours(2))
            .unwrap();
        assert_eq!(after.effect, Effect::Deny);
    }

    #[tokio::test]
    async fn test_invalid_document_is_an_error() {
        let policy = PolicyDocument::new("baseline", "1")
            .with_rule(PolicyRule::new("BAD", Effect::Deny).when(PolicyCondition::equals("a[", 1i64)));
        let err = enforcer(policy).evaluate(&mut ctx(json!({}))).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPolicy(_)));
    }
}
