//! Policy document and rule definitions

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use grcgate_core::{Effect, Severity};
use serde::{Deserialize, Serialize};

use crate::conflict::ConflictStrategy;
use crate::context::PolicyContext;
use crate::{PolicyCondition, PolicyMutation};

/// Wildcard accepted for resource types and environments
const WILDCARDS: [&str; 2] = ["*", "Any"];

fn is_wildcard(value: &str) -> bool {
    WILDCARDS.contains(&value)
}

/// A complete, versioned policy document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub metadata: PolicyMetadata,
    pub spec: PolicySpec,
}

impl PolicyDocument {
    /// Create an empty document with default settings
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            metadata: PolicyMetadata {
                name: name.into(),
                version: version.into(),
                created_at: Utc::now(),
            },
            spec: PolicySpec::default(),
        }
    }

    /// Load a document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a document from a file; `.json` files are read as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> grcgate_core::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_json = path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            Self::from_yaml(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| {
            grcgate_core::Error::invalid_policy(format!("{}: {}", path.display(), reason))
        })
    }

    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.spec.rules.push(rule);
        self
    }

    pub fn with_exception(mut self, exception: PolicyException) -> Self {
        self.spec.exceptions.push(exception);
        self
    }

    pub fn rule(&self, id: &str) -> Option<&PolicyRule> {
        self.spec.rules.iter().find(|r| r.id == id)
    }
}

/// Identity of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMetadata {
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Behaviour and content of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub mode: PolicyMode,

    /// Effect when no rule matches
    #[serde(default = "default_effect")]
    pub default_effect: Effect,

    #[serde(default)]
    pub execution: ExecutionSettings,

    #[serde(default)]
    pub target: PolicyTarget,

    /// Rules, in declaration order
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    #[serde(default)]
    pub exceptions: Vec<PolicyException>,
}

impl Default for PolicySpec {
    fn default() -> Self {
        Self {
            mode: PolicyMode::default(),
            default_effect: default_effect(),
            execution: ExecutionSettings::default(),
            target: PolicyTarget::default(),
            rules: Vec::new(),
            exceptions: Vec::new(),
        }
    }
}

/// Whether denials are enforced or only reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Denials reject the operation
    #[default]
    Enforce,
    /// Denials are logged, the operation proceeds
    Audit,
}

/// Rule evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOrder {
    /// Ascending priority, then declaration order
    #[default]
    Sequential,
}

/// How rules are walked and combined
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSettings {
    #[serde(default)]
    pub order: ExecutionOrder,

    /// Stop at the first matching allow/deny rule
    #[serde(default = "default_true")]
    pub short_circuit: bool,

    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            order: ExecutionOrder::default(),
            short_circuit: true,
            conflict_strategy: ConflictStrategy::default(),
        }
    }
}

/// Which contexts a document applies to at all
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTarget {
    /// Resource types covered; `Any` covers all
    #[serde(default = "any_resource")]
    pub resource_types: Vec<String>,

    /// Environments covered; empty covers all
    #[serde(default)]
    pub environments: Vec<String>,
}

impl PolicyTarget {
    pub fn covers(&self, ctx: &PolicyContext) -> bool {
        let type_covered = self
            .resource_types
            .iter()
            .any(|t| is_wildcard(t) || *t == ctx.resource_type);
        let env_covered =
            self.environments.is_empty() || self.environments.iter().any(|e| *e == ctx.environment);
        type_covered && env_covered
    }
}

impl Default for PolicyTarget {
    fn default() -> Self {
        Self {
            resource_types: any_resource(),
            environments: Vec::new(),
        }
    }
}

/// A single rule within a policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Stable identifier, referenced by decisions and exceptions
    pub id: String,

    /// Lower runs first
    #[serde(default)]
    pub priority: i32,

    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "match", default)]
    pub matcher: PolicyMatch,

    /// Conditions, all of which must hold
    #[serde(default)]
    pub when: Vec<PolicyCondition>,

    pub effect: Effect,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub remediation: Remediation,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutations: Vec<PolicyMutation>,

    /// Free-form labels carried through for reporting
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl PolicyRule {
    /// Create an enabled rule that matches every resource
    pub fn new(id: impl Into<String>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            enabled: true,
            matcher: PolicyMatch::default(),
            when: Vec::new(),
            effect,
            message: String::new(),
            remediation: Remediation::default(),
            severity: Severity::default(),
            mutations: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn matching(mut self, matcher: PolicyMatch) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn when(mut self, condition: PolicyCondition) -> Self {
        self.when.push(condition);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.remediation.hint = hint.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn mutation(mut self, mutation: PolicyMutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Guidance shown to the user when a rule denies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Remediation {
    #[serde(default)]
    pub hint: String,
}

/// Scope of a rule or exception
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyMatch {
    #[serde(default)]
    pub resource: ResourceMatch,

    /// `*` matches every environment
    #[serde(default = "wildcard")]
    pub environment: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<PrincipalMatch>,
}

impl PolicyMatch {
    /// Match every resource in every environment
    pub fn any() -> Self {
        Self::default()
    }

    /// Match one resource type in every environment
    pub fn resource(resource_type: impl Into<String>) -> Self {
        Self {
            resource: ResourceMatch {
                resource_type: resource_type.into(),
            },
            ..Self::default()
        }
    }

    pub fn in_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn for_principal(mut self, principal: PrincipalMatch) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Whether the context falls within this scope
    pub fn matches(&self, ctx: &PolicyContext) -> bool {
        let type_ok = is_wildcard(&self.resource.resource_type)
            || self.resource.resource_type == ctx.resource_type;
        let env_ok = is_wildcard(&self.environment) || self.environment == ctx.environment;
        let principal_ok = self.principal.as_ref().map_or(true, |p| p.matches(ctx));
        type_ok && env_ok && principal_ok
    }
}

impl Default for PolicyMatch {
    fn default() -> Self {
        Self {
            resource: ResourceMatch::default(),
            environment: wildcard(),
            principal: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMatch {
    #[serde(rename = "type", default = "wildcard")]
    pub resource_type: String,
}

impl Default for ResourceMatch {
    fn default() -> Self {
        Self {
            resource_type: wildcard(),
        }
    }
}

/// Restricts a rule to a caller identity or role set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalMatch {
    /// Exact principal id, when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Any one of these roles, when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl PrincipalMatch {
    fn matches(&self, ctx: &PolicyContext) -> bool {
        let id_ok = match (&self.id, &ctx.principal_id) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
        };
        let roles_ok =
            self.roles.is_empty() || self.roles.iter().any(|r| ctx.principal_roles.contains(r));
        id_ok && roles_ok
    }
}

/// A time-bounded bypass of named rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyException {
    pub id: String,

    /// Rules this exception bypasses
    pub rule_ids: Vec<String>,

    #[serde(default)]
    pub reason: String,

    pub expires_at: DateTime<Utc>,

    #[serde(rename = "match", default)]
    pub matcher: PolicyMatch,
}

impl PolicyException {
    pub fn new<I, S>(id: impl Into<String>, rule_ids: I, expires_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            rule_ids: rule_ids.into_iter().map(Into::into).collect(),
            reason: String::new(),
            expires_at,
            matcher: PolicyMatch::default(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn matching(mut self, matcher: PolicyMatch) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn bypasses(&self, rule_id: &str) -> bool {
        self.rule_ids.iter().any(|id| id == rule_id)
    }
}

fn default_true() -> bool {
    true
}

fn default_effect() -> Effect {
    Effect::Allow
}

fn any_resource() -> Vec<String> {
    vec!["Any".to_string()]
}

fn wildcard() -> String {
    "*".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConditionOp;
    use grcgate_core::Value;

    #[test]
    fn test_policy_deserialization() {
        let yaml = r#"
metadata:
  name: grc-baseline
  version: "1.0.0"
  createdAt: "2026-01-01T00:00:00Z"
spec:
  mode: enforce
  defaultEffect: allow
  execution:
    order: sequential
    shortCircuit: true
    conflictStrategy: denyOverrides
  target:
    resourceTypes: [Evidence, Risk]
    environments: [dev, staging, prod]
  rules:
    - id: REQUIRE_DATA_CLASSIFICATION
      priority: 10
      match:
        resource:
          type: Any
      when:
        - op: exists
          path: metadata.labels.dataClassification
          value: false
      effect: deny
      severity: high
      message: Data classification label is required
      remediation:
        hint: Add metadata.labels.dataClassification
  exceptions:
    - id: DEV_BYPASS
      ruleIds: [REQUIRE_DATA_CLASSIFICATION]
      reason: Seeding dev data
      expiresAt: "2030-01-01T00:00:00Z"
      match:
        environment: dev
"#;

        let policy = PolicyDocument::from_yaml(yaml).unwrap();
        assert_eq!(policy.metadata.name, "grc-baseline");
        assert_eq!(policy.spec.rules.len(), 1);

        let rule = &policy.spec.rules[0];
        assert!(rule.enabled);
        assert_eq!(rule.effect, Effect::Deny);
        assert_eq!(rule.severity, Severity::High);
        assert_eq!(rule.when[0].op, ConditionOp::Exists);
        assert_eq!(rule.when[0].value, Value::Bool(false));
        assert_eq!(rule.remediation.hint, "Add metadata.labels.dataClassification");

        let exception = &policy.spec.exceptions[0];
        assert!(exception.bypasses("REQUIRE_DATA_CLASSIFICATION"));
        assert_eq!(exception.matcher.environment, "dev");
        assert_eq!(exception.matcher.resource.resource_type, "*");
    }

    #[test]
    fn test_minimal_document_defaults() {
        let yaml = r#"
metadata:
  name: minimal
spec:
  rules:
    - id: DENY_ALL
      effect: deny
"#;
        let policy = PolicyDocument::from_yaml(yaml).unwrap();
        assert_eq!(policy.spec.mode, PolicyMode::Enforce);
        assert_eq!(policy.spec.default_effect, Effect::Allow);
        assert!(policy.spec.execution.short_circuit);
        assert_eq!(policy.spec.execution.conflict_strategy, ConflictStrategy::DenyOverrides);
        assert_eq!(policy.spec.target.resource_types, vec!["Any".to_string()]);
        assert!(policy.spec.rules[0].matcher.matches(&PolicyContext::new(
            "create",
            "prod",
            "Risk",
            Value::Null
        )));
    }

    #[test]
    fn test_match_scopes() {
        let ctx = PolicyContext::new("approve", "prod", "Evidence", Value::Null)
            .with_principal("u-1", ["auditor"]);

        assert!(PolicyMatch::any().matches(&ctx));
        assert!(PolicyMatch::resource("Evidence").in_environment("prod").matches(&ctx));
        assert!(!PolicyMatch::resource("Risk").matches(&ctx));
        assert!(!PolicyMatch::any().in_environment("dev").matches(&ctx));

        let auditors = PrincipalMatch {
            id: None,
            roles: vec!["auditor".into(), "admin".into()],
        };
        assert!(PolicyMatch::any().for_principal(auditors).matches(&ctx));

        let someone_else = PrincipalMatch {
            id: Some("u-2".into()),
            roles: Vec::new(),
        };
        assert!(!PolicyMatch::any().for_principal(someone_else).matches(&ctx));
    }

    #[test]
    fn test_target_coverage() {
        let ctx = PolicyContext::new("create", "prod", "Evidence", Value::Null);
        let mut target = PolicyTarget::default();
        assert!(target.covers(&ctx));

        target.resource_types = vec!["Risk".into()];
        assert!(!target.covers(&ctx));

        target.resource_types = vec!["Evidence".into()];
        target.environments = vec!["dev".into()];
        assert!(!target.covers(&ctx));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("policy.json");
        std::fs::write(
            &json_path,
            r#"{"metadata": {"name": "json-policy"}, "spec": {"rules": [{"id": "R1", "effect": "deny"}]}}"#,
        )
        .unwrap();
        let from_json = PolicyDocument::from_file(&json_path).unwrap();
        assert_eq!(from_json.metadata.name, "json-policy");
        assert!(from_json.rule("R1").is_some());

        let yaml_path = dir.path().join("policy.yaml");
        std::fs::write(&yaml_path, "metadata:\n  name: [not, a, string\n").unwrap();
        let err = PolicyDocument::from_file(&yaml_path).unwrap_err();
        assert!(matches!(err, grcgate_core::Error::InvalidPolicy(_)));
    }
}
