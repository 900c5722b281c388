//! Load-time validation of policy documents
//!
//! Structural problems (malformed paths, bad regexes, operands of the wrong
//! shape) are caught here so that they never surface mid-evaluation.

use std::collections::HashSet;
use std::fmt;

use grcgate_core::{Effect, Value};

use crate::condition::{compile_pattern, ConditionOp};
use crate::mutation::MutationOp;
use crate::path::CompiledPath;
use crate::rule::PolicyDocument;

/// One problem found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Where in the document, e.g. `rules[REQUIRE_OWNER].when[0]`
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Check a document; an empty result means it is safe to evaluate
pub fn validate_policy(policy: &PolicyDocument) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if policy.metadata.name.trim().is_empty() {
        issues.push(ValidationIssue::new("metadata.name", "must not be empty"));
    }
    if policy.spec.default_effect == Effect::Mutate {
        issues.push(ValidationIssue::new("spec.defaultEffect", "must be allow or deny"));
    }

    let mut seen = HashSet::new();
    for rule in &policy.spec.rules {
        let at = format!("rules[{}]", rule.id);

        if rule.id.trim().is_empty() {
            issues.push(ValidationIssue::new(&at, "rule id must not be empty"));
        }
        if !seen.insert(rule.id.as_str()) {
            issues.push(ValidationIssue::new(&at, "duplicate rule id"));
        }
        if rule.effect == Effect::Mutate && rule.mutations.is_empty() {
            issues.push(ValidationIssue::new(&at, "mutate rule has no mutations"));
        }

        for (idx, condition) in rule.when.iter().enumerate() {
            let at = format!("{}.when[{}]", at, idx);
            check_path(&condition.path, &at, &mut issues);

            if condition.op.takes_list() && !matches!(condition.value, Value::List(_)) {
                issues.push(ValidationIssue::new(&at, format!("{:?} requires a list value", condition.op)));
            }
            if condition.op.takes_pattern() {
                match condition.value.as_str() {
                    Some(pattern) => {
                        if let Err(e) = compile_pattern(pattern) {
                            issues.push(ValidationIssue::new(&at, e.to_string()));
                        }
                    }
                    None => issues.push(ValidationIssue::new(&at, "pattern must be a string")),
                }
            }
            if matches!(condition.op, ConditionOp::Exists | ConditionOp::NotExists)
                && !matches!(condition.value, Value::Null | Value::Bool(_))
            {
                issues.push(ValidationIssue::new(&at, "expected presence must be a boolean"));
            }
        }

        for (idx, mutation) in rule.mutations.iter().enumerate() {
            let at = format!("{}.mutations[{}]", at, idx);
            check_path(&mutation.path, &at, &mut issues);

            if matches!(mutation.op, MutationOp::Set | MutationOp::Add) && mutation.value.is_none() {
                issues.push(ValidationIssue::new(&at, format!("{:?} requires a value", mutation.op)));
            }
        }
    }

    for exception in &policy.spec.exceptions {
        let at = format!("exceptions[{}]", exception.id);
        if exception.rule_ids.is_empty() {
            issues.push(ValidationIssue::new(&at, "exception bypasses no rules"));
        }
        for rule_id in &exception.rule_ids {
            if !seen.contains(rule_id.as_str()) {
                issues.push(ValidationIssue::new(&at, format!("unknown rule id '{}'", rule_id)));
            }
        }
    }

    issues
}

fn check_path(path: &str, at: &str, issues: &mut Vec<ValidationIssue>) {
    if let Err(e) = CompiledPath::parse(path) {
        issues.push(ValidationIssue::new(at, e.to_string()));
    }
}
