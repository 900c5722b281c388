//! Rule conditions and their evaluation
//!
//! A condition reads one path from the resource and applies one operator to
//! the result. A missing path and an explicit null are treated alike: both
//! resolve to null before the operator runs. From that:
//! - `equals` holds only when comparing against null; `notEquals` is its
//!   negation, so a missing label is "not equal" to any concrete value.
//! - `in` holds only when the list contains null; `notIn` is its negation.
//! - `exists` holds for a non-null value; `notExists` for missing or null.
//! - `matches` and `notMatches` both require a scalar value and are false
//!   otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use grcgate_core::{Error, Result, Value};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::path::PathResolver;

static NULL: Value = Value::Null;

/// Distinct `matches` patterns kept compiled before the cache is cleared
pub const DEFAULT_PATTERN_CAPACITY: usize = 1024;

/// Condition operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOp {
    Equals,
    NotEquals,
    /// Regular expression match on the value's text
    Matches,
    NotMatches,
    /// Membership in a list value
    In,
    NotIn,
    Exists,
    NotExists,
}

impl ConditionOp {
    /// Whether the operator expects a list value
    pub fn takes_list(&self) -> bool {
        matches!(self, ConditionOp::In | ConditionOp::NotIn)
    }

    /// Whether the operator expects a regular expression value
    pub fn takes_pattern(&self) -> bool {
        matches!(self, ConditionOp::Matches | ConditionOp::NotMatches)
    }
}

/// A single predicate over the resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub op: ConditionOp,

    /// Dot path into the resource
    pub path: String,

    /// Operand. For `exists`/`notExists` an optional boolean expected presence.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl PolicyCondition {
    pub fn new(op: ConditionOp, path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op,
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(ConditionOp::Equals, path, value)
    }

    pub fn not_equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(ConditionOp::NotEquals, path, value)
    }

    pub fn matches(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(ConditionOp::Matches, path, pattern.into())
    }

    pub fn is_in<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::new(ConditionOp::In, path, list)
    }

    pub fn not_in<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::new(ConditionOp::NotIn, path, list)
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Self::new(ConditionOp::Exists, path, Value::Null)
    }

    pub fn not_exists(path: impl Into<String>) -> Self {
        Self::new(ConditionOp::NotExists, path, Value::Null)
    }
}

/// Evaluates conditions against resources, caching compiled patterns
pub struct ConditionEvaluator {
    resolver: Arc<PathResolver>,
    patterns: RwLock<HashMap<String, Regex>>,
    capacity: usize,
}

impl ConditionEvaluator {
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self::with_pattern_capacity(resolver, DEFAULT_PATTERN_CAPACITY)
    }

    /// Create an evaluator that keeps up to `capacity` compiled patterns
    pub fn with_pattern_capacity(resolver: Arc<PathResolver>, capacity: usize) -> Self {
        Self {
            resolver,
            patterns: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of distinct patterns currently compiled
    pub fn cached_patterns(&self) -> usize {
        self.patterns.read().len()
    }

    /// True when every condition holds. An empty list always holds.
    pub fn all_hold(&self, conditions: &[PolicyCondition], resource: &Value) -> Result<bool> {
        for condition in conditions {
            if !self.evaluate(condition, resource)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluate one condition
    pub fn evaluate(&self, condition: &PolicyCondition, resource: &Value) -> Result<bool> {
        let resolved = self
            .resolver
            .resolve(resource, &condition.path)?
            .unwrap_or(&NULL);

        let holds = match condition.op {
            ConditionOp::Equals => resolved.loose_eq(&condition.value),
            ConditionOp::NotEquals => !resolved.loose_eq(&condition.value),
            ConditionOp::In => contains(&condition.value, resolved),
            ConditionOp::NotIn => !contains(&condition.value, resolved),
            ConditionOp::Matches => self.is_match(&condition.value, resolved)?.unwrap_or(false),
            ConditionOp::NotMatches => self.is_match(&condition.value, resolved)?.map_or(false, |m| !m),
            ConditionOp::Exists => !resolved.is_null() == expected_presence(&condition.value),
            ConditionOp::NotExists => resolved.is_null() == expected_presence(&condition.value),
        };

        trace!(op = ?condition.op, path = %condition.path, holds, "condition evaluated");
        Ok(holds)
    }

    /// `None` when the value has no text to match against
    fn is_match(&self, pattern: &Value, resolved: &Value) -> Result<Option<bool>> {
        let Some(text) = resolved.to_text() else {
            return Ok(None);
        };
        let pattern = pattern.to_text().unwrap_or_default();

        if let Some(regex) = self.patterns.read().get(&pattern) {
            return Ok(Some(regex.is_match(&text)));
        }

        let regex = compile_pattern(&pattern)?;
        let is_match = regex.is_match(&text);

        let mut patterns = self.patterns.write();
        if patterns.len() >= self.capacity {
            debug!(capacity = self.capacity, "pattern cache full, clearing");
            patterns.clear();
        }
        patterns.insert(pattern, regex);
        Ok(Some(is_match))
    }
}

/// Compile a `matches` pattern, mapping failures onto the engine's error type
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e.to_string()))
}

fn contains(list: &Value, needle: &Value) -> bool {
    match list {
        Value::List(items) => items.iter().any(|item| item.loose_eq(needle)),
        _ => false,
    }
}

/// `exists: false` inverts the check; anything but an explicit `false` means true
fn expected_presence(value: &Value) -> bool {
    value.as_bool().unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluator() -> ConditionEvaluator {
        ConditionEvaluator::new(Arc::new(PathResolver::new()))
    }

    fn resource(classification: serde_json::Value) -> Value {
        Value::from(json!({
            "metadata": { "labels": { "dataClassification": classification, "owner": "team-security" } },
            "score": 7
        }))
    }

    #[test]
    fn test_condition_deserialization() {
        let yaml = r#"
op: in
path: metadata.labels.dataClassification
value: [public, internal]
"#;
        let condition: PolicyCondition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(condition.op, ConditionOp::In);
        assert_eq!(condition.value.as_list().map(|l| l.len()), Some(2));

        let exists: PolicyCondition = serde_json::from_str(r#"{"op": "notExists", "path": "a"}"#).unwrap();
        assert_eq!(exists.op, ConditionOp::NotExists);
        assert!(exists.value.is_null());
    }

    #[test]
    fn test_equals_and_not_equals() {
        let eval = evaluator();
        let res = resource(json!("restricted"));

        assert!(eval.evaluate(&PolicyCondition::equals("metadata.labels.dataClassification", "restricted"), &res).unwrap());
        assert!(eval.evaluate(&PolicyCondition::not_equals("metadata.labels.dataClassification", "public"), &res).unwrap());
        assert!(eval.evaluate(&PolicyCondition::equals("score", 7), &res).unwrap());
        assert!(eval.evaluate(&PolicyCondition::equals("score", "7"), &res).unwrap());
    }

    #[test]
    fn test_missing_and_null_paths_behave_alike() {
        let eval = evaluator();
        let null_label = resource(serde_json::Value::Null);
        let no_labels = Value::from(json!({ "metadata": {} }));

        for res in [&null_label, &no_labels] {
            let path = "metadata.labels.dataClassification";
            assert!(!eval.evaluate(&PolicyCondition::equals(path, "internal"), res).unwrap());
            assert!(eval.evaluate(&PolicyCondition::equals(path, Value::Null), res).unwrap());
            assert!(eval.evaluate(&PolicyCondition::not_equals(path, "internal"), res).unwrap());
            assert!(!eval.evaluate(&PolicyCondition::is_in(path, ["public", "internal"]), res).unwrap());
            assert!(eval.evaluate(&PolicyCondition::not_in(path, ["public", "internal"]), res).unwrap());
            assert!(!eval.evaluate(&PolicyCondition::exists(path), res).unwrap());
            assert!(eval.evaluate(&PolicyCondition::not_exists(path), res).unwrap());
            assert!(!eval.evaluate(&PolicyCondition::matches(path, ".*"), res).unwrap());
            assert!(!eval
                .evaluate(&PolicyCondition::new(ConditionOp::NotMatches, path, "^x$"), res)
                .unwrap());
        }
    }

    #[test]
    fn test_exists_with_expected_presence() {
        let eval = evaluator();
        let res = resource(serde_json::Value::Null);
        let path = "metadata.labels.dataClassification";

        let missing = PolicyCondition::new(ConditionOp::Exists, path, false);
        assert!(eval.evaluate(&missing, &res).unwrap());

        let present = resource(json!("internal"));
        assert!(!eval.evaluate(&missing, &present).unwrap());
        assert!(eval.evaluate(&PolicyCondition::exists(path), &present).unwrap());
    }

    #[test]
    fn test_matches_uses_regex() {
        let eval = evaluator();
        let res = resource(json!("internal"));

        assert!(eval.evaluate(&PolicyCondition::matches("metadata.labels.owner", "^team-.*"), &res).unwrap());
        assert!(!eval.evaluate(&PolicyCondition::matches("metadata.labels.owner", "^ops-"), &res).unwrap());
        assert!(eval.evaluate(&PolicyCondition::matches("score", r"^\d+$"), &res).unwrap());
        assert!(eval
            .evaluate(&PolicyCondition::new(ConditionOp::NotMatches, "metadata.labels.owner", "^ops-"), &res)
            .unwrap());
    }

    #[test]
    fn test_in_membership() {
        let eval = evaluator();
        let res = resource(json!("internal"));
        let path = "metadata.labels.dataClassification";

        assert!(eval.evaluate(&PolicyCondition::is_in(path, ["public", "internal"]), &res).unwrap());
        assert!(!eval.evaluate(&PolicyCondition::is_in(path, ["restricted"]), &res).unwrap());
        assert!(!eval.evaluate(&PolicyCondition::new(ConditionOp::In, path, "internal"), &res).unwrap());
    }

    #[test]
    fn test_invalid_pattern_propagates() {
        let eval = evaluator();
        let res = resource(json!("internal"));
        let err = eval
            .evaluate(&PolicyCondition::matches("metadata.labels.owner", "(unclosed"), &res)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_pattern_cache_is_bounded() {
        let eval = ConditionEvaluator::with_pattern_capacity(Arc::new(PathResolver::new()), 2);
        let res = resource(json!("internal"));
        let path = "metadata.labels.dataClassification";

        for pattern in ["^int", "^i", "nal$", "^int"] {
            assert!(eval.evaluate(&PolicyCondition::matches(path, pattern), &res).unwrap());
            assert!(eval.cached_patterns() <= 2);
        }
        assert!(eval.cached_patterns() >= 1);
    }

    #[test]
    fn test_empty_condition_list_holds() {
        let eval = evaluator();
        assert!(eval.all_hold(&[], &Value::Null).unwrap());
    }
}
