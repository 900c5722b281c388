//! Declarative resource mutations
//!
//! Mutations are applied in declaration order and each one sees the effect of
//! the previous ones. There is no rollback: if a mutation fails, the ones
//! before it stay applied.

use std::sync::Arc;

use grcgate_core::{Error, Result, Value};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::path::PathResolver;

/// Mutation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    /// Assign the value at the path
    Set,
    /// Delete a map key or list element, reset an object member to null
    Remove,
    /// Append to a list, merge into a map, otherwise behave like `set`
    Add,
}

/// One write against the resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMutation {
    pub op: MutationOp,
    pub path: String,

    /// Required for `set` and `add`. An explicit `null` is a value.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

fn deserialize_present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl PolicyMutation {
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: MutationOp::Set,
            path: path.into(),
            value: Some(value.into()),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: MutationOp::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn add(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: MutationOp::Add,
            path: path.into(),
            value: Some(value.into()),
        }
    }

    fn required_value(&self) -> Result<Value> {
        self.value.clone().ok_or_else(|| {
            Error::invalid_policy(format!("{:?} mutation on '{}' has no value", self.op, self.path))
        })
    }
}

/// Applies mutation lists to resources
pub struct MutationApplier {
    resolver: Arc<PathResolver>,
}

impl MutationApplier {
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self { resolver }
    }

    /// Apply `mutations` to `resource` in order.
    ///
    /// Returns how many mutations changed the resource; a `remove` of an absent
    /// path does not count.
    pub fn apply(&self, mutations: &[PolicyMutation], resource: &mut Value) -> Result<usize> {
        let mut changed = 0;

        for mutation in mutations {
            let applied = match mutation.op {
                MutationOp::Set => {
                    self.resolver.set(resource, &mutation.path, mutation.required_value()?)?;
                    true
                }
                MutationOp::Remove => self.resolver.remove(resource, &mutation.path)?,
                MutationOp::Add => {
                    self.add(resource, &mutation.path, mutation.required_value()?)?;
                    true
                }
            };

            debug!(op = ?mutation.op, path = %mutation.path, applied, "mutation applied");
            if applied {
                changed += 1;
            }
        }

        Ok(changed)
    }

    fn add(&self, resource: &mut Value, path: &str, value: Value) -> Result<()> {
        match self.resolver.resolve_mut(resource, path)? {
            Some(Value::List(items)) => {
                match value {
                    Value::List(more) => items.extend(more),
                    single => items.push(single),
                }
                Ok(())
            }
            Some(Value::Map(map)) if matches!(value, Value::Map(_)) => {
                if let Value::Map(entries) = value {
                    map.extend(entries);
                }
                Ok(())
            }
            _ => self.resolver.set(resource, path, value),
        }
    }
}
