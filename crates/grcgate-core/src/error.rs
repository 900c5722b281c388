//! Error types for GRC Gate

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result type alias using GRC Gate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for GRC Gate operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A deny decision raised by the enforcing entry point
    #[error("policy violation: {0}")]
    Violation(PolicyViolation),

    /// Structurally malformed path string (unbalanced bracket, bad index)
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A well-formed path that cannot be written on this resource
    #[error("path error at '{path}': {reason}")]
    Path { path: String, reason: String },

    /// Regular expression in a `matches` condition failed to compile
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The policy store handed out a document that failed validation
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Policy store failures (missing file, parse error, ...)
    #[error("policy store error: {0}")]
    Store(String),

    /// Audit logger failures
    #[error("audit error: {0}")]
    Audit(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new path write error
    pub fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid policy error
    pub fn invalid_policy(msg: impl Into<String>) -> Self {
        Self::InvalidPolicy(msg.into())
    }

    /// Create a new policy store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new audit error
    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for the expected business outcome, false for infrastructure failures
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Violation(_))
    }

    /// Borrow the violation details if this is a policy violation
    pub fn as_violation(&self) -> Option<&PolicyViolation> {
        match self {
            Self::Violation(v) => Some(v),
            _ => None,
        }
    }
}

impl From<PolicyViolation> for Error {
    fn from(violation: PolicyViolation) -> Self {
        Self::Violation(violation)
    }
}

/// Details of a denied operation, meant to be surfaced to the end user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    /// Rule that denied the operation
    pub rule_id: String,

    /// Human readable reason
    pub message: String,

    /// What the caller can do to comply
    pub remediation_hint: String,
}

impl PolicyViolation {
    /// Create a new violation
    pub fn new(
        rule_id: impl Into<String>,
        message: impl Into<String>,
        remediation_hint: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            message: message.into(),
            remediation_hint: remediation_hint.into(),
        }
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule_id, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_is_distinguishable() {
        let err: Error = PolicyViolation::new("DENY_ALL", "Access denied", "Contact administrator").into();
        assert!(err.is_violation());
        assert_eq!(err.as_violation().map(|v| v.rule_id.as_str()), Some("DENY_ALL"));
        assert_eq!(err.to_string(), "policy violation: [DENY_ALL] Access denied");

        let infra = Error::store("policy file missing");
        assert!(!infra.is_violation());
        assert!(infra.as_violation().is_none());
    }
}
