//! Core decision vocabulary for GRC Gate

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a rule or of a whole evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// The operation may proceed
    Allow,
    /// The operation must be rejected
    Deny,
    /// Non-terminal: the rule only contributes mutations
    Mutate,
}

impl Effect {
    pub fn is_allow(&self) -> bool {
        matches!(self, Effect::Allow)
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, Effect::Deny)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
            Effect::Mutate => "mutate",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_serde() {
        let effect: Effect = serde_json::from_str(r#""deny""#).unwrap();
        assert_eq!(effect, Effect::Deny);
        assert_eq!(serde_json::to_string(&Effect::Mutate).unwrap(), r#""mutate""#);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
        assert_eq!(Severity::default(), Severity::Medium);
    }
}
