//! Conflict resolution between matching rules
//!
//! Each strategy is a pure function from the matched rules, in evaluation
//! order, to the winner.

use std::cmp::Reverse;
use std::fmt;

use grcgate_core::Effect;
use serde::{Deserialize, Serialize};

use crate::rule::PolicyRule;

/// How to combine several matching rules into one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConflictStrategy {
    /// Any matching deny wins over every allow
    #[default]
    DenyOverrides,
    /// Any matching allow wins over every deny
    AllowOverrides,
    /// The first matching rule in priority order wins
    FirstApplicable,
    /// The most severe matching rule wins, earliest on ties
    HighestSeverityWins,
}

impl ConflictStrategy {
    /// Pick the winning rule. `None` when nothing matched.
    pub fn resolve<'a>(&self, matched: &[&'a PolicyRule]) -> Option<&'a PolicyRule> {
        match self {
            ConflictStrategy::DenyOverrides => effect_overrides(matched, Effect::Deny),
            ConflictStrategy::AllowOverrides => effect_overrides(matched, Effect::Allow),
            ConflictStrategy::FirstApplicable => first_applicable(matched),
            ConflictStrategy::HighestSeverityWins => highest_severity(matched),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::DenyOverrides => "denyOverrides",
            ConflictStrategy::AllowOverrides => "allowOverrides",
            ConflictStrategy::FirstApplicable => "firstApplicable",
            ConflictStrategy::HighestSeverityWins => "highestSeverityWins",
        }
    }
}

impl From<String> for ConflictStrategy {
    /// Unknown names fall back to `denyOverrides`
    fn from(name: String) -> Self {
        match name.as_str() {
            "allowOverrides" => ConflictStrategy::AllowOverrides,
            "firstApplicable" | "firstMatch" => ConflictStrategy::FirstApplicable,
            "highestSeverityWins" | "highestPriorityWins" => ConflictStrategy::HighestSeverityWins,
            "denyOverrides" => ConflictStrategy::DenyOverrides,
            other => {
                tracing::warn!(strategy = %other, "unknown conflict strategy, using denyOverrides");
                ConflictStrategy::DenyOverrides
            }
        }
    }
}

impl From<ConflictStrategy> for String {
    fn from(strategy: ConflictStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn effect_overrides<'a>(matched: &[&'a PolicyRule], winning: Effect) -> Option<&'a PolicyRule> {
    matched
        .iter()
        .find(|rule| rule.effect == winning)
        .or_else(|| matched.first())
        .copied()
}

fn first_applicable<'a>(matched: &[&'a PolicyRule]) -> Option<&'a PolicyRule> {
    matched.first().copied()
}

fn highest_severity<'a>(matched: &[&'a PolicyRule]) -> Option<&'a PolicyRule> {
    matched
        .iter()
        .enumerate()
        .min_by_key(|(idx, rule)| (Reverse(rule.severity), *idx))
        .map(|(_, rule)| *rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grcgate_core::Severity;

    fn rules() -> Vec<PolicyRule> {
        vec![
            PolicyRule::new("ALLOW_LOW", Effect::Allow).severity(Severity::Low),
            PolicyRule::new("DENY_HIGH", Effect::Deny).severity(Severity::High),
            PolicyRule::new("ALLOW_CRITICAL", Effect::Allow).severity(Severity::Critical),
            PolicyRule::new("DENY_CRITICAL", Effect::Deny).severity(Severity::Critical),
        ]
    }

    fn ids<'a>(strategy: ConflictStrategy, matched: &[&'a PolicyRule]) -> Option<&'a str> {
        strategy.resolve(matched).map(|r| r.id.as_str())
    }

    #[test]
    fn test_strategies() {
        let rules = rules();
        let matched: Vec<&PolicyRule> = rules.iter().collect();

        assert_eq!(ids(ConflictStrategy::DenyOverrides, &matched), Some("DENY_HIGH"));
        assert_eq!(ids(ConflictStrategy::AllowOverrides, &matched), Some("ALLOW_LOW"));
        assert_eq!(ids(ConflictStrategy::FirstApplicable, &matched), Some("ALLOW_LOW"));
        assert_eq!(ids(ConflictStrategy::HighestSeverityWins, &matched), Some("ALLOW_CRITICAL"));
    }

    #[test]
    fn test_overrides_fall_back_to_first_match() {
        let rules = rules();
        let allows: Vec<&PolicyRule> = vec![&rules[0], &rules[2]];
        assert_eq!(ids(ConflictStrategy::DenyOverrides, &allows), Some("ALLOW_LOW"));

        let denies: Vec<&PolicyRule> = vec![&rules[1], &rules[3]];
        assert_eq!(ids(ConflictStrategy::AllowOverrides, &denies), Some("DENY_HIGH"));
    }

    #[test]
    fn test_nothing_matched() {
        for strategy in [
            ConflictStrategy::DenyOverrides,
            ConflictStrategy::AllowOverrides,
            ConflictStrategy::FirstApplicable,
            ConflictStrategy::HighestSeverityWins,
        ] {
            assert!(strategy.resolve(&[]).is_none());
        }
    }

    #[test]
    fn test_parse_with_fallback() {
        let parsed: ConflictStrategy = serde_json::from_str(r#""highestPriorityWins""#).unwrap();
        assert_eq!(parsed, ConflictStrategy::HighestSeverityWins);

        let unknown: ConflictStrategy = serde_json::from_str(r#""mostRecentWins""#).unwrap();
        assert_eq!(unknown, ConflictStrategy::DenyOverrides);

        assert_eq!(serde_json::to_string(&ConflictStrategy::AllowOverrides).unwrap(), r#""allowOverrides""#);
    }
}
