//! Gate configuration

use grcgate_core::Error;
use grcgate_policy::DEFAULT_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Cli;

/// Configuration for the `grcgate` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Policy document (YAML or JSON)
    #[serde(default = "default_policy_path")]
    pub policy_path: PathBuf,

    /// Upper bound on cached compiled paths
    #[serde(default = "default_cache_capacity")]
    pub path_cache_capacity: usize,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GateConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &Path, cli: &Cli) -> anyhow::Result<Self> {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)
                .map_err(|e| Error::config(format!("{}: {}", config_path.display(), e)))?
        } else {
            Self::default()
        };

        if let Some(policy) = &cli.policy {
            config.policy_path = policy.clone();
        }
        if let Some(capacity) = cli.path_cache_capacity {
            config.path_cache_capacity = capacity;
        }
        if let Some(log_path) = &cli.audit_log {
            config.audit.log_path = Some(log_path.clone());
        }
        if cli.no_audit {
            config.audit.enabled = false;
        }
        if let Some(format) = cli.log_format {
            config.logging.format = format;
        }

        Ok(config)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy_path: default_policy_path(),
            path_cache_capacity: default_cache_capacity(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Where decisions are recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Keep an in-memory hash-chained trail for the run
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Append decisions to this JSONL file as well
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

fn default_policy_path() -> PathBuf {
    PathBuf::from("./policies/grc-baseline.yaml")
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_without_file() {
        let cli = Cli::parse_from(["grcgate", "validate"]);
        let config = GateConfig::load(Path::new("/nonexistent/grcgate.yaml"), &cli).unwrap();

        assert_eq!(config.policy_path, PathBuf::from("./policies/grc-baseline.yaml"));
        assert_eq!(config.path_cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.audit.enabled);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grcgate.yaml");
        std::fs::write(
            &path,
            "policy_path: /etc/grcgate/policy.yaml\npath_cache_capacity: 16\nlogging:\n  format: json\n",
        )
        .unwrap();

        let from_file = GateConfig::load(&path, &Cli::parse_from(["grcgate", "validate"])).unwrap();
        assert_eq!(from_file.policy_path, PathBuf::from("/etc/grcgate/policy.yaml"));
        assert_eq!(from_file.path_cache_capacity, 16);
        assert_eq!(from_file.logging.format, LogFormat::Json);

        let cli = Cli::parse_from([
            "grcgate",
            "--policy",
            "local.yaml",
            "--no-audit",
            "--log-format",
            "text",
            "validate",
        ]);
        let overridden = GateConfig::load(&path, &cli).unwrap();
        assert_eq!(overridden.policy_path, PathBuf::from("local.yaml"));
        assert_eq!(overridden.path_cache_capacity, 16);
        assert!(!overridden.audit.enabled);
        assert_eq!(overridden.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grcgate.yaml");
        std::fs::write(&path, "path_cache_capacity: lots\n").unwrap();

        let err = GateConfig::load(&path, &Cli::parse_from(["grcgate", "validate"])).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
        assert!(err.to_string().contains("grcgate.yaml"));
    }
}
