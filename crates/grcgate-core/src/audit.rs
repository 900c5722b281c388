//! Decision audit seam
//!
//! The engine emits exactly one [`AuditRecord`] per evaluation through an
//! injected [`AuditLogger`]. Persistence of those records is the logger's
//! concern, not the engine's.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Effect, Result};

/// One evaluated decision, as seen by the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub environment: String,
    pub resource_type: String,
    pub effect: Effect,
    pub matched_rule_id: Option<String>,

    /// Name of the policy document the decision came from
    pub policy_name: String,

    /// Version of the policy document the decision came from
    pub policy_version: String,

    /// Wall time spent evaluating, in microseconds
    pub duration_us: u64,
}

/// Receives one record per evaluation
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log_decision(&self, record: &AuditRecord) -> Result<()>;
}

/// Logger that discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLogger;

#[async_trait]
impl AuditLogger for NoopAuditLogger {
    async fn log_decision(&self, _record: &AuditRecord) -> Result<()> {
        Ok(())
    }
}
