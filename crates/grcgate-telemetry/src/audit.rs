//! Audit sinks for policy decisions
//!
//! [`AuditTrail`] keeps decisions in a hash chain so that any edit to a past
//! entry is detectable. [`TracingAuditLogger`] writes decisions to the log and
//! [`CompositeAuditLogger`] fans one record out to several sinks.

use std::sync::Arc;

use async_trait::async_trait;
use grcgate_core::{AuditLogger, AuditRecord, Effect, Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Audit trail with hash-chained decisions for tamper detection
#[derive(Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<ChainedRecord>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decision, returning the new head hash
    pub fn append(&self, record: AuditRecord) -> Result<String> {
        let mut entries = self.entries.lock();

        let previous_hash = entries.last().map(|e| e.hash.clone());
        let entry = ChainedRecord::link(record, entries.len() as u64, previous_hash)?;

        let hash = entry.hash.clone();
        entries.push(entry);
        Ok(hash)
    }

    /// Verify the integrity of the whole chain
    pub fn verify(&self) -> bool {
        verify_chain(&self.entries.lock())
    }

    /// Copy of every entry, oldest first
    pub fn entries(&self) -> Vec<ChainedRecord> {
        self.entries.lock().clone()
    }

    /// Hash of the newest entry
    pub fn head(&self) -> Option<String> {
        self.entries.lock().last().map(|e| e.hash.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl AuditLogger for AuditTrail {
    async fn log_decision(&self, record: &AuditRecord) -> Result<()> {
        let hash = self.append(record.clone())?;
        debug!(hash = %hash, "decision appended to audit trail");
        Ok(())
    }
}

/// One decision in the trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainedRecord {
    pub sequence: u64,

    #[serde(flatten)]
    pub record: AuditRecord,

    /// Hash of this entry
    pub hash: String,

    /// Hash of the entry before it
    pub previous_hash: Option<String>,
}

impl ChainedRecord {
    /// Chain `record` after the entry whose hash is `previous_hash`
    pub(crate) fn link(record: AuditRecord, sequence: u64, previous_hash: Option<String>) -> Result<Self> {
        let hash = compute_hash(&record, sequence, previous_hash.as_deref())?;
        Ok(Self {
            sequence,
            record,
            hash,
            previous_hash,
        })
    }
}

/// Check a sequence of entries as exported from a trail
pub fn verify_chain(entries: &[ChainedRecord]) -> bool {
    let mut previous: Option<&str> = None;

    for (idx, entry) in entries.iter().enumerate() {
        if entry.sequence != idx as u64 || entry.previous_hash.as_deref() != previous {
            return false;
        }
        match compute_hash(&entry.record, entry.sequence, previous) {
            Ok(hash) if hash == entry.hash => {}
            _ => return false,
        }
        previous = Some(entry.hash.as_str());
    }

    true
}

fn compute_hash(record: &AuditRecord, sequence: u64, previous_hash: Option<&str>) -> Result<String> {
    let body = serde_json::to_vec(record)?;

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    hasher.update(&body);
    if let Some(prev) = previous_hash {
        hasher.update(prev.as_bytes());
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Writes each decision to the `tracing` log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log_decision(&self, record: &AuditRecord) -> Result<()> {
        let rule_id = record.matched_rule_id.as_deref().unwrap_or("-");
        match record.effect {
            Effect::Deny => info!(
                target: "grcgate::audit",
                policy = %record.policy_name,
                version = %record.policy_version,
                resource_type = %record.resource_type,
                action = %record.action,
                environment = %record.environment,
                rule_id,
                duration_us = record.duration_us,
                "denied"
            ),
            _ => debug!(
                target: "grcgate::audit",
                policy = %record.policy_name,
                resource_type = %record.resource_type,
                action = %record.action,
                environment = %record.environment,
                rule_id,
                duration_us = record.duration_us,
                "allowed"
            ),
        }
        Ok(())
    }
}

/// Sends every record to each inner logger
#[derive(Default, Clone)]
pub struct CompositeAuditLogger {
    loggers: Vec<Arc<dyn AuditLogger>>,
}

impl CompositeAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.loggers.push(logger);
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

#[async_trait]
impl AuditLogger for CompositeAuditLogger {
    /// Every logger sees the record even when an earlier one fails
    async fn log_decision(&self, record: &AuditRecord) -> Result<()> {
        let mut failures = Vec::new();
        for logger in &self.loggers {
            if let Err(e) = logger.log_decision(record).await {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::audit(failures.join("; ")))
        }
    }
}
