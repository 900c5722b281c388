//! Evaluation metrics
//!
//! Counts are kept per `resourceType:action` key for in-process reporting and
//! mirrored to the `metrics` facade for whatever recorder the host installs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use grcgate_core::{AuditLogger, AuditRecord, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use parking_lot::RwLock;
use serde::Serialize;

pub const EVALUATIONS_TOTAL: &str = "grcgate_policy_evaluations_total";
pub const DENIALS_TOTAL: &str = "grcgate_policy_denials_total";
pub const EVALUATION_DURATION: &str = "grcgate_policy_evaluation_duration_seconds";

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(EVALUATIONS_TOTAL, "Total policy evaluations");
    describe_counter!(DENIALS_TOTAL, "Policy evaluations that ended in deny");
    describe_histogram!(EVALUATION_DURATION, Unit::Seconds, "Policy evaluation latency");
}

/// Per-key evaluation counters
#[derive(Clone, Default)]
pub struct EvaluationMetrics {
    inner: Arc<RwLock<HashMap<String, Arc<KeyCounters>>>>,
}

#[derive(Default)]
struct KeyCounters {
    evaluations: AtomicU64,
    denials: AtomicU64,
    total_duration_us: AtomicU64,
    max_duration_us: AtomicU64,
}

impl EvaluationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one decision
    pub fn record(&self, record: &AuditRecord) {
        let key = metric_key(&record.resource_type, &record.action);
        let counters = self.counters(&key);

        counters.evaluations.fetch_add(1, Ordering::Relaxed);
        counters
            .total_duration_us
            .fetch_add(record.duration_us, Ordering::Relaxed);
        counters
            .max_duration_us
            .fetch_max(record.duration_us, Ordering::Relaxed);
        if record.effect.is_deny() {
            counters.denials.fetch_add(1, Ordering::Relaxed);
        }

        let resource_type = record.resource_type.clone();
        let action = record.action.clone();
        counter!(
            EVALUATIONS_TOTAL,
            "resource_type" => resource_type.clone(),
            "action" => action.clone(),
            "effect" => record.effect.as_str()
        )
        .increment(1);
        if record.effect.is_deny() {
            counter!(
                DENIALS_TOTAL,
                "resource_type" => resource_type.clone(),
                "action" => action.clone(),
                "rule_id" => record.matched_rule_id.clone().unwrap_or_default()
            )
            .increment(1);
        }
        histogram!(EVALUATION_DURATION, "resource_type" => resource_type, "action" => action)
            .record(record.duration_us as f64 / 1_000_000.0);
    }

    fn counters(&self, key: &str) -> Arc<KeyCounters> {
        if let Some(existing) = self.inner.read().get(key) {
            return Arc::clone(existing);
        }
        Arc::clone(self.inner.write().entry(key.to_string()).or_default())
    }

    /// Counters for one key, if it has been seen
    pub fn get(&self, resource_type: &str, action: &str) -> Option<KeyMetricsSnapshot> {
        self.inner
            .read()
            .get(&metric_key(resource_type, action))
            .map(|c| c.snapshot())
    }

    /// Current counters for every key
    pub fn snapshot(&self) -> BTreeMap<String, KeyMetricsSnapshot> {
        self.inner
            .read()
            .iter()
            .map(|(key, counters)| (key.clone(), counters.snapshot()))
            .collect()
    }
}

#[async_trait]
impl AuditLogger for EvaluationMetrics {
    async fn log_decision(&self, record: &AuditRecord) -> Result<()> {
        self.record(record);
        Ok(())
    }
}

impl KeyCounters {
    fn snapshot(&self) -> KeyMetricsSnapshot {
        KeyMetricsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            total_duration_us: self.total_duration_us.load(Ordering::Relaxed),
            max_duration_us: self.max_duration_us.load(Ordering::Relaxed),
        }
    }
}

fn metric_key(resource_type: &str, action: &str) -> String {
    format!("{}:{}", resource_type, action)
}

/// Snapshot of one key's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetricsSnapshot {
    pub evaluations: u64,
    pub denials: u64,
    pub total_duration_us: u64,
    pub max_duration_us: u64,
}

impl KeyMetricsSnapshot {
    pub fn avg_duration_us(&self) -> u64 {
        if self.evaluations == 0 {
            0
        } else {
            self.total_duration_us / self.evaluations
        }
    }

    pub fn deny_rate(&self) -> f64 {
        if self.evaluations == 0 {
            0.0
        } else {
            self.denials as f64 / self.evaluations as f64
        }
    }
}
