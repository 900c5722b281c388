//! GRC Gate Telemetry
//!
//! Audit sinks and metrics for policy decisions.
//!
//! Provides:
//! - Hash-chained audit trails, in memory or as JSONL files
//! - Per `resourceType:action` evaluation metrics
//! - Log and fan-out audit loggers

pub mod audit;
pub mod metrics;
pub mod persistence;

pub use audit::{verify_chain, AuditTrail, ChainedRecord, CompositeAuditLogger, TracingAuditLogger};
pub use metrics::{describe_metrics, EvaluationMetrics, KeyMetricsSnapshot};
pub use persistence::{read_jsonl, verify_file, JsonlAuditLog};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditTrail, CompositeAuditLogger, TracingAuditLogger};
    pub use crate::metrics::EvaluationMetrics;
    pub use crate::persistence::JsonlAuditLog;
}
