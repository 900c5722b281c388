//! GRC Gate Core
//!
//! Core types, traits, and utilities shared across GRC Gate components.
//!
//! This crate provides:
//! - The polymorphic [`Value`] model resources are evaluated as
//! - A typed [`PolicyResource`] wrapper for GRC entities
//! - Error types and result handling
//! - The [`AuditLogger`] seam decisions are reported through

pub mod audit;
pub mod error;
pub mod resource;
pub mod types;
pub mod value;

pub use audit::{AuditLogger, AuditRecord, NoopAuditLogger};
pub use error::{Error, PolicyViolation, Result};
pub use resource::{PolicyResource, ResourceMetadata};
pub use types::{Effect, Severity};
pub use value::{Record, Value};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditLogger, AuditRecord};
    pub use crate::error::{Error, PolicyViolation, Result};
    pub use crate::resource::PolicyResource;
    pub use crate::types::{Effect, Severity};
    pub use crate::value::{Record, Value};
}
