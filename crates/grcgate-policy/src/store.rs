//! Policy document sources

use std::sync::Arc;

use async_trait::async_trait;
use grcgate_core::Result;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::rule::PolicyDocument;
use crate::validate::validate_policy;

/// Supplies the active policy document
///
/// Implementations hand out immutable snapshots. Replacing the document
/// never disturbs an evaluation already holding the previous snapshot.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Current document snapshot
    async fn get_policy(&self) -> Result<Arc<PolicyDocument>>;

    /// Whether `policy` is fit for evaluation
    async fn validate_policy(&self, policy: &PolicyDocument) -> Result<bool> {
        let issues = validate_policy(policy);
        for issue in &issues {
            warn!(policy = %policy.metadata.name, %issue, "policy validation issue");
        }
        Ok(issues.is_empty())
    }
}

/// Store holding a single document in memory
pub struct InMemoryPolicyStore {
    current: RwLock<Arc<PolicyDocument>>,
}

impl InMemoryPolicyStore {
    pub fn new(policy: PolicyDocument) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy)),
        }
    }

    /// Swap in a new document
    pub fn replace(&self, policy: PolicyDocument) {
        info!(
            policy = %policy.metadata.name,
            version = %policy.metadata.version,
            rules = policy.spec.rules.len(),
            "policy replaced"
        );
        *self.current.write() = Arc::new(policy);
    }

    pub fn snapshot(&self) -> Arc<PolicyDocument> {
        Arc::clone(&self.current.read())
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get_policy(&self) -> Result<Arc<PolicyDocument>> {
        Ok(self.snapshot())
    }
}
