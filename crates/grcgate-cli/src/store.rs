//! Policy store backed by a file on disk
//!
//! The document is re-read whenever the file's modification time changes,
//! so edits are picked up without restarting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use grcgate_core::{Error, Result};
use grcgate_policy::{PolicyDocument, PolicyStore};
use parking_lot::RwLock;
use tracing::info;

pub struct FilePolicyStore {
    path: PathBuf,
    cached: RwLock<Option<Cached>>,
}

struct Cached {
    modified: SystemTime,
    policy: Arc<PolicyDocument>,
}

impl FilePolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cached_if_current(&self, modified: SystemTime) -> Option<Arc<PolicyDocument>> {
        self.cached
            .read()
            .as_ref()
            .filter(|c| c.modified == modified)
            .map(|c| Arc::clone(&c.policy))
    }
}

#[async_trait]
impl PolicyStore for FilePolicyStore {
    async fn get_policy(&self) -> Result<Arc<PolicyDocument>> {
        let modified = tokio::fs::metadata(&self.path).await?.modified()?;
        if let Some(policy) = self.cached_if_current(modified) {
            return Ok(policy);
        }

        let path = self.path.clone();
        let policy = tokio::task::spawn_blocking(move || PolicyDocument::from_file(path))
            .await
            .map_err(|e| Error::store(format!("policy load task failed: {}", e)))??;
        let policy = Arc::new(policy);

        info!(
            path = %self.path.display(),
            policy = %policy.metadata.name,
            version = %policy.metadata.version,
            rules = policy.spec.rules.len(),
            "policy loaded"
        );

        *self.cached.write() = Some(Cached {
            modified,
            policy: Arc::clone(&policy),
        });
        Ok(policy)
    }
}
