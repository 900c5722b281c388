//! File-backed audit log
//!
//! Decisions are appended as hash-chained JSON lines. Reopening an existing
//! file continues its chain.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use grcgate_core::{AuditLogger, AuditRecord, Error, Result};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audit::{verify_chain, ChainedRecord};

/// Append-only JSONL audit log
pub struct JsonlAuditLog {
    path: PathBuf,
    state: Mutex<WriterState>,
}

struct WriterState {
    writer: BufWriter<File>,
    next_sequence: u64,
    head: Option<String>,
}

impl JsonlAuditLog {
    /// Open `path` for appending, creating it and its directory if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let existing = if path.exists() { read_jsonl(&path)? } else { Vec::new() };
        if !verify_chain(&existing) {
            warn!(path = %path.display(), "existing audit log fails verification, appending anyway");
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), entries = existing.len(), "audit log opened");

        Ok(Self {
            state: Mutex::new(WriterState {
                writer: BufWriter::new(file),
                next_sequence: existing.len() as u64,
                head: existing.last().map(|e| e.hash.clone()),
            }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Chain and write one record, flushing it to the file
    pub fn append(&self, record: AuditRecord) -> Result<String> {
        let mut state = self.state.lock();

        let entry = ChainedRecord::link(record, state.next_sequence, state.head.clone())?;
        let line = serde_json::to_string(&entry)?;
        state.writer.write_all(line.as_bytes())?;
        state.writer.write_all(b"\n")?;
        state.writer.flush()?;

        state.next_sequence += 1;
        state.head = Some(entry.hash.clone());
        Ok(entry.hash)
    }
}

#[async_trait]
impl AuditLogger for JsonlAuditLog {
    async fn log_decision(&self, record: &AuditRecord) -> Result<()> {
        self.append(record.clone()).map(|_| ())
    }
}

/// Read every entry of a JSONL audit log
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<ChainedRecord>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line)
            .map_err(|e| Error::audit(format!("{}:{}: {}", path.display(), idx + 1, e)))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Whether the file's hash chain is intact
pub fn verify_file(path: impl AsRef<Path>) -> Result<bool> {
    Ok(verify_chain(&read_jsonl(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use grcgate_core::Effect;

    fn record(rule: Option<&str>) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            action: "delete".into(),
            environment: "prod".into(),
            resource_type: "Risk".into(),
            effect: if rule.is_some() { Effect::Deny } else { Effect::Allow },
            matched_rule_id: rule.map(String::from),
            policy_name: "grc-baseline".into(),
            policy_version: "1".into(),
            duration_us: 7,
        }
    }

    #[tokio::test]
    async fn test_chain_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("decisions.jsonl");

        {
            let log = JsonlAuditLog::open(&path).unwrap();
            log.log_decision(&record(None)).await.unwrap();
            log.log_decision(&record(Some("NO_DELETE"))).await.unwrap();
        }
        {
            let log = JsonlAuditLog::open(&path).unwrap();
            log.log_decision(&record(None)).await.unwrap();
        }

        let entries = read_jsonl(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].sequence, 2);
        assert_eq!(entries[1].record.matched_rule_id.as_deref(), Some("NO_DELETE"));
        assert!(verify_file(&path).unwrap());
    }

    #[test]
    fn test_edited_file_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");

        let log = JsonlAuditLog::open(&path).unwrap();
        log.append(record(Some("NO_DELETE"))).unwrap();
        log.append(record(None)).unwrap();
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replacen("\"deny\"", "\"allow\"", 1)).unwrap();

        assert!(!verify_file(&path).unwrap());
    }

    #[test]
    fn test_garbage_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let err = read_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains(":1:"));
    }
}
