//! DLQ file persistence.
//!
//! # Responsibilities
//! - Serialize the active and resolved sets to one JSON file
//! - Load that file back on startup
//!
//! # Design Decisions
//! - Writes go to a sibling temp file which is then renamed over the target,
//!   so readers never observe a partially written file
//! - A missing file is an empty queue; a corrupt file is reported to the caller

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dlq::types::FailedRequest;

/// Errors raised by the dead letter queue.
#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("DLQ file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DLQ file format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("no failed request with id {0}")]
    NotFound(String),
}

/// On-disk layout of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub failed_requests: Vec<FailedRequest>,
    pub resolved_requests: Vec<FailedRequest>,
    pub last_updated: u64,
}

/// Read a snapshot. `Ok(None)` when the file does not exist.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, DeadLetterError> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    let snapshot = serde_json::from_reader(reader)?;
    Ok(Some(snapshot))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "dead_letter_queue.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a snapshot atomically (temp file + rename).
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), DeadLetterError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let result = (|| -> Result<(), DeadLetterError> {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureReason;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dlq.json");
        let snapshot = Snapshot {
            failed_requests: vec![FailedRequest::new("k", FailureReason::Timeout, "slow", 3)],
            resolved_requests: vec![],
            last_updated: 99,
        };

        write_snapshot(&path, &snapshot).unwrap();

        assert!(!temp_path(&path).exists());
        assert_eq!(load_snapshot(&path).unwrap(), Some(snapshot));
    }

    #[test]
    fn test_file_layout_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.json");
        write_snapshot(&path, &Snapshot::default()).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["failed_requests"].is_array());
        assert!(raw["resolved_requests"].is_array());
        assert!(raw["last_updated"].is_u64());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_snapshot(&path), Err(DeadLetterError::Format(_))));
    }
}
