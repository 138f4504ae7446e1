//! Emergency JSONL log.
//!
//! When an event cannot be persisted to the database, it is appended here so
//! it is not lost. One JSON object per line, written with
//! `serde_jsonlines::append_json_lines`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuditError;

/// One event that missed the database, with the reason it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRecord {
    pub event_id: String,
    pub category: String,
    pub action: String,
    pub severity: String,
    /// Masked context, or `null` if masking itself failed.
    pub context: Value,
    pub checksum: Option<String>,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only side channel for events the database rejected.
#[derive(Debug, Clone)]
pub struct EmergencyLog {
    path: PathBuf,
}

impl EmergencyLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file and its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Io` if the file cannot be written.
    pub fn append(&self, record: &EmergencyRecord) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
        }
        serde_jsonlines::append_json_lines(&self.path, [record])
            .map_err(|e| AuditError::io(&self.path, e))
    }

    /// Read back every record. A missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Io` on read or parse failure.
    pub fn read_all(&self) -> Result<Vec<EmergencyRecord>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        serde_jsonlines::json_lines::<EmergencyRecord, _>(&self.path)
            .and_then(|lines| lines.collect())
            .map_err(|e| AuditError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> EmergencyRecord {
        EmergencyRecord {
            event_id: id.into(),
            category: "system".into(),
            action: "boot".into(),
            severity: "low".into(),
            context: json!({"k": "v"}),
            checksum: None,
            error: "database is locked".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = EmergencyLog::new(dir.path().join("sub/emergency.jsonl"));
        assert!(log.read_all().unwrap().is_empty());

        log.append(&record("evt-1")).unwrap();
        log.append(&record("evt-2")).unwrap();

        let lines = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(lines.lines().count(), 2);
        let records = log.read_all().unwrap();
        assert_eq!(records[1].event_id, "evt-2");
        assert_eq!(records[0], record_with_time("evt-1", records[0].created_at));
    }

    fn record_with_time(id: &str, at: DateTime<Utc>) -> EmergencyRecord {
        EmergencyRecord {
            created_at: at,
            ..record(id)
        }
    }
}
