//! Append-only failure ledger (`failed_downloads.jsonl`).
//!
//! One JSON object per line, so a partially written run never corrupts earlier
//! entries and the file can be tailed while a crawl is running.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ratsarchiv_shared::{HarvestError, Result, RunId};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Placeholder for columns that do not apply (e.g. no agenda item).
pub const NOT_APPLICABLE: &str = "N/A";

/// One failed document or unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    /// Month folder key, e.g. `Kalender_2024_Januar`.
    pub month: String,
    /// Meeting folder name.
    pub meeting: String,
    /// Agenda folder name or `N/A`.
    pub agenda_item: String,
    /// Document display name, or `-` for unit-level failures.
    pub document: String,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(
        run_id: &RunId,
        month: impl Into<String>,
        meeting: impl Into<String>,
        agenda_item: Option<&str>,
        document: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: run_id.to_string(),
            month: month.into(),
            meeting: meeting.into(),
            agenda_item: agenda_item.unwrap_or(NOT_APPLICABLE).to_string(),
            document: document.into(),
            reason: reason.into(),
        }
    }
}

/// Handle to the ledger file. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FailureLedger {
    path: PathBuf,
}

impl FailureLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    pub fn append(&self, record: &FailureRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }

        let mut line = serde_json::to_string(record)
            .map_err(|e| HarvestError::Storage(format!("failed to serialize failure record: {e}")))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarvestError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| HarvestError::io(&self.path, e))
    }

    /// Read every record. Malformed lines are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<FailureRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HarvestError::io(&self.path, e)),
        };

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| HarvestError::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = idx + 1, error = %e, "skipping malformed failure record"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn append_and_read_back() {
        let dir = std::env::temp_dir().join(format!("ra-failures-{}", Uuid::now_v7()));
        let ledger = FailureLedger::new(dir.join("failed_downloads.jsonl"));
        assert!(ledger.read_all().unwrap().is_empty());

        let run = RunId::new();
        ledger
            .append(&FailureRecord::new(
                &run,
                "Kalender_2024_Januar",
                "07_Magistrat",
                None,
                "Vorlage",
                "timeout",
            ))
            .unwrap();
        ledger
            .append(&FailureRecord::new(
                &run,
                "Kalender_2024_Januar",
                "07_Magistrat",
                Some("TOP_2_Haushalt"),
                "Anlage 1",
                "HTTP 500",
            ))
            .unwrap();

        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agenda_item, NOT_APPLICABLE);
        assert_eq!(records[0].reason, "timeout");
        assert_eq!(records[1].agenda_item, "TOP_2_Haushalt");
        assert_eq!(records[1].run_id, run.to_string());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = std::env::temp_dir().join(format!("ra-failures-bad-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("failed_downloads.jsonl");
        let good = FailureRecord::new(&RunId::new(), "m", "t", None, "d", "HTTP 404");
        let content = format!("not json\n{}\n\n", serde_json::to_string(&good).unwrap());
        std::fs::write(&path, content).unwrap();

        let records = FailureLedger::new(&path).read_all().unwrap();
        assert_eq!(records, vec![good]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
