//! Per-month Extraction Cache (`extracted_termine.json`).
//!
//! Once a month's meeting list has been scraped, it is persisted next to the
//! meeting folders and reused on every later run instead of re-scraping.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ratsarchiv_shared::{HarvestError, MeetingRecord, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cache file name inside a month directory.
pub const CACHE_FILE: &str = "extracted_termine.json";

/// On-disk envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
    pub extracted_at: DateTime<Utc>,
    pub month_folder: String,
    pub termin_count: usize,
    pub termine: Vec<MeetingRecord>,
}

/// Accepts the current envelope and the older bare-array form.
#[derive(Deserialize)]
#[serde(untagged)]
enum CacheFormat {
    Envelope(CacheEnvelope),
    Legacy(Vec<MeetingRecord>),
}

pub fn cache_path(month_dir: &Path) -> PathBuf {
    month_dir.join(CACHE_FILE)
}

/// Load the cached meeting list for a month.
///
/// Missing, unreadable or corrupt files are a miss, never an error.
pub fn load(month_dir: &Path) -> Option<Vec<MeetingRecord>> {
    let path = cache_path(month_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(?path, error = %e, "extraction cache unreadable, treating as miss");
            return None;
        }
    };

    match serde_json::from_str::<CacheFormat>(&content) {
        Ok(CacheFormat::Envelope(envelope)) => {
            debug!(?path, count = envelope.termine.len(), "extraction cache hit");
            Some(envelope.termine)
        }
        Ok(CacheFormat::Legacy(records)) => {
            debug!(?path, count = records.len(), "extraction cache hit (legacy array)");
            Some(records)
        }
        Err(e) => {
            warn!(?path, error = %e, "extraction cache corrupt, treating as miss");
            None
        }
    }
}

/// Persist the meeting list for a month. Writes via a temp file and rename.
pub fn store(month_dir: &Path, records: &[MeetingRecord]) -> Result<()> {
    let envelope = CacheEnvelope {
        extracted_at: Utc::now(),
        month_folder: month_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        termin_count: records.len(),
        termine: records.to_vec(),
    };

    let json = serde_json::to_string_pretty(&envelope)
        .map_err(|e| HarvestError::Storage(format!("failed to serialize extraction cache: {e}")))?;

    let path = cache_path(month_dir);
    let tmp = month_dir.join(format!("{CACHE_FILE}.tmp"));
    std::fs::write(&tmp, json).map_err(|e| HarvestError::io(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| HarvestError::io(&path, e))?;

    debug!(?path, count = records.len(), "extraction cache stored");
    Ok(())
}

/// Drop repeated `(day, title)` pairs (first occurrence wins) and sort by day.
///
/// The sort is stable, so meetings on the same day keep their source order.
pub fn dedup_and_sort(records: Vec<MeetingRecord>) -> Vec<MeetingRecord> {
    let mut seen: HashSet<(u8, String)> = HashSet::new();
    let mut unique: Vec<MeetingRecord> = records
        .into_iter()
        .filter(|r| seen.insert((r.day, r.title.clone())))
        .collect();
    unique.sort_by_key(|r| r.day);
    unique
}
