//! Per-unit info files (`termin_info.json`, `top_info.json`).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ratsarchiv_shared::{DocumentStatus, HarvestError, Result};
use serde::{Deserialize, Serialize};

pub const MEETING_INFO_FILE: &str = "termin_info.json";
pub const AGENDA_INFO_FILE: &str = "top_info.json";

/// Result of one document attempt as recorded in an info file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub name: String,
    pub source_link: String,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingInfo {
    pub day: u8,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default)]
    pub snapshots: Vec<String>,
    #[serde(default)]
    pub agenda_items: u32,
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaInfo {
    pub sequence_index: u32,
    pub title: String,
    pub source_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default)]
    pub snapshots: Vec<String>,
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
    pub created_at: DateTime<Utc>,
}

/// Write `value` as pretty JSON to `dir/file_name`, replacing any previous version.
pub fn write_info<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| HarvestError::Storage(format!("failed to serialize {file_name}: {e}")))?;
    std::fs::write(&path, json).map_err(|e| HarvestError::io(&path, e))?;
    Ok(path)
}

pub fn read_info<T: for<'de> Deserialize<'de>>(dir: &Path, file_name: &str) -> Result<T> {
    let path = dir.join(file_name);
    let content = std::fs::read_to_string(&path).map_err(|e| HarvestError::io(&path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| HarvestError::parse(format!("invalid {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn meeting_info_written_and_read() {
        let dir = std::env::temp_dir().join(format!("ra-info-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let info = MeetingInfo {
            day: 7,
            title: "Magistrat".into(),
            source_link: Some("si0057.asp?__ksinr=4711".into()),
            page_url: None,
            snapshots: vec!["termin_seite.html".into()],
            agenda_items: 0,
            documents: vec![DocumentEntry {
                name: "Einladung".into(),
                source_link: "getfile.asp?id=1".into(),
                status: DocumentStatus::Failed,
                file: None,
                bytes: 0,
                sha256: None,
                reason: Some("timeout".into()),
            }],
            created_at: Utc::now(),
        };
        write_info(&dir, MEETING_INFO_FILE, &info).unwrap();

        let back: MeetingInfo = read_info(&dir, MEETING_INFO_FILE).unwrap();
        assert_eq!(back.title, "Magistrat");
        assert_eq!(back.documents[0].status, DocumentStatus::Failed);
        assert_eq!(back.documents[0].reason.as_deref(), Some("timeout"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
