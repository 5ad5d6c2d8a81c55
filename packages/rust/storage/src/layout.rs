//! Output tree layout: `<root>/<year>/<Kalender_YYYY_Monat>/<DD_Termin>/[TOP_<n>_<title>/]`.

use std::path::{Path, PathBuf};

use ratsarchiv_shared::{AgendaItem, HarvestError, MeetingRecord, MonthUnit, Result};

/// Append-only failure ledger at the output root.
pub const FAILURE_LOG_FILE: &str = "failed_downloads.jsonl";

/// Maximum characters kept from an agenda item title in its folder name.
const AGENDA_TITLE_MAX_CHARS: usize = 100;

/// Extension assumed for document links whose name carries none.
const DEFAULT_DOCUMENT_EXTENSION: &str = "pdf";

/// Resolves every path the harvester writes.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn year_dir(&self, year: i32) -> PathBuf {
        self.root.join(year.to_string())
    }

    pub fn month_dir(&self, unit: &MonthUnit) -> PathBuf {
        self.year_dir(unit.year).join(unit.folder_key())
    }

    pub fn meeting_dir(&self, month_dir: &Path, record: &MeetingRecord) -> PathBuf {
        month_dir.join(meeting_folder_name(record))
    }

    pub fn agenda_dir(&self, meeting_dir: &Path, item: &AgendaItem) -> PathBuf {
        meeting_dir.join(agenda_folder_name(item))
    }

    pub fn failure_log_path(&self) -> PathBuf {
        self.root.join(FAILURE_LOG_FILE)
    }
}

/// Create `dir` and its parents.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| HarvestError::io(dir, e))
}

/// Make a human-readable name safe as a single path component.
///
/// Replaces reserved characters and whitespace runs with `_`, collapses
/// repeated underscores and trims them from both ends.
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = false;

    for c in name.trim().chars() {
        let mapped = match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        };
        if mapped == '_' {
            if !last_underscore {
                out.push('_');
            }
            last_underscore = true;
        } else {
            out.push(mapped);
            last_underscore = false;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "unbenannt".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<DD>_<title>`, e.g. `07_Magistrat`.
pub fn meeting_folder_name(record: &MeetingRecord) -> String {
    format!("{:02}_{}", record.day, sanitize_component(&record.title))
}

/// `TOP_<n>_<title>` with the title cut to 100 characters.
pub fn agenda_folder_name(item: &AgendaItem) -> String {
    let title: String = sanitize_component(&item.title)
        .chars()
        .take(AGENDA_TITLE_MAX_CHARS)
        .collect();
    format!("TOP_{}_{}", item.sequence_index, title.trim_end_matches('_'))
}

/// File name for a document's display name; adds `.pdf` when it has no extension.
pub fn document_file_name(display_name: &str) -> String {
    let clean = sanitize_component(display_name);
    if Path::new(&clean).extension().is_some() {
        clean
    } else {
        format!("{clean}.{DEFAULT_DOCUMENT_EXTENSION}")
    }
}

/// First free path for `file_name` in `dir`: `name.ext`, then `name_1.ext`, `name_2.ext`, …
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ratsarchiv_shared::MonthName;
    use uuid::Uuid;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ra-layout-{tag}-{}", Uuid::now_v7()))
    }

    #[test]
    fn sanitize_replaces_reserved_and_whitespace() {
        assert_eq!(
            sanitize_component("  Ortsbeirat  Grüningen: Sitzung / 2 "),
            "Ortsbeirat_Grüningen_Sitzung_2"
        );
        assert_eq!(sanitize_component("a<>b"), "a_b");
        assert_eq!(sanitize_component("???"), "unbenannt");
    }

    #[test]
    fn month_and_meeting_paths() {
        let layout = OutputLayout::new("/data/out");
        let unit = MonthUnit::new(2024, MonthName::Februar);
        let month_dir = layout.month_dir(&unit);
        assert_eq!(month_dir, PathBuf::from("/data/out/2024/Kalender_2024_Februar"));

        let record = MeetingRecord {
            day: 5,
            title: "Haupt- und Finanzausschuss".into(),
            source_link: None,
            extracted_at: Utc::now(),
        };
        assert_eq!(
            layout.meeting_dir(&month_dir, &record),
            month_dir.join("05_Haupt-_und_Finanzausschuss")
        );
    }

    #[test]
    fn agenda_folder_truncates_title() {
        let item = AgendaItem {
            sequence_index: 3,
            title: "x".repeat(250),
            source_link: "to0050.asp?__ktonr=1".into(),
        };
        let name = agenda_folder_name(&item);
        assert!(name.starts_with("TOP_3_"));
        assert_eq!(name.len(), "TOP_3_".len() + 100);
    }

    #[test]
    fn document_name_gets_pdf_extension() {
        assert_eq!(document_file_name("Vorlage 12/2024"), "Vorlage_12_2024.pdf");
        assert_eq!(document_file_name("Beschluss.pdf"), "Beschluss.pdf");
    }

    #[test]
    fn unique_destination_appends_counter() {
        let dir = temp_root("unique");
        std::fs::create_dir_all(&dir).unwrap();

        let first = unique_destination(&dir, "Beschluss.pdf");
        assert_eq!(first, dir.join("Beschluss.pdf"));
        std::fs::write(&first, b"one").unwrap();

        let second = unique_destination(&dir, "Beschluss.pdf");
        assert_eq!(second, dir.join("Beschluss_1.pdf"));
        std::fs::write(&second, b"two").unwrap();

        let third = unique_destination(&dir, "Beschluss.pdf");
        assert_eq!(third, dir.join("Beschluss_2.pdf"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
