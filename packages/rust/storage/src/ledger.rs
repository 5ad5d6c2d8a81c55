//! Completeness Ledger: write-once marker files that drive every skip and resume decision.
//!
//! A marker means "this unit's children are fully materialized". Markers are
//! linked into place with no-clobber semantics, so the first writer wins and a
//! marker file always carries its full body.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ratsarchiv_shared::{HarvestError, MonthName, MonthUnit, Result};
use tracing::{debug, info};

use crate::layout::OutputLayout;

/// Level of the hierarchy a marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitLevel {
    Year,
    Month,
    Meeting,
    AgendaItem,
}

impl UnitLevel {
    /// Marker file name inside the unit's directory.
    pub fn marker_file(self) -> &'static str {
        match self {
            Self::Year => "jahr_vollstaendig.txt",
            Self::Month => "monat_vollstaendig.txt",
            Self::Meeting => "termin_vollstaendig.txt",
            Self::AgendaItem => "top_vollstaendig.txt",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Year => "Jahr",
            Self::Month => "Monat",
            Self::Meeting => "Termin",
            Self::AgendaItem => "TOP",
        }
    }
}

/// Marker store rooted at an output tree.
#[derive(Debug, Clone)]
pub struct CompletenessLedger {
    layout: OutputLayout,
}

impl CompletenessLedger {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    fn marker_path(unit_dir: &Path, level: UnitLevel) -> PathBuf {
        unit_dir.join(level.marker_file())
    }

    /// Whether the unit at `unit_dir` carries its marker.
    pub fn is_complete(&self, unit_dir: &Path, level: UnitLevel) -> bool {
        Self::marker_path(unit_dir, level).is_file()
    }

    /// Staging file a marker body is written to before it is linked into place.
    fn staging_path(unit_dir: &Path, level: UnitLevel) -> PathBuf {
        unit_dir.join(format!(".{}.{}.tmp", level.marker_file(), std::process::id()))
    }

    /// Write the marker for the unit at `unit_dir`.
    ///
    /// The body is written and synced to a staging file first, then hard-linked
    /// to the marker name, so a marker is never visible without its body.
    /// Returns `true` if this call created it, `false` if it already existed
    /// (the existing marker is left untouched).
    pub fn mark_complete(&self, unit_dir: &Path, level: UnitLevel, metadata: &str) -> Result<bool> {
        let path = Self::marker_path(unit_dir, level);
        if path.is_file() {
            debug!(?path, "marker already present");
            return Ok(false);
        }

        let mut body = format!(
            "{} vollständig geladen: {}\n",
            level.label(),
            Utc::now().to_rfc3339()
        );
        if !metadata.is_empty() {
            body.push_str(metadata);
            body.push('\n');
        }

        let staging = Self::staging_path(unit_dir, level);
        let staged = std::fs::File::create(&staging).and_then(|mut file| {
            file.write_all(body.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = staged {
            let _ = std::fs::remove_file(&staging);
            return Err(HarvestError::io(&staging, e));
        }

        // hard_link never replaces an existing file.
        let linked = std::fs::hard_link(&staging, &path);
        let _ = std::fs::remove_file(&staging);
        match linked {
            Ok(()) => {
                debug!(?path, "marker written");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(?path, "marker already present");
                Ok(false)
            }
            Err(e) => Err(HarvestError::io(&path, e)),
        }
    }

    pub fn is_year_complete(&self, year: i32) -> bool {
        self.is_complete(&self.layout.year_dir(year), UnitLevel::Year)
    }

    pub fn is_month_complete(&self, unit: &MonthUnit) -> bool {
        self.is_complete(&self.layout.month_dir(unit), UnitLevel::Month)
    }

    /// Mark a month complete. Completing January also completes its year,
    /// since a backward walk reaches January last.
    pub fn mark_month_complete(&self, unit: &MonthUnit, metadata: &str) -> Result<bool> {
        let created = self.mark_complete(&self.layout.month_dir(unit), UnitLevel::Month, metadata)?;

        if unit.month == MonthName::Januar {
            let year_meta = if metadata.is_empty() {
                "Januar vollständig".to_string()
            } else {
                format!("Januar vollständig: {metadata}")
            };
            if self.mark_complete(&self.layout.year_dir(unit.year), UnitLevel::Year, &year_meta)? {
                info!(year = unit.year, "year marked complete");
            }
        }

        Ok(created)
    }
}
