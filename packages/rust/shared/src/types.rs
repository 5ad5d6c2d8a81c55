//! Core domain types for the month → meeting → agenda item → document hierarchy.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one crawl run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MonthName
// ---------------------------------------------------------------------------

/// Calendar month, named the way the upstream calendar and the output tree name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MonthName {
    Januar,
    Februar,
    #[serde(rename = "März")]
    Maerz,
    April,
    Mai,
    Juni,
    Juli,
    August,
    September,
    Oktober,
    November,
    Dezember,
}

impl MonthName {
    /// All months in calendar order.
    pub const ALL: [MonthName; 12] = [
        MonthName::Januar,
        MonthName::Februar,
        MonthName::Maerz,
        MonthName::April,
        MonthName::Mai,
        MonthName::Juni,
        MonthName::Juli,
        MonthName::August,
        MonthName::September,
        MonthName::Oktober,
        MonthName::November,
        MonthName::Dezember,
    ];

    /// 1-based calendar ordinal.
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    /// Month for a 1-based ordinal.
    pub fn from_number(n: u32) -> Option<Self> {
        Self::ALL.get(n.checked_sub(1)? as usize).copied()
    }

    /// German display name (`März` with umlaut).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Januar => "Januar",
            Self::Februar => "Februar",
            Self::Maerz => "März",
            Self::April => "April",
            Self::Mai => "Mai",
            Self::Juni => "Juni",
            Self::Juli => "Juli",
            Self::August => "August",
            Self::September => "September",
            Self::Oktober => "Oktober",
            Self::November => "November",
            Self::Dezember => "Dezember",
        }
    }

    /// Parse a German month name, case-insensitive; accepts `Maerz`/`Marz` for `März`.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "märz" | "maerz" | "marz" => return Some(Self::Maerz),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().to_lowercase() == lower)
    }
}

impl std::fmt::Display for MonthName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WalkDirection
// ---------------------------------------------------------------------------

/// Direction of a month-by-month walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkDirection {
    /// Towards older months (the default: newest first, January ends the year).
    #[default]
    Backward,
    /// Towards newer months.
    Forward,
}

impl std::str::FromStr for WalkDirection {
    type Err = crate::HarvestError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backward" | "back" | "zurueck" => Ok(Self::Backward),
            "forward" | "fwd" | "vor" => Ok(Self::Forward),
            other => Err(crate::HarvestError::validation(format!(
                "unknown walk direction '{other}': expected 'backward' or 'forward'"
            ))),
        }
    }
}

impl std::fmt::Display for WalkDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backward => f.write_str("backward"),
            Self::Forward => f.write_str("forward"),
        }
    }
}

// ---------------------------------------------------------------------------
// MonthUnit
// ---------------------------------------------------------------------------

/// One calendar page: identity is `(year, month)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthUnit {
    pub year: i32,
    pub month: MonthName,
}

impl MonthUnit {
    pub fn new(year: i32, month: MonthName) -> Self {
        Self { year, month }
    }

    /// Folder name under the year directory, e.g. `Kalender_2024_Januar`.
    pub fn folder_key(&self) -> String {
        format!("Kalender_{}_{}", self.year, self.month.as_str())
    }

    /// The unit one step away in `direction`.
    pub fn step(&self, direction: WalkDirection) -> Self {
        match (direction, self.month) {
            (WalkDirection::Backward, MonthName::Januar) => {
                Self::new(self.year - 1, MonthName::Dezember)
            }
            (WalkDirection::Forward, MonthName::Dezember) => {
                Self::new(self.year + 1, MonthName::Januar)
            }
            (WalkDirection::Backward, m) => Self::new(
                self.year,
                MonthName::from_number(m.number() - 1).unwrap_or(MonthName::Januar),
            ),
            (WalkDirection::Forward, m) => Self::new(
                self.year,
                MonthName::from_number(m.number() + 1).unwrap_or(MonthName::Dezember),
            ),
        }
    }

    /// Months since year 0, used for ordering and distance.
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month.number()) - 1
    }

    /// Extract a unit from a human-readable calendar label such as
    /// `"Sitzungskalender Januar 2024"` or `"2024 - März"`.
    ///
    /// Returns `None` when either the month name or a four-digit year is missing.
    pub fn parse_label(label: &str) -> Option<Self> {
        static MONTH_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"(?i)\b(januar|februar|märz|maerz|marz|april|mai|juni|juli|august|september|oktober|november|dezember)\b\D{0,12}?(\d{4})\b",
            )
            .expect("valid regex")
        });
        static YEAR_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"(?i)\b(\d{4})\b\D{0,12}?\b(januar|februar|märz|maerz|marz|april|mai|juni|juli|august|september|oktober|november|dezember)\b",
            )
            .expect("valid regex")
        });

        if let Some(caps) = MONTH_YEAR_RE.captures(label) {
            let month = MonthName::parse(&caps[1])?;
            let year = caps[2].parse().ok()?;
            return Some(Self::new(year, month));
        }
        let caps = YEAR_MONTH_RE.captures(label)?;
        let year = caps[1].parse().ok()?;
        let month = MonthName::parse(&caps[2])?;
        Some(Self::new(year, month))
    }

    /// Parse the `--start` form `YYYY-MM`.
    pub fn parse_year_month(s: &str) -> crate::Result<Self> {
        let invalid = || {
            crate::HarvestError::validation(format!("invalid month '{s}': expected YYYY-MM"))
        };
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month = month
            .parse::<u32>()
            .ok()
            .and_then(MonthName::from_number)
            .ok_or_else(invalid)?;
        Ok(Self::new(year, month))
    }
}

impl std::fmt::Display for MonthUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.month, self.year)
    }
}

// ---------------------------------------------------------------------------
// MeetingRecord / AgendaItem / DocumentRef
// ---------------------------------------------------------------------------

/// A meeting ("Termin") listed on a calendar page.
///
/// Identity within a month is `(day, title)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRecord {
    /// Day of month, 1–31.
    pub day: u8,
    /// Meeting title as shown upstream (e.g. `Magistrat`).
    pub title: String,
    /// Link to the meeting page, if the calendar exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_link: Option<String>,
    /// When the record was scraped.
    pub extracted_at: DateTime<Utc>,
}

impl MeetingRecord {
    /// Dedup key `(day, title)`.
    pub fn key(&self) -> (u8, &str) {
        (self.day, self.title.as_str())
    }
}

/// An agenda item ("TOP") within a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaItem {
    /// 1-based position in source order.
    pub sequence_index: u32,
    pub title: String,
    pub source_link: String,
}

/// A downloadable document link on a meeting or agenda page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub display_name: String,
    pub source_link: String,
}

/// Download state of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Downloaded,
    Failed,
}
