//! Resume resolution from on-disk state alone.
//!
//! Year folders are scanned newest first. The first year without its own
//! marker is the target; within it the months are checked Dezember down to
//! Januar and the first one lacking a marker is the candidate. Nothing here
//! touches the network or creates directories.

use chrono::{Datelike, Local};
use ratsarchiv_shared::{MonthName, MonthUnit};
use ratsarchiv_storage::CompletenessLedger;
use tracing::{debug, info};

/// Year folders under the output root (four-digit names only), newest first.
pub fn year_folders(ledger: &CompletenessLedger) -> Vec<i32> {
    let Ok(entries) = std::fs::read_dir(ledger.layout().root()) else {
        return Vec::new();
    };

    let mut years: Vec<i32> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            (name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit()))
                .then(|| name.parse().ok())
                .flatten()
        })
        .collect();

    years.sort_unstable_by(|a, b| b.cmp(a));
    years
}

/// The month a fresh run should start from.
///
/// `current_year` is used when no year folder exists yet.
pub fn next_candidate(ledger: &CompletenessLedger, current_year: i32) -> MonthUnit {
    let years = year_folders(ledger);
    debug!(?years, "year folders found");

    let Some(&target) = years.iter().find(|&&y| !ledger.is_year_complete(y)) else {
        let unit = match years.last() {
            Some(&oldest) => MonthUnit::new(oldest - 1, MonthName::Dezember),
            None => MonthUnit::new(current_year, MonthName::Dezember),
        };
        info!(candidate = %unit, "no incomplete year on disk");
        return unit;
    };

    for month in MonthName::ALL.iter().rev() {
        let unit = MonthUnit::new(target, *month);
        if !ledger.is_month_complete(&unit) {
            info!(candidate = %unit, "resuming at first incomplete month");
            return unit;
        }
        debug!(month = %unit, "month already complete");
    }

    // Every month is marked but the year marker is missing: January's marker
    // predates the year rule or the year marker was removed by hand.
    let unit = MonthUnit::new(target - 1, MonthName::Dezember);
    info!(candidate = %unit, year = target, "all months complete, moving to previous year");
    unit
}

/// [`next_candidate`] against the local calendar year. Every caller that
/// resolves a start month without an explicit one goes through here.
pub fn resume_point(ledger: &CompletenessLedger) -> MonthUnit {
    next_candidate(ledger, Local::now().year())
}
