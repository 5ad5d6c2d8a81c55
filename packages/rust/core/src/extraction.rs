//! Meeting extraction backed by the per-month cache.

use std::path::Path;

use chrono::Utc;
use ratsarchiv_crawler::PageSession;
use ratsarchiv_shared::{MeetingRecord, Result};
use ratsarchiv_storage::cache;
use tracing::{debug, info};

/// Meeting records of the month shown in `session`, deduplicated by
/// `(day, title)` and sorted by day.
///
/// A non-empty cache in `month_dir` is returned as is and the page is not
/// read at all. Otherwise the page is scraped and a non-empty result is
/// cached before it is returned.
pub async fn extract_records(
    session: &mut dyn PageSession,
    month_dir: &Path,
) -> Result<Vec<MeetingRecord>> {
    if let Some(records) = cache::load(month_dir).filter(|records| !records.is_empty()) {
        info!(count = records.len(), "using cached meeting list");
        return Ok(records);
    }

    let extracted_at = Utc::now();
    let raw = session.extract_meetings().await?;
    let found = raw.len();

    let records = cache::dedup_and_sort(
        raw.into_iter()
            .map(|m| MeetingRecord {
                day: m.day,
                title: m.title,
                source_link: m.link,
                extracted_at,
            })
            .collect(),
    );

    if records.is_empty() {
        debug!("no meetings on page, nothing cached");
        return Ok(records);
    }

    cache::store(month_dir, &records)?;
    info!(found, unique = records.len(), "meeting list extracted");
    Ok(records)
}
