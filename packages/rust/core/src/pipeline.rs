//! End-to-end harvest: resolve start → seek → walk → summary.

use std::sync::Arc;

use tracing::{info, instrument};

use ratsarchiv_crawler::{BinaryFetcher, DocumentDownloader, DownloadOutcome, PageSession};
use ratsarchiv_shared::{HarvestConfig, MeetingRecord, MonthUnit, Result, RunId};
use ratsarchiv_storage::{CompletenessLedger, FailureLedger, OutputLayout};

use crate::controller::{CrawlSummary, TraversalController, UnitOutcome};
use crate::processor::UnitProcessor;
use crate::resume;

/// Progress callback for reporting harvest status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a month is about to be processed.
    fn unit_started(&self, unit: &MonthUnit);
    /// Called when a month has been processed or skipped.
    fn unit_finished(&self, unit: &MonthUnit, outcome: UnitOutcome);
    /// Called before a meeting page is opened.
    fn meeting_started(&self, record: &MeetingRecord);
    /// Called after each document attempt.
    fn document_finished(&self, name: &str, outcome: &DownloadOutcome);
    /// Called when the walk ends.
    fn done(&self, summary: &CrawlSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn unit_started(&self, _unit: &MonthUnit) {}
    fn unit_finished(&self, _unit: &MonthUnit, _outcome: UnitOutcome) {}
    fn meeting_started(&self, _record: &MeetingRecord) {}
    fn document_finished(&self, _name: &str, _outcome: &DownloadOutcome) {}
    fn done(&self, _summary: &CrawlSummary) {}
}

/// The month a run starts from: `start` if given, else the resume candidate.
pub fn starting_unit(config: &HarvestConfig, start: Option<MonthUnit>) -> MonthUnit {
    start.unwrap_or_else(|| {
        let ledger = CompletenessLedger::new(OutputLayout::new(&config.output_root));
        resume::resume_point(&ledger)
    })
}

/// Run one harvest against a session that already shows the calendar.
///
/// 1. Resolve the starting month (explicit or from on-disk markers)
/// 2. Seek the calendar to it
/// 3. Walk up to `config.max_units` months
#[instrument(skip_all, fields(root = %config.output_root.display(), direction = %config.direction))]
pub async fn harvest(
    config: &HarvestConfig,
    session: &mut dyn PageSession,
    fetcher: Arc<dyn BinaryFetcher>,
    start: Option<MonthUnit>,
    progress: &dyn ProgressReporter,
) -> Result<CrawlSummary> {
    let run_id = RunId::new();
    let start = starting_unit(config, start);
    info!(%run_id, %start, max_units = config.max_units, "starting harvest");

    progress.phase("Preparing output");
    let layout = OutputLayout::new(&config.output_root);
    let downloader = DocumentDownloader::new(
        fetcher,
        FailureLedger::new(layout.failure_log_path()),
        config.download_timeout,
    );
    let processor = UnitProcessor::new(CompletenessLedger::new(layout), downloader, config, run_id);

    TraversalController::new(session, processor, config, progress)
        .run_crawl(start, config.max_units)
        .await
}
