//! Traversal Controller: the month-by-month walk.
//!
//! The controller owns the page session for the whole run. It reads the
//! displayed month, processes it unless the ledger says it is complete, and
//! steps one month in the configured direction until the unit budget is spent
//! or navigation stops producing new months.

use std::collections::HashSet;
use std::time::Duration;

use ratsarchiv_crawler::{PageSession, RetryPolicy};
use ratsarchiv_shared::{HarvestConfig, HarvestError, MonthUnit, Result, RunId, WalkDirection};
use ratsarchiv_storage::ensure_dir;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::extraction;
use crate::navigation;
use crate::pipeline::ProgressReporter;
use crate::processor::UnitProcessor;

pub const CALENDAR_SNAPSHOT: &str = "kalender_seite";

/// Consecutive navigations without a new month before the walk gives up.
const MAX_STALLS: u32 = 2;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxUnits,
    NavigationStall,
    NavigationFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MaxUnits => "month limit reached",
            Self::NavigationStall => "calendar stopped moving",
            Self::NavigationFailed => "navigation failed",
        };
        f.write_str(s)
    }
}

/// What happened to one visited month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Processed and marked in this run.
    Completed,
    /// Already marked, nothing fetched.
    Skipped,
    /// Visited but left unmarked.
    Incomplete,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub run_id: RunId,
    pub units: Vec<(MonthUnit, UnitOutcome)>,
    pub units_visited: u32,
    pub units_completed: u32,
    pub units_skipped: u32,
    pub units_failed: u32,
    pub stop_reason: StopReason,
    pub documents_downloaded: u32,
    pub documents_failed: u32,
}

impl CrawlSummary {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            units: Vec::new(),
            units_visited: 0,
            units_completed: 0,
            units_skipped: 0,
            units_failed: 0,
            stop_reason: StopReason::MaxUnits,
            documents_downloaded: 0,
            documents_failed: 0,
        }
    }

    fn record(&mut self, unit: MonthUnit, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Completed => self.units_completed += 1,
            UnitOutcome::Skipped => self.units_skipped += 1,
            UnitOutcome::Incomplete => self.units_failed += 1,
        }
        self.units.push((unit, outcome));
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct TraversalController<'a> {
    session: &'a mut dyn PageSession,
    processor: UnitProcessor,
    progress: &'a dyn ProgressReporter,
    direction: WalkDirection,
    retry: RetryPolicy,
    navigation_delay: Duration,
    seek_limit: u32,
}

impl<'a> TraversalController<'a> {
    pub fn new(
        session: &'a mut dyn PageSession,
        processor: UnitProcessor,
        config: &HarvestConfig,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            session,
            processor,
            progress,
            direction: config.direction,
            retry: RetryPolicy::new(config.retry_attempts, config.retry_delay),
            navigation_delay: config.navigation_delay,
            seek_limit: config.seek_limit,
        }
    }

    /// Seek to `start`, then walk at most `max_units` months.
    ///
    /// A seek that cannot reach `start` is logged and the walk begins from
    /// whatever month the page shows. Only fatal errors are returned.
    #[instrument(skip_all, fields(start = %start, max_units = max_units, direction = %self.direction))]
    pub async fn run_crawl(&mut self, start: MonthUnit, max_units: u32) -> Result<CrawlSummary> {
        self.progress.phase("Seeking starting month");
        if !self.seek(start).await? {
            warn!(%start, "starting month not reached, walking from current page");
        }

        self.progress.phase("Walking calendar");
        self.walk(max_units).await
    }

    /// Navigate toward `target`. Returns whether the page now shows it.
    pub async fn seek(&mut self, target: MonthUnit) -> Result<bool> {
        let mut stalls = 0;

        for steps in 0..=self.seek_limit {
            let label = self.read_label().await?;
            let Some(current) = label.as_deref().and_then(MonthUnit::parse_label) else {
                warn!(?label, "current month unknown, cannot seek");
                return Ok(false);
            };
            if current == target {
                debug!(steps, "starting month reached");
                return Ok(true);
            }
            if steps == self.seek_limit {
                break;
            }

            let direction = if target.ordinal() < current.ordinal() {
                WalkDirection::Backward
            } else {
                WalkDirection::Forward
            };
            match navigation::step(&mut *self.session, &self.retry, direction, self.navigation_delay).await {
                Ok(true) => stalls = 0,
                Ok(false) => {
                    stalls += 1;
                    if stalls >= MAX_STALLS {
                        warn!(%current, %target, "seek stalled");
                        return Ok(false);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(%current, error = %e, "seek navigation failed");
                    return Ok(false);
                }
            }
        }

        warn!(limit = self.seek_limit, %target, "seek limit reached");
        Ok(false)
    }

    async fn walk(&mut self, max_units: u32) -> Result<CrawlSummary> {
        let mut summary = CrawlSummary::new(self.processor.run_id().clone());
        let mut visited = HashSet::new();
        let mut stalls = 0;

        while summary.units_visited < max_units {
            let label = self.read_label().await?;
            match label.as_deref().and_then(MonthUnit::parse_label) {
                Some(unit) if visited.insert(unit) => {
                    stalls = 0;
                    summary.units_visited += 1;
                    self.progress.unit_started(&unit);

                    let result = self.process_month(&unit).await;
                    let context = self.processor.month_context(&unit);
                    let outcome = self
                        .processor
                        .absorb(result, &context, "month")?
                        .unwrap_or(UnitOutcome::Incomplete);

                    summary.record(unit, outcome);
                    self.progress.unit_finished(&unit, outcome);
                    if summary.units_visited >= max_units {
                        break;
                    }
                }
                _ => {
                    stalls += 1;
                    let stall = HarvestError::NavigationStall {
                        label: label.clone().unwrap_or_default(),
                    };
                    warn!(stalls, error = %stall, "no new month after navigation");
                    if stalls >= MAX_STALLS {
                        summary.stop_reason = StopReason::NavigationStall;
                        break;
                    }
                }
            }

            match navigation::step(&mut *self.session, &self.retry, self.direction, self.navigation_delay).await {
                Ok(changed) => debug!(changed, "navigated"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "navigation failed, ending walk");
                    summary.stop_reason = StopReason::NavigationFailed;
                    break;
                }
            }
        }

        let tally = self.processor.tally();
        summary.documents_downloaded = tally.downloaded;
        summary.documents_failed = tally.failed;

        info!(
            visited = summary.units_visited,
            completed = summary.units_completed,
            skipped = summary.units_skipped,
            failed = summary.units_failed,
            stop = %summary.stop_reason,
            "walk finished"
        );
        self.progress.done(&summary);
        Ok(summary)
    }

    /// Current page label. Non-fatal read errors count as an unknown label.
    async fn read_label(&mut self) -> Result<Option<String>> {
        match self.session.current_unit_label().await {
            Ok(label) => Ok(label),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "could not read calendar label");
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(month = %unit))]
    async fn process_month(&mut self, unit: &MonthUnit) -> Result<UnitOutcome> {
        if self.processor.ledger().is_month_complete(unit) {
            info!("month already complete, skipping");
            return Ok(UnitOutcome::Skipped);
        }

        let month_dir = self.processor.ledger().layout().month_dir(unit);
        ensure_dir(&month_dir)?;
        let calendar = self.session.location().await?;
        let context = self.processor.month_context(unit);

        let mut complete = self
            .processor
            .absorb(
                self.session.persist_snapshot(&month_dir, CALENDAR_SNAPSHOT).await,
                &context,
                "calendar snapshot",
            )?
            .is_some();

        let records = extraction::extract_records(&mut *self.session, &month_dir).await?;
        if records.is_empty() {
            return Err(HarvestError::ExtractionEmpty {
                unit: unit.to_string(),
            });
        }
        info!(meetings = records.len(), "processing meetings");

        for record in &records {
            let back = navigation::return_to(
                &mut *self.session,
                &self.retry,
                &calendar,
                self.navigation_delay,
            )
            .await;
            self.processor.absorb(back, &context, "return to calendar")?;

            let result = self
                .processor
                .process_meeting(&mut *self.session, unit, &month_dir, record, self.progress)
                .await;
            let meeting_context = self.processor.meeting_context(unit, record);
            complete &= self.processor.absorb(result, &meeting_context, "meeting")? == Some(true);
        }

        let outcome = if complete {
            self.processor
                .ledger()
                .mark_month_complete(unit, &format!("Termine: {}", records.len()))?;
            info!("month complete");
            UnitOutcome::Completed
        } else {
            info!("month left incomplete");
            UnitOutcome::Incomplete
        };

        let back =
            navigation::return_to(&mut *self.session, &self.retry, &calendar, self.navigation_delay)
                .await;
        self.processor.absorb(back, &context, "return to calendar")?;
        Ok(outcome)
    }
}
