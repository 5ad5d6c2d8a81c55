//! Meeting and agenda-item processing.
//!
//! A meeting or agenda item is marked complete only when its page snapshot
//! was stored and every document under it was downloaded. Non-fatal failures
//! are logged, appended to the failure ledger, and leave the unit unmarked so
//! the next run picks it up again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use ratsarchiv_crawler::{
    AuthContext, DocumentDownloader, DownloadOutcome, FailureContext, PageSession, RetryPolicy,
};
use ratsarchiv_shared::{
    AgendaItem, DocumentRef, DocumentStatus, HarvestConfig, HarvestError, MeetingRecord,
    MonthUnit, Result, RunId,
};
use ratsarchiv_storage::info::{
    AGENDA_INFO_FILE, MEETING_INFO_FILE, read_info, write_info,
};
use ratsarchiv_storage::layout::{agenda_folder_name, meeting_folder_name};
use ratsarchiv_storage::{
    AgendaInfo, CompletenessLedger, DocumentEntry, MeetingInfo, NOT_APPLICABLE, UnitLevel,
    ensure_dir,
};
use tracing::{debug, info, instrument, warn};

use crate::navigation;
use crate::pipeline::ProgressReporter;

pub const MEETING_SNAPSHOT: &str = "termin_seite";
pub const AGENDA_SNAPSHOT: &str = "top_seite";

/// Document column of failure-ledger entries that concern a whole unit.
pub const UNIT_DOCUMENT: &str = "-";

/// Documents handled so far in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentTally {
    pub downloaded: u32,
    pub failed: u32,
}

pub struct UnitProcessor {
    ledger: CompletenessLedger,
    downloader: DocumentDownloader,
    retry: RetryPolicy,
    run_id: RunId,
    document_delay: Duration,
    navigation_delay: Duration,
    tally: DocumentTally,
}

impl UnitProcessor {
    pub fn new(
        ledger: CompletenessLedger,
        downloader: DocumentDownloader,
        config: &HarvestConfig,
        run_id: RunId,
    ) -> Self {
        Self {
            ledger,
            downloader,
            retry: RetryPolicy::new(config.retry_attempts, config.retry_delay),
            run_id,
            document_delay: config.document_delay,
            navigation_delay: config.navigation_delay,
            tally: DocumentTally::default(),
        }
    }

    pub fn ledger(&self) -> &CompletenessLedger {
        &self.ledger
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn tally(&self) -> DocumentTally {
        self.tally
    }

    pub(crate) fn month_context(&self, unit: &MonthUnit) -> FailureContext {
        FailureContext {
            run_id: self.run_id.clone(),
            month: unit.folder_key(),
            meeting: NOT_APPLICABLE.to_string(),
            agenda_item: None,
        }
    }

    pub(crate) fn meeting_context(&self, unit: &MonthUnit, record: &MeetingRecord) -> FailureContext {
        FailureContext {
            meeting: meeting_folder_name(record),
            ..self.month_context(unit)
        }
    }

    /// Turn a non-fatal error into a logged, ledgered `None`. Fatal errors pass through.
    pub(crate) fn absorb<T>(
        &self,
        result: Result<T>,
        context: &FailureContext,
        step: &str,
    ) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(step, month = %context.month, meeting = %context.meeting, error = %e, "step failed");
                if let Err(ledger_err) = self
                    .downloader
                    .ledger()
                    .append(&context.record(UNIT_DOCUMENT, &e.to_string()))
                {
                    warn!(error = %ledger_err, "could not append to failure ledger");
                }
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Meetings
    // -----------------------------------------------------------------------

    /// Process one meeting of `unit`. Returns whether it is complete.
    #[instrument(skip_all, fields(day = record.day, title = %record.title))]
    pub async fn process_meeting(
        &mut self,
        session: &mut dyn PageSession,
        unit: &MonthUnit,
        month_dir: &Path,
        record: &MeetingRecord,
        progress: &dyn ProgressReporter,
    ) -> Result<bool> {
        let meeting_dir = self.ledger.layout().meeting_dir(month_dir, record);
        if self.ledger.is_complete(&meeting_dir, UnitLevel::Meeting) {
            debug!("meeting already complete");
            return Ok(true);
        }

        progress.meeting_started(record);
        ensure_dir(&meeting_dir)?;
        let context = self.meeting_context(unit, record);

        let carried = reusable_downloads(
            &meeting_dir,
            read_info::<MeetingInfo>(&meeting_dir, MEETING_INFO_FILE)
                .map(|info| info.documents)
                .unwrap_or_default(),
        );

        // Until this visit reaches its documents the file keeps what earlier runs stored.
        let mut info = MeetingInfo {
            day: record.day,
            title: record.title.clone(),
            source_link: record.source_link.clone(),
            page_url: None,
            snapshots: Vec::new(),
            agenda_items: 0,
            documents: carried.clone(),
            created_at: Utc::now(),
        };
        write_info(&meeting_dir, MEETING_INFO_FILE, &info)?;

        let Some(link) = record.source_link.as_deref() else {
            warn!("meeting has no link, recorded without marker");
            return Ok(false);
        };

        let opened = navigation::open_page(session, &self.retry, link, self.navigation_delay).await;
        if self.absorb(opened, &context, "open meeting")?.is_none() {
            return Ok(false);
        }

        let meeting_location = session.location().await?;
        info.page_url = Some(meeting_location.clone());
        let auth = session.auth_context().await?;
        let mut complete = true;

        match self.absorb(
            session.persist_snapshot(&meeting_dir, MEETING_SNAPSHOT).await,
            &context,
            "meeting snapshot",
        )? {
            Some(paths) => info.snapshots = file_names(&paths),
            None => complete = false,
        }

        let documents = self.absorb(
            session.extract_documents().await,
            &context,
            "extract meeting documents",
        )?;
        match documents {
            Some(documents) => {
                let (entries, all_stored) = self
                    .download_all(
                        &documents,
                        &meeting_dir,
                        &auth,
                        &context,
                        &carried,
                        progress,
                        &mut |so_far: Vec<DocumentEntry>| {
                            info.documents = so_far;
                            checkpoint(&meeting_dir, MEETING_INFO_FILE, &info);
                        },
                    )
                    .await;
                info.documents = entries;
                complete &= all_stored;
            }
            // Unknown document list: earlier downloads stay on record.
            None => complete = false,
        }

        let items = self.absorb(
            session.extract_agenda_items().await,
            &context,
            "extract agenda items",
        )?;
        complete &= items.is_some();
        let items = items.unwrap_or_default();
        info.agenda_items = items.len() as u32;
        debug!(agenda_items = items.len(), "agenda read");

        for item in &items {
            let back = navigation::return_to(
                session,
                &self.retry,
                &meeting_location,
                self.navigation_delay,
            )
            .await;
            if self.absorb(back, &context, "reopen meeting")?.is_none() {
                complete = false;
                break;
            }

            let outcome = self
                .process_agenda_item(session, &context, &meeting_dir, item, progress)
                .await;
            let item_context = FailureContext {
                agenda_item: Some(agenda_folder_name(item)),
                ..context.clone()
            };
            complete &= self.absorb(outcome, &item_context, "agenda item")? == Some(true);
        }

        write_info(&meeting_dir, MEETING_INFO_FILE, &info)?;

        if complete {
            self.ledger.mark_complete(
                &meeting_dir,
                UnitLevel::Meeting,
                &format!("Dokumente: {}, TOPs: {}", info.documents.len(), items.len()),
            )?;
            info!(documents = info.documents.len(), agenda_items = items.len(), "meeting complete");
        }
        Ok(complete)
    }

    // -----------------------------------------------------------------------
    // Agenda items
    // -----------------------------------------------------------------------

    #[instrument(skip_all, fields(top = item.sequence_index))]
    async fn process_agenda_item(
        &mut self,
        session: &mut dyn PageSession,
        meeting_context: &FailureContext,
        meeting_dir: &Path,
        item: &AgendaItem,
        progress: &dyn ProgressReporter,
    ) -> Result<bool> {
        let item_dir = self.ledger.layout().agenda_dir(meeting_dir, item);
        if self.ledger.is_complete(&item_dir, UnitLevel::AgendaItem) {
            debug!("agenda item already complete");
            return Ok(true);
        }

        ensure_dir(&item_dir)?;
        let context = FailureContext {
            agenda_item: Some(agenda_folder_name(item)),
            ..meeting_context.clone()
        };

        let carried = reusable_downloads(
            &item_dir,
            read_info::<AgendaInfo>(&item_dir, AGENDA_INFO_FILE)
                .map(|info| info.documents)
                .unwrap_or_default(),
        );

        let mut info = AgendaInfo {
            sequence_index: item.sequence_index,
            title: item.title.clone(),
            source_link: item.source_link.clone(),
            page_url: None,
            snapshots: Vec::new(),
            documents: carried.clone(),
            created_at: Utc::now(),
        };

        let opened = navigation::open_page(
            session,
            &self.retry,
            &item.source_link,
            self.navigation_delay,
        )
        .await;
        if self.absorb(opened, &context, "open agenda item")?.is_none() {
            write_info(&item_dir, AGENDA_INFO_FILE, &info)?;
            return Ok(false);
        }

        info.page_url = Some(session.location().await?);
        let auth = session.auth_context().await?;
        let mut complete = true;

        match self.absorb(
            session.persist_snapshot(&item_dir, AGENDA_SNAPSHOT).await,
            &context,
            "agenda snapshot",
        )? {
            Some(paths) => info.snapshots = file_names(&paths),
            None => complete = false,
        }

        let documents = self.absorb(
            session.extract_documents().await,
            &context,
            "extract agenda documents",
        )?;
        match documents {
            Some(documents) => {
                let (entries, all_stored) = self
                    .download_all(
                        &documents,
                        &item_dir,
                        &auth,
                        &context,
                        &carried,
                        progress,
                        &mut |so_far: Vec<DocumentEntry>| {
                            info.documents = so_far;
                            checkpoint(&item_dir, AGENDA_INFO_FILE, &info);
                        },
                    )
                    .await;
                info.documents = entries;
                complete &= all_stored;
            }
            // Unknown document list: earlier downloads stay on record.
            None => complete = false,
        }

        write_info(&item_dir, AGENDA_INFO_FILE, &info)?;

        if complete {
            self.ledger.mark_complete(
                &item_dir,
                UnitLevel::AgendaItem,
                &format!("Dokumente: {}", info.documents.len()),
            )?;
            debug!(documents = info.documents.len(), "agenda item complete");
        }
        Ok(complete)
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// Download `documents` one after another. Documents stored by an earlier
    /// run are carried over without a fetch. `record` receives the entries
    /// known so far after every attempt, still including carried entries that
    /// were not reached yet.
    #[allow(clippy::too_many_arguments)]
    async fn download_all(
        &mut self,
        documents: &[DocumentRef],
        dir: &Path,
        auth: &AuthContext,
        context: &FailureContext,
        carried: &[DocumentEntry],
        progress: &dyn ProgressReporter,
        record: &mut dyn FnMut(Vec<DocumentEntry>),
    ) -> (Vec<DocumentEntry>, bool) {
        let previous: HashMap<&str, &DocumentEntry> = carried
            .iter()
            .map(|entry| (entry.source_link.as_str(), entry))
            .collect();
        let mut entries = Vec::with_capacity(documents.len());
        let mut all_stored = true;
        let mut fetched = 0usize;

        for document in documents {
            if let Some(&entry) = previous.get(document.source_link.as_str()) {
                debug!(document = %document.display_name, "stored by an earlier run");
                entries.push(entry.clone());
                continue;
            }

            if fetched > 0 {
                navigation::pause(self.document_delay).await;
            }
            fetched += 1;

            let outcome = self
                .downloader
                .fetch_and_store(document, dir, auth, context)
                .await;
            progress.document_finished(&document.display_name, &outcome);

            if outcome.is_downloaded() {
                self.tally.downloaded += 1;
            } else {
                self.tally.failed += 1;
                all_stored = false;
            }
            entries.push(document_entry(document, &outcome));

            let pending = carried
                .iter()
                .filter(|c| !entries.iter().any(|e| e.source_link == c.source_link))
                .cloned();
            record(entries.iter().cloned().chain(pending).collect());
        }

        (entries, all_stored)
    }
}

/// Rewrite an info file mid-unit. A failed write only costs resumability.
fn checkpoint<T: serde::Serialize>(dir: &Path, file_name: &str, info: &T) {
    if let Err(e) = write_info(dir, file_name, info) {
        warn!(error = %e, file = file_name, "could not update info file");
    }
}

fn document_entry(document: &DocumentRef, outcome: &DownloadOutcome) -> DocumentEntry {
    DocumentEntry {
        name: document.display_name.clone(),
        source_link: document.source_link.clone(),
        status: outcome.status,
        file: outcome
            .local_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned()),
        bytes: outcome.bytes_written,
        sha256: outcome.sha256.clone(),
        reason: outcome.reason.clone(),
    }
}

/// Entries of a previous info file that were downloaded and whose file is still on disk.
fn reusable_downloads(dir: &Path, entries: Vec<DocumentEntry>) -> Vec<DocumentEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.status == DocumentStatus::Downloaded)
        .filter(|entry| {
            entry
                .file
                .as_deref()
                .is_some_and(|file| dir.join(file).is_file())
        })
        .collect()
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}
