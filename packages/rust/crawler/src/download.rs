//! Download Resilience Layer: one bounded, cancellable attempt per document.
//!
//! Each call is a single attempt under a hard wall-clock budget. The body is
//! written to `<name>.part` and renamed into place, so a cancelled or failed
//! attempt never leaves a file under the final name. Every failure is
//! appended to the failure ledger; the layer itself never returns an error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ratsarchiv_shared::{DocumentRef, DocumentStatus, HarvestError, Result, RunId};
use ratsarchiv_storage::layout::{document_file_name, ensure_dir, unique_destination};
use ratsarchiv_storage::{FailureLedger, FailureRecord};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, trace, warn};

use crate::session::{AuthContext, BinaryFetcher};

/// Reason recorded when the budget is exceeded.
pub const REASON_TIMEOUT: &str = "timeout";

/// Reason returned for a duplicate concurrent attempt.
pub const REASON_IN_FLIGHT: &str = "already-in-flight";

// ---------------------------------------------------------------------------
// Outcome / context
// ---------------------------------------------------------------------------

/// Result of one attempt.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub status: DocumentStatus,
    pub bytes_written: u64,
    pub duration_ms: u64,
    pub local_path: Option<PathBuf>,
    pub sha256: Option<String>,
    pub reason: Option<String>,
}

impl DownloadOutcome {
    fn failed(reason: impl Into<String>, started: Instant) -> Self {
        Self {
            status: DocumentStatus::Failed,
            bytes_written: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            local_path: None,
            sha256: None,
            reason: Some(reason.into()),
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.status == DocumentStatus::Downloaded
    }
}

/// Where in the hierarchy a document sits, for failure-ledger entries.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub run_id: RunId,
    pub month: String,
    pub meeting: String,
    pub agenda_item: Option<String>,
}

impl FailureContext {
    pub fn record(&self, document: &str, reason: &str) -> FailureRecord {
        FailureRecord::new(
            &self.run_id,
            &self.month,
            &self.meeting,
            self.agenda_item.as_deref(),
            document,
            reason,
        )
    }
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

/// Whether `content_type` names a binary document we expect to store.
pub fn is_binary_document_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        mime.as_str(),
        "application/pdf" | "application/octet-stream" | "application/msword" | "application/zip"
    ) || mime.starts_with("application/vnd.")
        || mime.starts_with("image/")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Advisory hint after each attempt. Memory is reclaimed on drop, so this only traces.
fn reclaim_memory_hint() {
    trace!("download attempt finished, buffers released");
}

// ---------------------------------------------------------------------------
// DocumentDownloader
// ---------------------------------------------------------------------------

/// Removes its key from the in-flight set when dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<(String, PathBuf)>>>,
    key: (String, PathBuf),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

/// Fetches documents and stores them under a destination directory.
pub struct DocumentDownloader {
    fetcher: Arc<dyn BinaryFetcher>,
    ledger: FailureLedger,
    budget: Duration,
    in_flight: Arc<Mutex<HashSet<(String, PathBuf)>>>,
}

impl DocumentDownloader {
    pub fn new(fetcher: Arc<dyn BinaryFetcher>, ledger: FailureLedger, budget: Duration) -> Self {
        Self {
            fetcher,
            ledger,
            budget,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    fn claim(&self, document: &DocumentRef, dest_dir: &Path) -> Option<InFlightGuard> {
        let key = (document.source_link.clone(), dest_dir.to_path_buf());
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// Fetch `document` and store it in `dest_dir`.
    ///
    /// Never fails: every error becomes a `Failed` outcome with a reason, and
    /// every failure except a duplicate in-flight attempt is appended to the
    /// failure ledger.
    #[instrument(skip_all, fields(document = %document.display_name))]
    pub async fn fetch_and_store(
        &self,
        document: &DocumentRef,
        dest_dir: &Path,
        auth: &AuthContext,
        context: &FailureContext,
    ) -> DownloadOutcome {
        let started = Instant::now();

        let Some(_guard) = self.claim(document, dest_dir) else {
            debug!(link = %document.source_link, "attempt already in flight");
            return DownloadOutcome::failed(REASON_IN_FLIGHT, started);
        };

        let outcome = match self.attempt(document, dest_dir, auth).await {
            Ok((path, bytes_written, sha256)) => {
                info!(
                    path = %path.display(),
                    bytes = bytes_written,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "document stored"
                );
                DownloadOutcome {
                    status: DocumentStatus::Downloaded,
                    bytes_written,
                    duration_ms: started.elapsed().as_millis() as u64,
                    local_path: Some(path),
                    sha256: Some(sha256),
                    reason: None,
                }
            }
            Err(e) => {
                let reason = failure_reason(&e);
                warn!(link = %document.source_link, %reason, "document download failed");
                if let Err(ledger_err) = self
                    .ledger
                    .append(&context.record(&document.display_name, &reason))
                {
                    warn!(error = %ledger_err, "could not append to failure ledger");
                }
                DownloadOutcome::failed(reason, started)
            }
        };

        reclaim_memory_hint();
        outcome
    }

    async fn attempt(
        &self,
        document: &DocumentRef,
        dest_dir: &Path,
        auth: &AuthContext,
    ) -> Result<(PathBuf, u64, String)> {
        if auth.is_missing() {
            return Err(HarvestError::DownloadTransport(
                "missing authentication context".into(),
            ));
        }

        ensure_dir(dest_dir)?;
        let dest = unique_destination(dest_dir, &document_file_name(&document.display_name));
        let part = part_path(&dest);

        let transfer = async {
            let fetched = self.fetcher.fetch_binary(&document.source_link, auth).await?;

            match fetched.content_type.as_deref() {
                Some(ct) if is_binary_document_type(ct) => {}
                other => warn!(
                    content_type = other.unwrap_or("<none>"),
                    link = %document.source_link,
                    "unexpected content type, storing anyway"
                ),
            }

            tokio::fs::write(&part, &fetched.bytes)
                .await
                .map_err(|e| HarvestError::io(&part, e))?;
            tokio::fs::rename(&part, &dest)
                .await
                .map_err(|e| HarvestError::io(&dest, e))?;

            Ok::<_, HarvestError>((fetched.bytes.len() as u64, sha256_hex(&fetched.bytes)))
        };

        let result = match tokio::time::timeout(self.budget, transfer).await {
            Ok(inner) => inner,
            Err(_) => Err(HarvestError::DownloadTimeout {
                budget_ms: self.budget.as_millis() as u64,
            }),
        };

        match result {
            Ok((bytes, sha256)) => Ok((dest, bytes, sha256)),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %part.display(), error = %rm, "could not remove partial file");
                    }
                }
                Err(e)
            }
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Ledger reason for an error: `timeout`, `HTTP <status>`, or the transport text.
fn failure_reason(error: &HarvestError) -> String {
    match error {
        HarvestError::DownloadTimeout { .. } => REASON_TIMEOUT.to_string(),
        HarvestError::DownloadTransport(msg)
        | HarvestError::Network(msg)
        | HarvestError::UnresolvableHost(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::session::FetchedBinary;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ra-download-{tag}-{}", uuid::Uuid::now_v7()))
    }

    fn context() -> FailureContext {
        FailureContext {
            run_id: RunId::new(),
            month: "Kalender_2024_Januar".into(),
            meeting: "07_Magistrat".into(),
            agenda_item: None,
        }
    }

    fn doc(name: &str, link: &str) -> DocumentRef {
        DocumentRef {
            display_name: name.into(),
            source_link: link.into(),
        }
    }

    fn auth() -> AuthContext {
        AuthContext::new("ASPSESSIONID=abc", Some("https://ratsinfo.example.de/si0057.asp".into()))
    }

    /// Returns a fixed body and counts calls.
    struct StaticFetcher {
        body: &'static [u8],
        content_type: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BinaryFetcher for StaticFetcher {
        async fn fetch_binary(&self, _url: &str, _auth: &AuthContext) -> Result<FetchedBinary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedBinary {
                bytes: self.body.to_vec(),
                content_type: self.content_type.map(str::to_string),
            })
        }
    }

    /// Never resolves.
    struct HangingFetcher;

    #[async_trait]
    impl BinaryFetcher for HangingFetcher {
        async fn fetch_binary(&self, _url: &str, _auth: &AuthContext) -> Result<FetchedBinary> {
            std::future::pending().await
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl BinaryFetcher for FailingFetcher {
        async fn fetch_binary(&self, _url: &str, _auth: &AuthContext) -> Result<FetchedBinary> {
            Err(HarvestError::DownloadTransport("HTTP 500".into()))
        }
    }

    fn downloader(fetcher: Arc<dyn BinaryFetcher>, root: &Path, budget: Duration) -> DocumentDownloader {
        DocumentDownloader::new(fetcher, FailureLedger::new(root.join("failed_downloads.jsonl")), budget)
    }

    #[tokio::test]
    async fn stores_document_with_hash() {
        let root = temp_root("ok");
        let fetcher = Arc::new(StaticFetcher {
            body: b"%PDF-1.4 test",
            content_type: Some("application/pdf"),
            calls: AtomicUsize::new(0),
        });
        let dl = downloader(fetcher.clone(), &root, Duration::from_secs(5));
        let dest = root.join("meeting");

        let outcome = dl
            .fetch_and_store(&doc("Einladung", "https://x/getfile.asp?id=1"), &dest, &auth(), &context())
            .await;

        assert!(outcome.is_downloaded());
        assert_eq!(outcome.bytes_written, 13);
        assert_eq!(outcome.local_path.as_deref(), Some(dest.join("Einladung.pdf").as_path()));
        assert_eq!(outcome.sha256.as_ref().map(String::len), Some(64));
        assert!(!dest.join("Einladung.pdf.part").exists());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(dl.ledger().read_all().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn timeout_fails_and_logs_exactly_once() {
        let root = temp_root("timeout");
        let dl = downloader(Arc::new(HangingFetcher), &root, Duration::from_millis(50));
        let dest = root.join("meeting");

        let outcome = dl
            .fetch_and_store(&doc("Vorlage", "https://x/getfile.asp?id=2"), &dest, &auth(), &context())
            .await;

        assert_eq!(outcome.status, DocumentStatus::Failed);
        assert_eq!(outcome.reason.as_deref(), Some(REASON_TIMEOUT));
        let records = dl.ledger().read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, "timeout");
        assert_eq!(records[0].document, "Vorlage");
        assert_eq!(records[0].agenda_item, "N/A");
        assert!(!dest.join("Vorlage.pdf").exists());
        assert!(!dest.join("Vorlage.pdf.part").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn name_collision_gets_counter() {
        let root = temp_root("collision");
        let fetcher = Arc::new(StaticFetcher {
            body: b"%PDF",
            content_type: Some("application/pdf"),
            calls: AtomicUsize::new(0),
        });
        let dl = downloader(fetcher, &root, Duration::from_secs(5));
        let dest = root.join("meeting");

        let first = dl
            .fetch_and_store(&doc("Beschluss.pdf", "https://x/getfile.asp?id=10"), &dest, &auth(), &context())
            .await;
        let second = dl
            .fetch_and_store(&doc("Beschluss.pdf", "https://x/getfile.asp?id=11"), &dest, &auth(), &context())
            .await;

        assert_eq!(first.local_path, Some(dest.join("Beschluss.pdf")));
        assert_eq!(second.local_path, Some(dest.join("Beschluss_1.pdf")));
        assert!(dest.join("Beschluss.pdf").exists());
        assert!(dest.join("Beschluss_1.pdf").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn http_error_reason_is_recorded() {
        let root = temp_root("http");
        let dl = downloader(Arc::new(FailingFetcher), &root, Duration::from_secs(5));

        let mut ctx = context();
        ctx.agenda_item = Some("TOP_1_Haushalt".into());
        let outcome = dl
            .fetch_and_store(&doc("Anlage", "https://x/getfile.asp?id=3"), &root.join("m"), &auth(), &ctx)
            .await;

        assert_eq!(outcome.reason.as_deref(), Some("HTTP 500"));
        let records = dl.ledger().read_all().unwrap();
        assert_eq!(records[0].agenda_item, "TOP_1_Haushalt");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_auth_context_is_refused_before_fetch() {
        let root = temp_root("noauth");
        let fetcher = Arc::new(StaticFetcher {
            body: b"%PDF",
            content_type: Some("application/pdf"),
            calls: AtomicUsize::new(0),
        });
        let dl = downloader(fetcher.clone(), &root, Duration::from_secs(5));

        let outcome = dl
            .fetch_and_store(
                &doc("Einladung", "https://x/getfile.asp?id=1"),
                &root.join("m"),
                &AuthContext::default(),
                &context(),
            )
            .await;

        assert_eq!(outcome.status, DocumentStatus::Failed);
        assert_eq!(outcome.reason.as_deref(), Some("missing authentication context"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dl.ledger().read_all().unwrap().len(), 1);

        let anon = dl
            .fetch_and_store(
                &doc("Einladung", "https://x/getfile.asp?id=1"),
                &root.join("m"),
                &AuthContext::anonymous(None),
                &context(),
            )
            .await;
        assert!(anon.is_downloaded());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unexpected_content_type_is_still_stored() {
        let root = temp_root("ctype");
        let fetcher = Arc::new(StaticFetcher {
            body: b"<html>login</html>",
            content_type: Some("text/html; charset=utf-8"),
            calls: AtomicUsize::new(0),
        });
        let dl = downloader(fetcher, &root, Duration::from_secs(5));

        let outcome = dl
            .fetch_and_store(&doc("Protokoll", "https://x/getfile.asp?id=4"), &root.join("m"), &auth(), &context())
            .await;
        assert!(outcome.is_downloaded());
        assert!(root.join("m").join("Protokoll.pdf").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn duplicate_in_flight_attempt_is_rejected() {
        let root = temp_root("inflight");
        let dl = Arc::new(downloader(Arc::new(HangingFetcher), &root, Duration::from_millis(300)));
        let dest = root.join("m");
        let document = doc("Vorlage", "https://x/getfile.asp?id=9");

        let first = {
            let dl = Arc::clone(&dl);
            let dest = dest.clone();
            let document = document.clone();
            tokio::spawn(async move { dl.fetch_and_store(&document, &dest, &auth(), &context()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = dl.fetch_and_store(&document, &dest, &auth(), &context()).await;
        assert_eq!(second.reason.as_deref(), Some(REASON_IN_FLIGHT));

        let first = first.await.unwrap();
        assert_eq!(first.reason.as_deref(), Some(REASON_TIMEOUT));
        // Only the timed-out attempt reaches the ledger.
        assert_eq!(dl.ledger().read_all().unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn recognizes_binary_types() {
        assert!(is_binary_document_type("application/pdf"));
        assert!(is_binary_document_type("application/octet-stream; charset=binary"));
        assert!(is_binary_document_type(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        ));
        assert!(is_binary_document_type("image/png"));
        assert!(!is_binary_document_type("text/html"));
    }
}
