//! In-memory page session and fetcher for controller tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ratsarchiv_crawler::{AuthContext, BinaryFetcher, FetchedBinary, PageSession, RawMeeting};
use ratsarchiv_shared::{
    AgendaItem, DocumentRef, HarvestConfig, HarvestError, MonthUnit, Result, WalkDirection,
};

pub(crate) fn calendar_location(unit: &MonthUnit) -> String {
    format!("kalender:{}-{:02}", unit.year, unit.month.number())
}

pub(crate) fn document_link(page: &str, name: &str) -> String {
    format!("https://rats.example/getfile.asp?page={page}&name={name}")
}

pub(crate) fn test_config(root: &Path) -> HarvestConfig {
    HarvestConfig {
        output_root: root.to_path_buf(),
        direction: WalkDirection::Backward,
        max_units: 12,
        download_timeout: Duration::from_secs(2),
        document_delay: Duration::ZERO,
        navigation_delay: Duration::ZERO,
        retry_attempts: 2,
        retry_delay: Duration::from_millis(1),
        seek_limit: 24,
    }
}

// ---------------------------------------------------------------------------
// Site
// ---------------------------------------------------------------------------

/// Calendar months, meeting pages and agenda pages of a scripted source.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSite {
    months: HashMap<MonthUnit, Vec<RawMeeting>>,
    agendas: HashMap<String, Vec<AgendaItem>>,
    documents: HashMap<String, Vec<DocumentRef>>,
}

impl FakeSite {
    pub fn add_meeting(&mut self, unit: MonthUnit, day: u8, title: &str, link: Option<&str>) {
        self.months.entry(unit).or_default().push(RawMeeting {
            day,
            title: title.to_string(),
            link: link.map(str::to_string),
        });
        if let Some(link) = link {
            self.documents.entry(link.to_string()).or_default();
        }
    }

    pub fn add_documents(&mut self, page: &str, names: &[&str]) {
        let docs = self.documents.entry(page.to_string()).or_default();
        docs.extend(names.iter().map(|name| DocumentRef {
            display_name: name.to_string(),
            source_link: document_link(page, name),
        }));
    }

    /// Agenda items `(title, link)` of a meeting page, numbered in order.
    pub fn add_agenda(&mut self, meeting: &str, items: &[(&str, &str)]) {
        let agenda = self.agendas.entry(meeting.to_string()).or_default();
        for (title, link) in items {
            agenda.push(AgendaItem {
                sequence_index: agenda.len() as u32 + 1,
                title: title.to_string(),
                source_link: link.to_string(),
            });
            self.documents.entry(link.to_string()).or_default();
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Page {
    Calendar(MonthUnit),
    Detail(String),
}

/// Page session over a [`FakeSite`]; navigation stops at `earliest`/`latest`.
pub(crate) struct ScriptedSession {
    site: FakeSite,
    page: Page,
    earliest: MonthUnit,
    latest: MonthUnit,
    pub fail_navigation: bool,
    pub fail_calendar_return: bool,
    pub opened: Vec<String>,
    pub meeting_extractions: usize,
}

impl ScriptedSession {
    pub fn new(site: FakeSite, at: MonthUnit, earliest: MonthUnit, latest: MonthUnit) -> Self {
        Self {
            site,
            page: Page::Calendar(at),
            earliest,
            latest,
            fail_navigation: false,
            fail_calendar_return: false,
            opened: Vec::new(),
            meeting_extractions: 0,
        }
    }

    pub fn current_month(&self) -> Option<MonthUnit> {
        match &self.page {
            Page::Calendar(unit) => Some(*unit),
            Page::Detail(_) => None,
        }
    }

    fn detail_link(&self) -> Option<&str> {
        match &self.page {
            Page::Detail(link) => Some(link),
            Page::Calendar(_) => None,
        }
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn current_unit_label(&mut self) -> Result<Option<String>> {
        Ok(self
            .current_month()
            .map(|unit| format!("Sitzungskalender {unit}")))
    }

    async fn navigate(&mut self, direction: WalkDirection) -> Result<bool> {
        if self.fail_navigation {
            return Err(HarvestError::parse("navigation control missing"));
        }
        let Some(unit) = self.current_month() else {
            return Err(HarvestError::parse("not on a calendar page"));
        };
        let next = unit.step(direction);
        if next.ordinal() < self.earliest.ordinal() || next.ordinal() > self.latest.ordinal() {
            return Ok(false);
        }
        self.page = Page::Calendar(next);
        Ok(true)
    }

    async fn location(&self) -> Result<String> {
        Ok(match &self.page {
            Page::Calendar(unit) => calendar_location(unit),
            Page::Detail(link) => link.clone(),
        })
    }

    async fn open(&mut self, link: &str) -> Result<()> {
        self.opened.push(link.to_string());
        if let Some(month) = link.strip_prefix("kalender:") {
            if self.fail_calendar_return {
                return Err(HarvestError::Network(format!("HTTP 503 for {link}")));
            }
            self.page = Page::Calendar(MonthUnit::parse_year_month(month)?);
            return Ok(());
        }
        if !self.site.documents.contains_key(link) {
            return Err(HarvestError::Network(format!("HTTP 404 for {link}")));
        }
        self.page = Page::Detail(link.to_string());
        Ok(())
    }

    async fn extract_meetings(&mut self) -> Result<Vec<RawMeeting>> {
        self.meeting_extractions += 1;
        Ok(self
            .current_month()
            .and_then(|unit| self.site.months.get(&unit).cloned())
            .unwrap_or_default())
    }

    async fn extract_agenda_items(&mut self) -> Result<Vec<AgendaItem>> {
        Ok(self
            .detail_link()
            .and_then(|link| self.site.agendas.get(link).cloned())
            .unwrap_or_default())
    }

    async fn extract_documents(&mut self) -> Result<Vec<DocumentRef>> {
        Ok(self
            .detail_link()
            .and_then(|link| self.site.documents.get(link).cloned())
            .unwrap_or_default())
    }

    async fn persist_snapshot(&mut self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        let path = dir.join(format!("{stem}.html"));
        let body = format!("<html><body>{}</body></html>", self.location().await?);
        std::fs::write(&path, body).map_err(|e| HarvestError::io(&path, e))?;
        Ok(vec![path])
    }

    async fn auth_context(&self) -> Result<AuthContext> {
        Ok(AuthContext::new(
            "ASPSESSIONID=scripted",
            Some(self.location().await?),
        ))
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Records every fetch; links marked with [`fail`](Self::fail) answer 404.
#[derive(Default)]
pub(crate) struct CountingFetcher {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl CountingFetcher {
    pub fn fail(&self, link: &str) {
        self.failing.lock().unwrap().insert(link.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count_for(&self, link: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|l| *l == link).count()
    }
}

#[async_trait]
impl BinaryFetcher for CountingFetcher {
    async fn fetch_binary(&self, url: &str, _auth: &AuthContext) -> Result<FetchedBinary> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing.lock().unwrap().contains(url) {
            return Err(HarvestError::DownloadTransport("HTTP 404".into()));
        }
        Ok(FetchedBinary {
            bytes: format!("%PDF-1.4 {url}").into_bytes(),
            content_type: Some("application/pdf".into()),
        })
    }
}
