//! Collaborator interfaces consumed by the traversal engine.
//!
//! A [`PageSession`] is one stateful page context navigated in place; the
//! controller owns it exclusively for a run. A [`BinaryFetcher`] performs the
//! authenticated document fetches issued from that context.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ratsarchiv_shared::{AgendaItem, DocumentRef, Result, WalkDirection};

// ---------------------------------------------------------------------------
// AuthContext
// ---------------------------------------------------------------------------

/// Session credentials captured from the current page, attached to every
/// document fetch issued from it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    cookie_header: Option<String>,
    referer: Option<String>,
    anonymous: bool,
}

impl AuthContext {
    /// Context carrying a `Cookie` header value and the page it was captured on.
    pub fn new(cookie_header: impl Into<String>, referer: Option<String>) -> Self {
        let header = cookie_header.into();
        Self {
            cookie_header: (!header.trim().is_empty()).then_some(header),
            referer,
            anonymous: false,
        }
    }

    /// Context for a source that needs no sign-in.
    pub fn anonymous(referer: Option<String>) -> Self {
        Self {
            cookie_header: None,
            referer,
            anonymous: true,
        }
    }

    pub fn cookie_header(&self) -> Option<&str> {
        self.cookie_header.as_deref()
    }

    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// True when there is nothing to authenticate with and the session did
    /// not declare itself anonymous.
    pub fn is_missing(&self) -> bool {
        self.cookie_header.is_none() && !self.anonymous
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("cookies", &self.cookie_header.as_ref().map(|_| "<redacted>"))
            .field("referer", &self.referer)
            .field("anonymous", &self.anonymous)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Extracted rows
// ---------------------------------------------------------------------------

/// A meeting row as read from a calendar page, before it is stamped into a
/// `MeetingRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMeeting {
    pub day: u8,
    pub title: String,
    pub link: Option<String>,
}

/// Body of one fetched document.
#[derive(Debug, Clone)]
pub struct FetchedBinary {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One page context, navigated in place.
///
/// Links passed to [`open`](PageSession::open) may be relative to the current
/// page; links returned by the `extract_*` methods are absolute.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Human-readable label of the displayed calendar page, `None` if indeterminate.
    async fn current_unit_label(&mut self) -> Result<Option<String>>;

    /// Move one unit in `direction`. Returns whether the observed label changed.
    async fn navigate(&mut self, direction: WalkDirection) -> Result<bool>;

    /// Address of the current page, usable with [`open`](PageSession::open).
    async fn location(&self) -> Result<String>;

    async fn open(&mut self, link: &str) -> Result<()>;

    /// Meeting rows of the displayed calendar page.
    async fn extract_meetings(&mut self) -> Result<Vec<RawMeeting>>;

    /// Agenda items of the displayed meeting page, in source order.
    async fn extract_agenda_items(&mut self) -> Result<Vec<AgendaItem>>;

    /// Document links of the displayed page, deduplicated.
    async fn extract_documents(&mut self) -> Result<Vec<DocumentRef>>;

    /// Store a copy of the current page in `dir` under `stem`; returns the files written.
    async fn persist_snapshot(&mut self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>>;

    /// Credentials to attach to document fetches issued from the current page.
    async fn auth_context(&self) -> Result<AuthContext>;
}

/// Performs the network fetch for one document.
#[async_trait]
pub trait BinaryFetcher: Send + Sync {
    async fn fetch_binary(&self, url: &str, auth: &AuthContext) -> Result<FetchedBinary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cookie_header_is_missing() {
        let ctx = AuthContext::new("  ", Some("https://example.de/si0057.asp".into()));
        assert!(ctx.is_missing());
        assert!(ctx.cookie_header().is_none());

        let anon = AuthContext::anonymous(None);
        assert!(!anon.is_missing());
        assert!(anon.is_anonymous());
    }

    #[test]
    fn debug_redacts_cookies() {
        let ctx = AuthContext::new("ASPSESSIONID=secret", None);
        let debug = format!("{ctx:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("redacted"));
    }
}
