//! HTTP page session and document fetcher (reqwest + scraper).
//!
//! [`HttpSession`] keeps the current page in memory and navigates in place,
//! holding session cookies in a shared jar. [`HttpFetcher`] fetches
//! documents with the cookies captured from that session attached explicitly,
//! so a fetch can never silently go out unauthenticated.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ratsarchiv_shared::{AgendaItem, Credentials, DocumentRef, HarvestError, Result, WalkDirection};
use ratsarchiv_storage::ensure_dir;
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, REFERER};
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::session::{AuthContext, BinaryFetcher, FetchedBinary, PageSession, RawMeeting};
use crate::strategies::{
    StrategyChain, agenda_chain, document_chain, meeting_chain, navigation_link, sel, unit_label,
};

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("Ratsarchiv/", env!("CARGO_PKG_VERSION"));

/// Transport-level timeout for page loads.
const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// `Accept` header sent with document fetches.
const DOCUMENT_ACCEPT: &str = "application/pdf,application/octet-stream,*/*";

/// Only meeting agenda pages carry agenda-item links.
const AGENDA_PAGE_HINT: &str = "si0057.asp";

/// Flatten a reqwest error and its sources into one line; DNS failures only
/// show up in the source chain.
fn describe(url: &str, err: &reqwest::Error) -> String {
    let mut msg = format!("{url}: {err}");
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        msg.push_str(": ");
        msg.push_str(&inner.to_string());
        source = std::error::Error::source(inner);
    }
    msg
}

/// Map a failed request. Name-resolution failures only reach us as text in the
/// source chain, so they are told apart here and nowhere else.
fn transport_error(
    url: &str,
    err: &reqwest::Error,
    other: fn(String) -> HarvestError,
) -> HarvestError {
    let msg = describe(url, err);
    if err.is_connect() && is_name_resolution_failure(&msg) {
        HarvestError::UnresolvableHost(msg)
    } else {
        other(msg)
    }
}

fn is_name_resolution_failure(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
}

fn build_client(jar: Option<Arc<Jar>>) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(PAGE_TIMEOUT);
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    builder
        .build()
        .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Document fetcher; carries no cookies of its own.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(None)?,
        })
    }
}

#[async_trait]
impl BinaryFetcher for HttpFetcher {
    async fn fetch_binary(&self, url: &str, auth: &AuthContext) -> Result<FetchedBinary> {
        let mut request = self.client.get(url).header(ACCEPT, DOCUMENT_ACCEPT);
        if let Some(cookies) = auth.cookie_header() {
            request = request.header(COOKIE, cookies);
        }
        if let Some(referer) = auth.referer() {
            request = request.header(REFERER, referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(url, &e, HarvestError::DownloadTransport))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::DownloadTransport(format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, &e, HarvestError::DownloadTransport))?;

        debug!(%url, bytes = bytes.len(), content_type = content_type.as_deref().unwrap_or("<none>"), "fetched document");
        Ok(FetchedBinary {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// HttpSession
// ---------------------------------------------------------------------------

struct LoadedPage {
    url: Url,
    body: String,
}

/// Form fields to post for a sign-in.
#[derive(Debug)]
struct LoginForm {
    action: Url,
    fields: Vec<(String, String)>,
    user_field: String,
    password_field: String,
}

/// Page session over plain HTTP.
pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
    page: Option<LoadedPage>,
    anonymous: bool,
    meetings: StrategyChain<RawMeeting>,
    agenda: StrategyChain<AgendaItem>,
    documents: StrategyChain<DocumentRef>,
}

impl HttpSession {
    /// A fresh, anonymous session with an empty cookie jar.
    pub fn new() -> Result<Self> {
        let jar = Arc::new(Jar::default());
        Ok(Self {
            client: build_client(Some(Arc::clone(&jar)))?,
            jar,
            page: None,
            anonymous: true,
            meetings: meeting_chain(),
            agenda: agenda_chain(),
            documents: document_chain(),
        })
    }

    /// Whether no sign-in has happened on this session.
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Load an absolute URL as the current page.
    pub async fn load(&mut self, url: &str) -> Result<()> {
        let url = Url::parse(url).map_err(|e| HarvestError::validation(format!("invalid URL '{url}': {e}")))?;
        self.page = Some(self.get(url).await?);
        Ok(())
    }

    /// Post `credentials` through the login form at `login_url`.
    ///
    /// Any failure is a [`HarvestError::CriticalAuthFailure`].
    #[instrument(skip_all, fields(login_url = %login_url))]
    pub async fn sign_in(&mut self, login_url: &str, credentials: &Credentials) -> Result<()> {
        let auth_err = |msg: String| HarvestError::CriticalAuthFailure(msg);

        let url = Url::parse(login_url).map_err(|e| auth_err(format!("invalid login URL: {e}")))?;
        let page = self
            .get(url)
            .await
            .map_err(|e| auth_err(format!("login page unreachable: {e}")))?;

        let form = find_login_form(&page.body, &page.url)
            .ok_or_else(|| auth_err(format!("no login form found at {}", page.url)))?;

        let mut fields = form.fields.clone();
        fields.push((form.user_field.clone(), credentials.username.clone()));
        fields.push((form.password_field.clone(), credentials.password.clone()));

        let response = self
            .client
            .post(form.action.clone())
            .header(REFERER, page.url.as_str())
            .form(&fields)
            .send()
            .await
            .map_err(|e| auth_err(describe(form.action.as_str(), &e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_err(format!("sign-in returned HTTP {}", status.as_u16())));
        }

        let landed = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| auth_err(describe(landed.as_str(), &e)))?;

        if find_login_form(&body, &landed).is_some() {
            return Err(auth_err("credentials rejected: login form shown again".into()));
        }

        info!(landed = %landed, "signed in");
        self.page = Some(LoadedPage { url: landed, body });
        self.anonymous = false;
        Ok(())
    }

    async fn get(&self, url: Url) -> Result<LoadedPage> {
        debug!(%url, "loading page");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), &e, HarvestError::Network))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Network(format!("{url}: HTTP {status}")));
        }

        let url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(url.as_str(), &e, HarvestError::Network))?;
        Ok(LoadedPage { url, body })
    }

    fn page(&self) -> Result<&LoadedPage> {
        self.page
            .as_ref()
            .ok_or_else(|| HarvestError::validation("no page loaded"))
    }

    /// Run `f` over the parsed current page. The parsed document never outlives the call.
    fn with_document<T>(&self, f: impl FnOnce(&Html, &Url) -> T) -> Result<T> {
        let page = self.page()?;
        let doc = Html::parse_document(&page.body);
        Ok(f(&doc, &page.url))
    }

    fn resolve(&self, link: &str) -> Result<Url> {
        let parsed = match &self.page {
            Some(page) => page.url.join(link),
            None => Url::parse(link),
        };
        parsed.map_err(|e| HarvestError::validation(format!("invalid link '{link}': {e}")))
    }

    fn label(&self) -> Option<String> {
        self.with_document(|doc, _| unit_label(doc)).ok().flatten()
    }
}

#[async_trait]
impl PageSession for HttpSession {
    async fn current_unit_label(&mut self) -> Result<Option<String>> {
        if self.page.is_none() {
            return Ok(None);
        }
        Ok(self.label())
    }

    async fn navigate(&mut self, direction: WalkDirection) -> Result<bool> {
        let before = self.label();
        let Some(target) = self.with_document(|doc, base| navigation_link(doc, base, direction))? else {
            debug!(%direction, "no navigation link on page");
            return Ok(false);
        };

        self.page = Some(self.get(target).await?);
        let after = self.label();
        Ok(after.is_some() && after != before)
    }

    async fn location(&self) -> Result<String> {
        Ok(self.page()?.url.to_string())
    }

    async fn open(&mut self, link: &str) -> Result<()> {
        let url = self.resolve(link)?;
        self.page = Some(self.get(url).await?);
        Ok(())
    }

    async fn extract_meetings(&mut self) -> Result<Vec<RawMeeting>> {
        self.with_document(|doc, base| self.meetings.extract(doc, base))
    }

    async fn extract_agenda_items(&mut self) -> Result<Vec<AgendaItem>> {
        let url = &self.page()?.url;
        if !url.path().contains(AGENDA_PAGE_HINT) {
            debug!(%url, "not an agenda page, no agenda items expected");
            return Ok(Vec::new());
        }
        self.with_document(|doc, base| self.agenda.extract(doc, base))
    }

    async fn extract_documents(&mut self) -> Result<Vec<DocumentRef>> {
        self.with_document(|doc, base| self.documents.extract(doc, base))
    }

    async fn persist_snapshot(&mut self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        let page = self.page()?;
        ensure_dir(dir)?;
        let path = dir.join(format!("{stem}.html"));
        tokio::fs::write(&path, page.body.as_bytes())
            .await
            .map_err(|e| HarvestError::io(&path, e))?;
        Ok(vec![path])
    }

    async fn auth_context(&self) -> Result<AuthContext> {
        let page = self.page()?;
        let referer = Some(page.url.to_string());
        let cookies = self
            .jar
            .cookies(&page.url)
            .and_then(|v| v.to_str().ok().map(str::to_string));

        Ok(match cookies {
            Some(header) => AuthContext::new(header, referer),
            None if self.anonymous => AuthContext::anonymous(referer),
            None => {
                warn!(url = %page.url, "signed-in session holds no cookies for this page");
                AuthContext::new("", referer)
            }
        })
    }
}

/// First form on the page that has a password input.
fn find_login_form(body: &str, page_url: &Url) -> Option<LoginForm> {
    let doc = Html::parse_document(body);
    let password_input = sel(r#"input[type="password"]"#);
    let user_input = sel(
        r#"input[name="username"], input[name="user"], input#username, input[type="text"], input[type="email"]"#,
    );
    let hidden_input = sel(r#"input[type="hidden"]"#);

    let form = doc
        .select(&sel("form"))
        .find(|f| f.select(&password_input).next().is_some())?;

    let password_field = form
        .select(&password_input)
        .find_map(|i| i.value().attr("name"))?
        .to_string();
    let user_field = form
        .select(&user_input)
        .find_map(|i| i.value().attr("name"))?
        .to_string();

    let fields = form
        .select(&hidden_input)
        .filter_map(|i| {
            let name = i.value().attr("name")?;
            Some((name.to_string(), i.value().attr("value").unwrap_or_default().to_string()))
        })
        .collect();

    let action = match form.value().attr("action").map(str::trim) {
        Some(a) if !a.is_empty() => page_url.join(a).ok()?,
        _ => page_url.clone(),
    };

    Some(LoginForm {
        action,
        fields,
        user_field,
        password_field,
    })
}
