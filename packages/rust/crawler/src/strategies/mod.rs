//! Selector-fallback extraction strategies for calendar, meeting and agenda pages.
//!
//! Each page type has an ordered [`StrategyChain`]; strategies are tried in
//! priority order and the first non-empty result wins. Everything here is
//! synchronous over a parsed [`Html`] so callers can drop the document before
//! the next `.await`.

mod agenda;
mod documents;
mod meetings;

use ratsarchiv_shared::{AgendaItem, DocumentRef, MonthUnit, WalkDirection};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::session::RawMeeting;

pub use agenda::AgendaLinks;
pub use documents::DocumentLinks;
pub use meetings::{DayPrefixedRows, SessionCells, WeekdayRows};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One way of pulling typed rows out of a page.
pub trait ExtractionStrategy<T>: Send + Sync {
    /// Extract rows; an empty result hands over to the next strategy.
    fn extract(&self, doc: &Html, base: &Url) -> Vec<T>;

    /// Strategy name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Strategies in priority order.
pub struct StrategyChain<T> {
    strategies: Vec<Box<dyn ExtractionStrategy<T>>>,
}

impl<T> StrategyChain<T> {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy<T>>>) -> Self {
        Self { strategies }
    }

    /// Result of the first strategy that finds anything.
    pub fn extract(&self, doc: &Html, base: &Url) -> Vec<T> {
        for strategy in &self.strategies {
            let rows = strategy.extract(doc, base);
            if !rows.is_empty() {
                debug!(strategy = strategy.name(), count = rows.len(), "extraction strategy matched");
                return rows;
            }
        }
        debug!("no extraction strategy matched");
        Vec::new()
    }
}

/// Meeting rows: weekday table rows, then `data-label="Sitzung"` cells, then
/// any row whose first cell starts with a day number.
pub fn meeting_chain() -> StrategyChain<RawMeeting> {
    StrategyChain::new(vec![
        Box::new(WeekdayRows::new()),
        Box::new(SessionCells::new()),
        Box::new(DayPrefixedRows::new()),
    ])
}

/// Agenda links: `.tolink` cells first, then any agenda or proposal link.
pub fn agenda_chain() -> StrategyChain<AgendaItem> {
    StrategyChain::new(vec![
        Box::new(AgendaLinks::new(
            "tolink",
            r#"table tr .tolink a[href*="to0050.asp"], table tr .tolink a[href*="vo0050.asp"]"#,
        )),
        Box::new(AgendaLinks::new(
            "agenda-links",
            r#"a[href*="to0050.asp"], a[href*="vo0050.asp"]"#,
        )),
    ])
}

/// Document links: labelled download links, then any `getfile.asp` link.
pub fn document_chain() -> StrategyChain<DocumentRef> {
    StrategyChain::new(vec![
        Box::new(DocumentLinks::new("download-title", r#"a[title*="Dokument Download"]"#)),
        Box::new(DocumentLinks::new("download-aria", r#"a[aria-label*="Dokument Download"]"#)),
        Box::new(DocumentLinks::new("getfile", r#"a[href*="getfile.asp"]"#)),
    ])
}

// ---------------------------------------------------------------------------
// Page chrome: label and navigation arrows
// ---------------------------------------------------------------------------

/// Label of the displayed calendar page.
///
/// Prefers a heading mentioning the calendar, then title-ish elements; among
/// candidates the first one naming a month and year wins.
pub fn unit_label(doc: &Html) -> Option<String> {
    let headings = sel("h1, h2, h3");
    let mut candidates: Vec<String> = doc
        .select(&headings)
        .map(text_of)
        .filter(|t| {
            let lower = t.to_lowercase();
            lower.contains("kalender") || lower.contains("calendar")
        })
        .collect();

    for css in [".kalender-titel", ".calendar-title", ".page-title", "title"] {
        if let Some(el) = doc.select(&sel(css)).next() {
            candidates.push(text_of(el));
        }
    }

    candidates.retain(|t| !t.is_empty());
    candidates
        .iter()
        .find(|t| MonthUnit::parse_label(t).is_some())
        .or_else(|| candidates.first())
        .cloned()
}

/// Target of the previous/next arrow on a calendar page.
pub fn navigation_link(doc: &Html, base: &Url, direction: WalkDirection) -> Option<Url> {
    let (css, arrows): (&str, &[&str]) = match direction {
        WalkDirection::Backward => (
            r#"a.smcfiltermenuprev, a[title*="Zurück"], a[title*="Previous"]"#,
            &["‹", "←", "«"],
        ),
        WalkDirection::Forward => (
            r#"a.smcfiltermenunext, a[title*="Weiter"], a[title*="Next"]"#,
            &["›", "→", "»"],
        ),
    };

    let by_selector = doc.select(&sel(css)).find_map(|a| href_of(a, base));
    by_selector.or_else(|| {
        doc.select(&sel("a[href]"))
            .filter(|a| arrows.contains(&text_of(*a).as_str()))
            .find_map(|a| href_of(a, base))
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a selector literal.
pub(crate) fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Element text with whitespace runs collapsed.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolved `href` of an anchor, skipping fragments and script links.
pub(crate) fn href_of(el: ElementRef<'_>, base: &Url) -> Option<Url> {
    let href = el.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://ratsinfo.example.de/bi/si0040.asp").unwrap()
    }

    #[test]
    fn label_prefers_month_heading() {
        let doc = Html::parse_document(
            r#"<html><head><title>Ratsinformationssystem</title></head>
            <body><h1>Sitzungskalender</h1><h2>Kalender  Februar 2024</h2></body></html>"#,
        );
        assert_eq!(unit_label(&doc).as_deref(), Some("Kalender Februar 2024"));
    }

    #[test]
    fn label_falls_back_to_title() {
        let doc = Html::parse_document(
            "<html><head><title>Sitzungen März 2023</title></head><body><p>x</p></body></html>",
        );
        assert_eq!(unit_label(&doc).as_deref(), Some("Sitzungen März 2023"));

        let empty = Html::parse_document("<html><body></body></html>");
        assert!(unit_label(&empty).is_none());
    }

    #[test]
    fn navigation_arrows_resolve() {
        let doc = Html::parse_document(
            r#"<div>
                <a class="smcfiltermenuprev" href="si0040.asp?month=1&year=2024">‹</a>
                <a title="Weiter" href="/bi/si0040.asp?month=3&year=2024">›</a>
            </div>"#,
        );
        let prev = navigation_link(&doc, &base(), WalkDirection::Backward).unwrap();
        assert_eq!(prev.as_str(), "https://ratsinfo.example.de/bi/si0040.asp?month=1&year=2024");
        let next = navigation_link(&doc, &base(), WalkDirection::Forward).unwrap();
        assert!(next.as_str().ends_with("month=3&year=2024"));
    }

    #[test]
    fn navigation_falls_back_to_arrow_text() {
        let doc = Html::parse_document(r##"<a href="#">‹</a><a href="?m=prev">«</a>"##);
        let prev = navigation_link(&doc, &base(), WalkDirection::Backward).unwrap();
        assert!(prev.as_str().ends_with("si0040.asp?m=prev"));
        assert!(navigation_link(&doc, &base(), WalkDirection::Forward).is_none());
    }

    #[test]
    fn chain_uses_first_non_empty_strategy() {
        let doc = Html::parse_document(
            r#"<a href="getfile.asp?id=1">Einladung</a><a title="Dokument Download" href="getfile.asp?id=2">Niederschrift</a>"#,
        );
        let docs = document_chain().extract(&doc, &base());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].display_name, "Niederschrift");
    }
}
