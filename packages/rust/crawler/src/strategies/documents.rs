//! Document-link strategies.

use std::collections::HashSet;

use ratsarchiv_shared::DocumentRef;
use scraper::{Html, Selector};
use url::Url;

use super::{ExtractionStrategy, href_of, sel, text_of};

/// Every document is served through this endpoint.
const DOCUMENT_ENDPOINT: &str = "getfile.asp";

/// Document links matched by one selector, deduplicated by (name, link).
pub struct DocumentLinks {
    name: &'static str,
    selector: Selector,
}

impl DocumentLinks {
    pub fn new(name: &'static str, css: &str) -> Self {
        Self {
            name,
            selector: sel(css),
        }
    }
}

impl ExtractionStrategy<DocumentRef> for DocumentLinks {
    fn extract(&self, doc: &Html, base: &Url) -> Vec<DocumentRef> {
        let mut seen = HashSet::new();
        doc.select(&self.selector)
            .filter_map(|a| {
                let link = href_of(a, base)?;
                if !link.as_str().contains(DOCUMENT_ENDPOINT) {
                    return None;
                }
                let mut display_name = text_of(a);
                if display_name.is_empty() {
                    display_name = a.value().attr("title").unwrap_or_default().trim().to_string();
                }
                if display_name.is_empty() {
                    return None;
                }
                Some(DocumentRef {
                    display_name,
                    source_link: link.into(),
                })
            })
            .filter(|d| seen.insert((d.display_name.clone(), d.source_link.clone())))
            .collect()
    }

    fn name(&self) -> &str {
        self.name
    }
}
