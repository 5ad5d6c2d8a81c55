//! Agenda-item link strategies for meeting pages.

use ratsarchiv_shared::AgendaItem;
use scraper::{Html, Selector};
use url::Url;

use super::{ExtractionStrategy, href_of, sel, text_of};

/// Agenda links matched by one selector; numbered 1.. in source order.
pub struct AgendaLinks {
    name: &'static str,
    selector: Selector,
}

impl AgendaLinks {
    pub fn new(name: &'static str, css: &str) -> Self {
        Self {
            name,
            selector: sel(css),
        }
    }
}

impl ExtractionStrategy<AgendaItem> for AgendaLinks {
    fn extract(&self, doc: &Html, base: &Url) -> Vec<AgendaItem> {
        // Numbering follows every matched link, so a skipped empty link keeps its slot.
        doc.select(&self.selector)
            .enumerate()
            .filter_map(|(idx, a)| {
                let title = text_of(a);
                let link = href_of(a, base)?;
                (!title.is_empty()).then(|| AgendaItem {
                    sequence_index: idx as u32 + 1,
                    title,
                    source_link: link.into(),
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::agenda_chain;

    fn base() -> Url {
        Url::parse("https://ratsinfo.example.de/bi/si0057.asp?__ksinr=101").unwrap()
    }

    #[test]
    fn tolink_cells_in_source_order() {
        let doc = Html::parse_document(
            r#"<table>
              <tr><td class="tolink"><a href="to0050.asp?__ktonr=1">Eröffnung</a></td></tr>
              <tr><td class="tolink"><a href="vo0050.asp?__kvonr=7">Haushaltssatzung 2024</a></td></tr>
              <tr><td><a href="to0050.asp?__ktonr=3">Nicht in tolink</a></td></tr>
            </table>"#,
        );
        let items = agenda_chain().extract(&doc, &base());

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sequence_index, 1);
        assert_eq!(items[0].title, "Eröffnung");
        assert_eq!(items[1].sequence_index, 2);
        assert_eq!(
            items[1].source_link,
            "https://ratsinfo.example.de/bi/vo0050.asp?__kvonr=7"
        );
    }

    #[test]
    fn falls_back_to_any_agenda_link() {
        let doc = Html::parse_document(
            r#"<ul><li><a href="to0050.asp?__ktonr=1">Bericht</a></li>
               <li><a href="to0050.asp?__ktonr=2"> </a></li>
               <li><a href="to0050.asp?__ktonr=3">Verschiedenes</a></li></ul>"#,
        );
        let items = agenda_chain().extract(&doc, &base());
        let indices: Vec<u32> = items.iter().map(|i| i.sequence_index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn no_agenda_is_empty() {
        let doc = Html::parse_document("<p>Keine Tagesordnung</p>");
        assert!(agenda_chain().extract(&doc, &base()).is_empty());
    }
}
