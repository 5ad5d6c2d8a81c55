//! Meeting-row strategies for calendar pages.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{ExtractionStrategy, href_of, sel, text_of};
use crate::session::RawMeeting;

/// Day cell of a calendar row, e.g. `<td><span class="weekday">07</span> Mo</td>`.
const WEEKDAY_CELL: &str = "td:first-child span.weekday";

/// Meeting link inside a row.
const MEETING_LINK: &str = "a.smc_doc";

/// `"07"` → 7. Only bare one- or two-digit days in 1..=31.
fn parse_day(text: &str) -> Option<u8> {
    let text = text.trim();
    if text.is_empty() || text.len() > 2 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|d| (1..=31).contains(d))
}

/// Meeting titles shorter than three characters or purely numeric are noise.
fn is_meeting_title(title: &str) -> bool {
    title.chars().count() > 2 && !title.chars().all(|c| c.is_ascii_digit())
}

fn meetings_from_links<'a>(
    links: impl Iterator<Item = ElementRef<'a>>,
    day: u8,
    base: &Url,
) -> Vec<RawMeeting> {
    links
        .filter_map(|a| {
            let title = text_of(a);
            is_meeting_title(&title).then(|| RawMeeting {
                day,
                title,
                link: href_of(a, base).map(String::from),
            })
        })
        .collect()
}

fn row_day(row: ElementRef<'_>, day_cell: &Selector) -> Option<u8> {
    row.select(day_cell).next().and_then(|el| parse_day(&text_of(el)))
}

// ---------------------------------------------------------------------------
// WeekdayRows
// ---------------------------------------------------------------------------

/// Table rows with a weekday day cell and meeting links in the fourth column.
pub struct WeekdayRows {
    rows: Selector,
    day_cell: Selector,
    links: Selector,
}

impl WeekdayRows {
    pub fn new() -> Self {
        Self {
            rows: sel("table tr"),
            day_cell: sel(WEEKDAY_CELL),
            links: sel(&format!("td:nth-child(4) {MEETING_LINK}")),
        }
    }
}

impl Default for WeekdayRows {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy<RawMeeting> for WeekdayRows {
    fn extract(&self, doc: &Html, base: &Url) -> Vec<RawMeeting> {
        doc.select(&self.rows)
            .filter_map(|row| Some((row, row_day(row, &self.day_cell)?)))
            .flat_map(|(row, day)| meetings_from_links(row.select(&self.links), day, base))
            .collect()
    }

    fn name(&self) -> &str {
        "weekday-rows"
    }
}

// ---------------------------------------------------------------------------
// SessionCells
// ---------------------------------------------------------------------------

/// Cells labelled `data-label="Sitzung"`; the day comes from the enclosing row.
pub struct SessionCells {
    cells: Selector,
    day_cell: Selector,
    links: Selector,
}

impl SessionCells {
    pub fn new() -> Self {
        Self {
            cells: sel(r#"td[data-label="Sitzung"]"#),
            day_cell: sel(WEEKDAY_CELL),
            links: sel(MEETING_LINK),
        }
    }
}

impl Default for SessionCells {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy<RawMeeting> for SessionCells {
    fn extract(&self, doc: &Html, base: &Url) -> Vec<RawMeeting> {
        doc.select(&self.cells)
            .filter_map(|cell| {
                let row = cell.parent().and_then(ElementRef::wrap)?;
                Some((cell, row_day(row, &self.day_cell)?))
            })
            .flat_map(|(cell, day)| meetings_from_links(cell.select(&self.links), day, base))
            .collect()
    }

    fn name(&self) -> &str {
        "session-cells"
    }
}

// ---------------------------------------------------------------------------
// DayPrefixedRows
// ---------------------------------------------------------------------------

/// Any row whose first cell starts with a day number and that holds meeting links.
pub struct DayPrefixedRows {
    rows: Selector,
    first_cell: Selector,
    links: Selector,
}

impl DayPrefixedRows {
    pub fn new() -> Self {
        Self {
            rows: sel("tr"),
            first_cell: sel("td"),
            links: sel(MEETING_LINK),
        }
    }
}

impl Default for DayPrefixedRows {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy<RawMeeting> for DayPrefixedRows {
    fn extract(&self, doc: &Html, base: &Url) -> Vec<RawMeeting> {
        static LEADING_DAY: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^(\d{1,2})\b").expect("valid regex"));

        doc.select(&self.rows)
            .filter_map(|row| {
                let first = row.select(&self.first_cell).next()?;
                let text = text_of(first);
                let caps = LEADING_DAY.captures(&text)?;
                Some((row, parse_day(&caps[1])?))
            })
            .flat_map(|(row, day)| meetings_from_links(row.select(&self.links), day, base))
            .collect()
    }

    fn name(&self) -> &str {
        "day-prefixed-rows"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://ratsinfo.example.de/bi/si0040.asp").unwrap()
    }

    const CALENDAR: &str = r#"
        <table>
          <tr><th>Tag</th><th>Zeit</th><th>Ort</th><th>Sitzung</th></tr>
          <tr>
            <td><span class="weekday">7</span> Mo</td><td>18:00</td><td>Rathaus</td>
            <td><a class="smc_doc" href="si0057.asp?__ksinr=101">Magistrat</a></td>
          </tr>
          <tr>
            <td><span class="weekday">12</span> Sa</td><td>10:00</td><td>Bürgerhaus</td>
            <td>
              <a class="smc_doc" href="si0057.asp?__ksinr=102">Ortsbeirat Grüningen</a>
              <a class="smc_doc" href="si0057.asp?__ksinr=103">12</a>
            </td>
          </tr>
          <tr><td><span class="weekday">--</span></td><td></td><td></td>
            <td><a class="smc_doc" href="x">Ohne Tag</a></td></tr>
        </table>"#;

    #[test]
    fn weekday_rows_extract_day_title_link() {
        let doc = Html::parse_document(CALENDAR);
        let rows = WeekdayRows::new().extract(&doc, &base());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].day, 7);
        assert_eq!(rows[0].title, "Magistrat");
        assert_eq!(
            rows[0].link.as_deref(),
            Some("https://ratsinfo.example.de/bi/si0057.asp?__ksinr=101")
        );
        assert_eq!(rows[1].day, 12);
        assert_eq!(rows[1].title, "Ortsbeirat Grüningen");
    }

    #[test]
    fn session_cells_use_enclosing_row_day() {
        let doc = Html::parse_document(
            r#"<table><tr>
                <td><span class="weekday">03</span></td>
                <td data-label="Sitzung"><a class="smc_doc" href="si0057.asp?id=5">Bauausschuss</a></td>
            </tr></table>"#,
        );
        assert!(WeekdayRows::new().extract(&doc, &base()).is_empty());

        let rows = SessionCells::new().extract(&doc, &base());
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].day, rows[0].title.as_str()), (3, "Bauausschuss"));
    }

    #[test]
    fn day_prefixed_rows_as_last_resort() {
        let doc = Html::parse_document(
            r#"<table><tr>
                <td>21 Do</td>
                <td><a class="smc_doc" href="si0057.asp?id=9">Sozialausschuss</a></td>
            </tr></table>"#,
        );
        let rows = DayPrefixedRows::new().extract(&doc, &base());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].day, 21);
    }

    #[test]
    fn day_parsing_bounds() {
        assert_eq!(parse_day("07"), Some(7));
        assert_eq!(parse_day("31"), Some(31));
        assert_eq!(parse_day("0"), None);
        assert_eq!(parse_day("32"), None);
        assert_eq!(parse_day("1a"), None);
    }
}
