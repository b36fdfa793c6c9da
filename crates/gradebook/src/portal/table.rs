//! Header-addressed view of the portal's `sg-asp-table` tables.

use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());

/// A table whose columns are located by header text.
#[derive(Debug, Clone)]
pub struct HeaderedTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl HeaderedTable {
    /// Reads a `<table>`. The first row holding `th` cells, or carrying the
    /// `sg-asp-table-header-row` class, is the header; later rows are data.
    ///
    /// Returns `None` when no header row exists.
    pub fn parse(table: ElementRef) -> Option<Self> {
        let mut headers: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for row in table.select(&ROW_SELECTOR) {
            let cells: Vec<ElementRef> = row.select(&CELL_SELECTOR).collect();
            if cells.is_empty() {
                continue;
            }

            if headers.is_none() {
                let is_header = row
                    .value()
                    .attr("class")
                    .unwrap_or_default()
                    .contains("header-row")
                    || cells.iter().all(|c| c.value().name() == "th");
                if is_header {
                    headers = Some(cells.iter().map(|c| normalize_header(&cell_text(c))).collect());
                }
                continue;
            }

            rows.push(cells.iter().map(cell_text).collect());
        }

        headers.map(|headers| Self { headers, rows })
    }

    /// Index of the first column whose header matches one of `names`.
    ///
    /// Exact matches win over prefix matches, so "Score" does not pick up
    /// "Weighted Score".
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        let wanted: Vec<String> = names.iter().map(|n| normalize_header(n)).collect();
        self.headers
            .iter()
            .position(|h| wanted.iter().any(|w| h == w))
            .or_else(|| {
                self.headers
                    .iter()
                    .position(|h| wanted.iter().any(|w| h.starts_with(w.as_str())))
            })
    }

    pub fn has_column(&self, names: &[&str]) -> bool {
        self.column(names).is_some()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// Cell text at `index`, or an empty string when the row is short.
pub fn cell(row: &[String], index: Option<usize>) -> &str {
    index
        .and_then(|i| row.get(i))
        .map(String::as_str)
        .unwrap_or("")
}

/// Text content with runs of whitespace (including `&nbsp;`) collapsed.
pub fn cell_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_header(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches([':', '.'])
        .replace('.', "")
        .to_lowercase()
}
