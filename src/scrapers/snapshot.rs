//! Reads the rendered calendar table out of a page snapshot.
//!
//! The live DOM is only touched through the browser session; once loading is
//! done the page source is parsed here with `scraper`, which keeps row
//! classification and cell extraction testable against plain HTML.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Column, RawRow};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid selector {0:?}")]
    Selector(String),

    #[error("table #{0} not found")]
    TableMissing(String),
}

/// Where each piece of a row lives in the table markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowLayout {
    /// Cell whose presence makes a row a section header.
    pub header_cell: String,
    /// Rows matching this are data rows; anything else is ignored.
    pub data_row: String,
    pub time_cell: String,
    /// Cell holding the currency text and a flag element.
    pub currency_cell: String,
    /// Flag element inside the currency cell; the country is its `title`.
    pub country_flag: String,
    pub importance_cell: String,
    /// Icons counted inside the importance cell.
    pub importance_icon: String,
    pub event_cell: String,
    /// Preferred text source inside the event cell.
    pub event_link: String,
    pub actual_cell: String,
    pub forecast_cell: String,
    pub previous_cell: String,
}

impl Default for RowLayout {
    fn default() -> Self {
        Self {
            header_cell: "td.theDay".into(),
            data_row: "tr.js-event-item".into(),
            time_cell: "td.time".into(),
            currency_cell: "td.flagCur".into(),
            country_flag: "span".into(),
            importance_cell: "td.sentiment".into(),
            importance_icon: "i.grayFullBullishIcon".into(),
            event_cell: "td.event".into(),
            event_link: "a".into(),
            actual_cell: "td.act".into(),
            forecast_cell: "td.fore".into(),
            previous_cell: "td.prev".into(),
        }
    }
}

fn selector(css: &str) -> Result<Selector, SnapshotError> {
    Selector::parse(css).map_err(|_| SnapshotError::Selector(css.to_string()))
}

/// Compiled form of a [`RowLayout`].
struct CompiledLayout {
    header_cell: Selector,
    data_row: Selector,
    time_cell: Selector,
    currency_cell: Selector,
    country_flag: Selector,
    importance_cell: Selector,
    importance_icon: Selector,
    event_cell: Selector,
    event_link: Selector,
    actual_cell: Selector,
    forecast_cell: Selector,
    previous_cell: Selector,
}

impl CompiledLayout {
    fn compile(layout: &RowLayout) -> Result<Self, SnapshotError> {
        Ok(Self {
            header_cell: selector(&layout.header_cell)?,
            data_row: selector(&layout.data_row)?,
            time_cell: selector(&layout.time_cell)?,
            currency_cell: selector(&layout.currency_cell)?,
            country_flag: selector(&layout.country_flag)?,
            importance_cell: selector(&layout.importance_cell)?,
            importance_icon: selector(&layout.importance_icon)?,
            event_cell: selector(&layout.event_cell)?,
            event_link: selector(&layout.event_link)?,
            actual_cell: selector(&layout.actual_cell)?,
            forecast_cell: selector(&layout.forecast_cell)?,
            previous_cell: selector(&layout.previous_cell)?,
        })
    }

    fn classify(&self, row: ElementRef<'_>) -> Option<RawRow> {
        if let Some(cell) = row.select(&self.header_cell).next() {
            return Some(RawRow::header(text_of(cell)));
        }
        if self.data_row.matches(&row) {
            return Some(RawRow::Data {
                cells: self.cells(row),
            });
        }
        None
    }

    /// Cells in [`Column`] order, stopping at the first one that is missing.
    fn cells(&self, row: ElementRef<'_>) -> Vec<String> {
        let mut cells = Vec::with_capacity(Column::COUNT);
        for column in [
            Column::Time,
            Column::Country,
            Column::Currency,
            Column::Importance,
            Column::Event,
            Column::Actual,
            Column::Forecast,
            Column::Previous,
        ] {
            match self.cell(row, column) {
                Some(text) => cells.push(text),
                None => break,
            }
        }
        cells
    }

    fn cell(&self, row: ElementRef<'_>, column: Column) -> Option<String> {
        let first = |sel: &Selector| row.select(sel).next();
        match column {
            Column::Time => first(&self.time_cell).map(text_of),
            Column::Country => first(&self.currency_cell)?
                .select(&self.country_flag)
                .next()?
                .value()
                .attr("title")
                .map(|t| t.trim().to_string()),
            Column::Currency => first(&self.currency_cell).map(text_of),
            Column::Importance => first(&self.importance_cell)
                .map(|cell| cell.select(&self.importance_icon).count().to_string()),
            Column::Event => first(&self.event_cell).map(|cell| {
                cell.select(&self.event_link)
                    .next()
                    .map(text_of)
                    .unwrap_or_else(|| text_of(cell))
            }),
            Column::Actual => first(&self.actual_cell).map(text_of),
            Column::Forecast => first(&self.forecast_cell).map(text_of),
            Column::Previous => first(&self.previous_cell).map(text_of),
        }
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scan the rows of table `#table_id` in document order.
///
/// Rows that are neither headers nor data rows (spacers, "no events" notices)
/// are left out.
pub fn table_rows(
    html: &str,
    table_id: &str,
    layout: &RowLayout,
) -> Result<Vec<RawRow>, SnapshotError> {
    let compiled = CompiledLayout::compile(layout)?;
    let document = Html::parse_document(html);

    let table_sel = selector(&format!("table[id=\"{}\"]", table_id.replace('"', "\\\"")))?;
    let row_sel = selector("tr")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| SnapshotError::TableMissing(table_id.to_string()))?;

    Ok(table
        .select(&row_sel)
        .filter_map(|row| compiled.classify(row))
        .collect())
}
