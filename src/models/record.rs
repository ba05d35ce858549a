//! Scanned table rows and the normalized records built from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A row as scanned from the rendered table, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRow {
    /// Row that carries context (a date) for the data rows after it.
    SectionHeader { label: String },
    /// Row of cell texts in the fixed column order of [`Column`].
    Data { cells: Vec<String> },
}

impl RawRow {
    pub fn header(label: impl Into<String>) -> Self {
        Self::SectionHeader {
            label: label.into(),
        }
    }

    pub fn data<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Data {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }
}

/// Fixed cell positions of a data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Time = 0,
    Country = 1,
    Currency = 2,
    Importance = 3,
    Event = 4,
    Actual = 5,
    Forecast = 6,
    Previous = 7,
}

impl Column {
    pub const COUNT: usize = 8;

    pub fn name(self) -> &'static str {
        match self {
            Column::Time => "time",
            Column::Country => "country",
            Column::Currency => "currency",
            Column::Importance => "importance",
            Column::Event => "event",
            Column::Actual => "actual",
            Column::Forecast => "forecast",
            Column::Previous => "previous",
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a single data row could not be turned into a [`Record`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("missing {0} cell")]
    MissingCell(Column),

    #[error("invalid importance value: {0:?}")]
    InvalidImportance(String),
}

/// Normalized output unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Inherited from the most recent section header.
    pub date: NaiveDate,
    pub time: String,
    /// `"{date} {time}"`, kept for consumers that want a single sortable key.
    pub timestamp: String,
    pub country: String,
    pub currency: String,
    pub importance: u8,
    pub event: String,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
}

impl Record {
    /// Build a record from a data row's cells, dated `date`.
    pub fn from_cells(date: NaiveDate, cells: &[String]) -> Result<Self, RowError> {
        let cell = |column: Column| -> Result<String, RowError> {
            cells
                .get(column as usize)
                .map(|s| s.trim().to_string())
                .ok_or(RowError::MissingCell(column))
        };

        let time = cell(Column::Time)?;
        let importance_text = cell(Column::Importance)?;
        let importance = if importance_text.is_empty() {
            0
        } else {
            importance_text
                .parse::<u8>()
                .map_err(|_| RowError::InvalidImportance(importance_text.clone()))?
        };
        let event = cell(Column::Event)?;

        Ok(Self {
            date,
            timestamp: format!("{} {}", date.format("%Y-%m-%d"), time),
            time,
            country: cell(Column::Country)?,
            currency: cell(Column::Currency)?,
            importance,
            event,
            actual: cell(Column::Actual)?,
            forecast: cell(Column::Forecast)?,
            previous: cell(Column::Previous)?,
        })
    }
}
