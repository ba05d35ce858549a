//! Table parsing: a left-to-right fold over scanned rows.
//!
//! The only state carried across rows is the date of the most recent section
//! header. Header labels that don't parse clear it, so data rows below an
//! unreadable header are dropped rather than misdated.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::models::{DateWindow, RawRow, Record};

/// Section-date label formats, tried in order.
static SECTION_DATE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // 2024年1月5日 星期五
        (Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日").unwrap(), "ymd"),
        // 2024-01-05, 2024/01/05
        (Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").unwrap(), "ymd"),
        // Friday, January 5, 2024 / Jan 5, 2024
        (
            Regex::new(r"([A-Za-z]{3,9})\.?\s+(\d{1,2}),\s*(\d{4})").unwrap(),
            "month_dy",
        ),
        // 5 January 2024
        (
            Regex::new(r"(\d{1,2})\s+([A-Za-z]{3,9})\.?,?\s+(\d{4})").unwrap(),
            "d_month_y",
        ),
        // 01/05/2024
        (Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap(), "mdy"),
    ]
});

fn month_date(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{} {} {}", year, month, day), "%Y %B %d").ok()
}

fn numeric_date(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Parse a section header label into a date.
pub fn parse_section_date(label: &str) -> Option<NaiveDate> {
    let label = label.trim();
    for (pattern, format) in SECTION_DATE_PATTERNS.iter() {
        let Some(caps) = pattern.captures(label) else {
            continue;
        };
        let date = match *format {
            "ymd" => numeric_date(&caps[1], &caps[2], &caps[3]),
            "month_dy" => month_date(&caps[3], &caps[1], &caps[2]),
            "d_month_y" => month_date(&caps[3], &caps[2], &caps[1]),
            "mdy" => numeric_date(&caps[3], &caps[1], &caps[2]),
            _ => None,
        };
        if date.is_some() {
            return date;
        }
    }
    None
}

/// Parser state between rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    pub section_date: Option<NaiveDate>,
}

impl ScanState {
    /// Consume one row: the next state, plus the record it yields if any.
    pub fn step(self, row: &RawRow, window: &DateWindow) -> (ScanState, Option<Record>) {
        match row {
            RawRow::SectionHeader { label } => {
                let section_date = parse_section_date(label);
                if section_date.is_none() {
                    debug!("Unparsable section header {:?}", label);
                }
                (ScanState { section_date }, None)
            }
            RawRow::Data { cells } => {
                let Some(date) = self.section_date else {
                    debug!("Dropping row without section date: {:?}", cells);
                    return (self, None);
                };
                if !window.contains(date) {
                    return (self, None);
                }
                match Record::from_cells(date, cells) {
                    Ok(record) => (self, Some(record)),
                    Err(e) => {
                        debug!("Skipping row dated {}: {}", date, e);
                        (self, None)
                    }
                }
            }
        }
    }
}

/// Fold `rows` starting from `state`.
pub fn scan(rows: &[RawRow], state: ScanState, window: &DateWindow) -> (ScanState, Vec<Record>) {
    rows.iter()
        .fold((state, Vec::new()), |(state, mut records), row| {
            let (next, record) = state.step(row, window);
            records.extend(record);
            (next, records)
        })
}

/// Records for every well-formed, in-window data row.
pub fn parse(rows: &[RawRow], window: &DateWindow) -> Vec<Record> {
    scan(rows, ScanState::default(), window).1
}
