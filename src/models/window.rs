//! Date windows and the chunks they are split into.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::harvest::HarvestError;

/// Inclusive `[start, end]` range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Create a window, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, HarvestError> {
        if start > end {
            return Err(HarvestError::InvalidWindow(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether `date` falls inside the window (both ends inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Deterministic identifier used to name this window's artifact.
    pub fn chunk_id(&self) -> String {
        format!(
            "{}_{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One bounded sub-window of a run, processed as an isolated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Zero-based position in the run's plan.
    pub index: usize,
    pub window: DateWindow,
}

impl Chunk {
    pub fn new(index: usize, window: DateWindow) -> Self {
        Self { index, window }
    }

    /// Artifact identifier, `start_end` in ISO dates.
    pub fn id(&self) -> String {
        self.window.chunk_id()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.window)
    }
}

/// What the remote view should show: selected labels plus the active window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Target option labels, matched by substring against rendered labels.
    pub labels: Vec<String>,
    pub window: Option<DateWindow>,
}

impl FilterSpec {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            window: None,
        }
    }

    /// Copy of this spec restricted to `window`.
    pub fn with_window(&self, window: DateWindow) -> Self {
        Self {
            labels: self.labels.clone(),
            window: Some(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn rejects_inverted_window() {
        let err = DateWindow::new(date("2024-01-10"), date("2024-01-01")).unwrap_err();
        assert!(matches!(err, HarvestError::InvalidWindow(_)));
    }

    #[test]
    fn single_day_window_is_valid() {
        let w = DateWindow::new(date("2024-03-01"), date("2024-03-01")).unwrap();
        assert_eq!(w.days(), 1);
        assert!(w.contains(date("2024-03-01")));
        assert!(!w.contains(date("2024-03-02")));
    }

    #[test]
    fn chunk_id_uses_iso_dates() {
        let w = DateWindow::new(date("2024-01-08"), date("2024-01-10")).unwrap();
        assert_eq!(w.chunk_id(), "2024-01-08_2024-01-10");
        assert_eq!(Chunk::new(1, w).id(), "2024-01-08_2024-01-10");
    }

    #[test]
    fn with_window_keeps_labels() {
        let base = FilterSpec::new(vec!["Japan".to_string()]);
        let w = DateWindow::new(date("2024-01-01"), date("2024-01-07")).unwrap();
        let spec = base.with_window(w);
        assert_eq!(spec.labels, base.labels);
        assert_eq!(spec.window, Some(w));
        assert_eq!(base.window, None);
    }
}
