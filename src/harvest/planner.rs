//! Splits a date window into bounded, contiguous chunks.

use chrono::Duration;

use super::HarvestError;
use crate::models::{Chunk, DateWindow};

/// Split `window` into chunks of `interval_days` days; the last one is
/// truncated at `window.end()`.
///
/// Chunks are ordered, contiguous (`chunks[i].end + 1 day ==
/// chunks[i + 1].start`) and together cover the window exactly.
pub fn plan(window: DateWindow, interval_days: i64) -> Result<Vec<Chunk>, HarvestError> {
    if interval_days <= 0 {
        return Err(HarvestError::InvalidWindow(format!(
            "interval must be at least one day, got {}",
            interval_days
        )));
    }

    // No chunk is longer than the window, so the step never leaves the date range.
    let step = interval_days.min(window.days());
    let mut chunks = Vec::with_capacity((window.days() / step + 1) as usize);
    let mut start = window.start();

    loop {
        let end = start
            .checked_add_signed(Duration::days(step - 1))
            .map_or(window.end(), |end| end.min(window.end()));
        chunks.push(Chunk::new(chunks.len(), DateWindow::new(start, end)?));
        match end.succ_opt() {
            Some(next) if end < window.end() => start = next,
            _ => break,
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn window(start: &str, end: &str) -> DateWindow {
        DateWindow::new(date(start), date(end)).unwrap()
    }

    fn assert_exact_cover(whole: DateWindow, chunks: &[Chunk]) {
        assert_eq!(chunks.first().unwrap().window.start(), whole.start());
        assert_eq!(chunks.last().unwrap().window.end(), whole.end());
        for (i, pair) in chunks.windows(2).enumerate() {
            assert_eq!(pair[0].index, i);
            assert_eq!(
                pair[0].window.end() + Duration::days(1),
                pair[1].window.start()
            );
        }
        let covered: i64 = chunks.iter().map(|c| c.window.days()).sum();
        assert_eq!(covered, whole.days());
    }

    #[test]
    fn ten_days_by_seven() {
        let chunks = plan(window("2024-01-01", "2024-01-10"), 7).unwrap();
        let ids: Vec<String> = chunks.iter().map(Chunk::id).collect();
        assert_eq!(ids, vec!["2024-01-01_2024-01-07", "2024-01-08_2024-01-10"]);
    }

    #[test]
    fn single_day_window_gives_one_chunk() {
        let chunks = plan(window("2024-02-29", "2024-02-29"), 30).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].window.days(), 1);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let chunks = plan(window("2024-01-01", "2024-01-14"), 7).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.window.days() == 7));
    }

    #[test]
    fn covers_window_exactly_across_intervals() {
        let whole = window("2023-11-15", "2024-03-02");
        for interval in [1, 2, 3, 7, 10, 31, 365] {
            let chunks = plan(whole, interval).unwrap();
            assert_exact_cover(whole, &chunks);
            assert!(chunks.iter().all(|c| c.window.days() <= interval));
        }
    }

    #[test]
    fn huge_interval_gives_one_chunk() {
        let whole = window("2024-01-01", "2024-01-10");
        for interval in [200_000_000, i64::MAX] {
            let chunks = plan(whole, interval).unwrap();
            assert_eq!(chunks.len(), 1);
            assert_eq!(chunks[0].window, whole);
        }
    }

    #[test]
    fn window_ending_at_last_representable_day() {
        let whole = DateWindow::new(NaiveDate::MAX - Duration::days(9), NaiveDate::MAX).unwrap();
        let chunks = plan(whole, 7).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_exact_cover(whole, &chunks);
    }

    #[test]
    fn rejects_non_positive_interval() {
        let whole = window("2024-01-01", "2024-01-10");
        assert!(matches!(plan(whole, 0), Err(HarvestError::InvalidWindow(_))));
        assert!(matches!(plan(whole, -3), Err(HarvestError::InvalidWindow(_))));
    }
}
