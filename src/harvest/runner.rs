//! One chunk: filter, load, parse. Nothing raised inside escapes as an error;
//! every outcome comes back as a [`ChunkResult`].

use tracing::{info, warn};

use super::error::{FilterError, LoadError};
use super::filter::FilterApplier;
use super::parser;
use super::scroll::{LoadOutcome, ScrollLoader};
use crate::models::{Chunk, ChunkFailure, ChunkResult, FilterSpec};
use crate::scrapers::browser::{BrowserSession, SessionError};
use crate::scrapers::snapshot::{self, RowLayout};

/// Where the rendered table lives on the page.
#[derive(Debug, Clone)]
pub struct TableSource {
    pub table_id: String,
    pub layout: RowLayout,
}

#[derive(Debug, Clone)]
pub struct ChunkRunner {
    filter: FilterApplier,
    loader: ScrollLoader,
    max_scroll_iterations: u32,
    table: TableSource,
}

fn session_failure(e: &SessionError) -> Option<ChunkFailure> {
    e.is_fatal()
        .then(|| ChunkFailure::SessionError(e.to_string()))
}

impl ChunkRunner {
    pub fn new(
        filter: FilterApplier,
        loader: ScrollLoader,
        max_scroll_iterations: u32,
        table: TableSource,
    ) -> Self {
        Self {
            filter,
            loader,
            max_scroll_iterations,
            table,
        }
    }

    pub fn filter(&self) -> &FilterApplier {
        &self.filter
    }

    pub async fn run(
        &self,
        session: &mut dyn BrowserSession,
        chunk: Chunk,
        filter_base: &FilterSpec,
    ) -> ChunkResult {
        let spec = filter_base.with_window(chunk.window);

        if let Err(e) = self.filter.apply(session, &spec).await {
            warn!("Filter failed for chunk {}: {}", chunk, e);
            let reason = match &e {
                FilterError::Session(inner) => session_failure(inner),
                _ => None,
            }
            .unwrap_or_else(|| ChunkFailure::FilterError(e.to_string()));
            return ChunkResult::failure(chunk, Vec::new(), reason);
        }

        let timed_out = match self
            .loader
            .load_until(session, chunk.window.end(), self.max_scroll_iterations)
            .await
        {
            Ok(LoadOutcome::Reached { .. }) | Ok(LoadOutcome::Exhausted { .. }) => None,
            Err(LoadError::Timeout { iterations }) => {
                warn!(
                    "Chunk {} still loading after {} scrolls, keeping partial data",
                    chunk, iterations
                );
                Some(iterations)
            }
            Err(LoadError::Session(e)) => {
                warn!("Loading failed for chunk {}: {}", chunk, e);
                let reason = session_failure(&e)
                    .unwrap_or_else(|| ChunkFailure::LoadError(e.to_string()));
                return ChunkResult::failure(chunk, Vec::new(), reason);
            }
        };

        let html = match session.page_source().await {
            Ok(html) => html,
            Err(e) => {
                let reason = session_failure(&e)
                    .unwrap_or_else(|| ChunkFailure::ParseError(e.to_string()));
                return ChunkResult::failure(chunk, Vec::new(), reason);
            }
        };
        let rows = match snapshot::table_rows(&html, &self.table.table_id, &self.table.layout) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Could not read table for chunk {}: {}", chunk, e);
                let reason = ChunkFailure::ParseError(e.to_string());
                return ChunkResult::failure(chunk, Vec::new(), reason);
            }
        };

        let records = parser::parse(&rows, &chunk.window);
        info!(
            "Chunk {}: {} rows scanned, {} records",
            chunk,
            rows.len(),
            records.len()
        );

        match timed_out {
            Some(iterations) => {
                ChunkResult::failure(chunk, records, ChunkFailure::LoadTimeout { iterations })
            }
            None => ChunkResult::success(chunk, records),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::harvest::filter::{FilterControls, FilterTiming};
    use crate::harvest::retry::RetryPolicy;
    use crate::models::{ChunkOutcome, DateWindow};
    use crate::scrapers::browser::testing::{FakeSession, ScrollFrame};

    const HEADERS: &str = "#economicCalendarData td.theDay";

    fn chunk() -> Chunk {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        )
        .unwrap();
        Chunk::new(0, window)
    }

    fn runner(max_scroll_iterations: u32) -> ChunkRunner {
        ChunkRunner::new(
            FilterApplier::new(
                FilterControls::default(),
                FilterTiming::immediate(),
                RetryPolicy::immediate(2),
            ),
            ScrollLoader::new(HEADERS, Duration::ZERO),
            max_scroll_iterations,
            TableSource {
                table_id: "economicCalendarData".into(),
                layout: RowLayout::default(),
            },
        )
    }

    const TABLE: &str = r#"<table id="economicCalendarData"><tbody>
        <tr><td class="theDay">2024年1月2日 星期二</td></tr>
        <tr class="js-event-item">
          <td class="time">09:45</td>
          <td class="flagCur"><span title="中國"></span> CNY</td>
          <td class="sentiment"><i class="grayFullBullishIcon"></i></td>
          <td class="event"><a>財新製造業PMI</a></td>
          <td class="act">50.8</td><td class="fore">50.4</td><td class="prev">50.7</td>
        </tr>
        <tr><td class="theDay">2024年1月8日 星期一</td></tr>
        <tr class="js-event-item">
          <td class="time">15:00</td>
          <td class="flagCur"><span title="德國"></span> EUR</td>
          <td class="sentiment"></td>
          <td class="event"><a>工業生產</a></td>
          <td class="act"></td><td class="fore"></td><td class="prev"></td>
        </tr>
    </tbody></table>"#;

    fn page(frames: Vec<ScrollFrame>) -> FakeSession {
        FakeSession::new()
            .with_elements("[id=\"filterStateAnchor\"]", &["Filters"])
            .with_elements("[id=\"ecSubmitButton\"]", &["Apply"])
            .with_scroll_frames(HEADERS, frames)
            .with_source(|_| TABLE.to_string())
    }

    fn frame(height: f64, headers: &[&str]) -> ScrollFrame {
        ScrollFrame {
            height,
            headers: headers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn successful_chunk_keeps_in_window_records() {
        let mut session = page(vec![
            frame(1000.0, &["2024年1月2日"]),
            frame(2000.0, &["2024年1月2日", "2024年1月8日"]),
        ]);

        let result = runner(10)
            .run(&mut session, chunk(), &FilterSpec::new(vec!["中國".into()]))
            .await;

        assert_eq!(result.outcome, ChunkOutcome::Success);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].country, "中國");
        assert_eq!(result.records[0].importance, 1);
    }

    #[tokio::test]
    async fn load_timeout_keeps_partial_records() {
        let frames = (1..=5)
            .map(|i| frame(1000.0 * i as f64, &["2024年1月2日"]))
            .collect();
        let mut session = page(frames);

        let result = runner(2)
            .run(&mut session, chunk(), &FilterSpec::new(vec![]))
            .await;

        assert_eq!(
            result.outcome,
            ChunkOutcome::Failure(ChunkFailure::LoadTimeout { iterations: 2 })
        );
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.outcome.failure().unwrap().to_string(), "load_timeout");
    }

    #[tokio::test]
    async fn filter_failure_returns_no_records() {
        let mut session = FakeSession::new().with_source(|_| TABLE.to_string());

        let result = runner(10)
            .run(&mut session, chunk(), &FilterSpec::new(vec![]))
            .await;

        assert!(result.records.is_empty());
        let reason = result.outcome.failure().unwrap().to_string();
        assert!(reason.starts_with("filter_error:"), "{}", reason);
    }

    #[tokio::test]
    async fn lost_session_is_reported_as_session_error() {
        let mut session =
            page(vec![frame(1000.0, &[])]).with_script_failure("datePickerFilter", true);

        let result = runner(10)
            .run(&mut session, chunk(), &FilterSpec::new(vec![]))
            .await;

        assert!(result.outcome.failure().unwrap().is_session_fatal());
    }

    #[tokio::test]
    async fn missing_table_is_a_parse_error() {
        let mut session = page(vec![frame(1000.0, &[])]).with_source(|_| "<html></html>".into());

        let result = runner(10)
            .run(&mut session, chunk(), &FilterSpec::new(vec![]))
            .await;

        assert!(matches!(
            result.outcome.failure(),
            Some(ChunkFailure::ParseError(_))
        ));
    }
}
