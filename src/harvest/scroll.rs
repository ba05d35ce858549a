//! Drives infinite-scroll loading until the wanted dates are on the page.

use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info};

use super::error::LoadError;
use super::parser::parse_section_date;
use crate::scrapers::browser::{BrowserSession, PageMetric, SessionError};

/// Why loading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The last rendered section is on or after the stop date.
    Reached { date: NaiveDate, iterations: u32 },
    /// The page stopped growing; the source has nothing more in range.
    Exhausted { iterations: u32 },
}

#[derive(Debug, Clone)]
pub struct ScrollLoader {
    /// Selector for the section header cells of the table.
    header_rows: String,
    /// Pause after each scroll before the page is inspected.
    settle: Duration,
}

impl ScrollLoader {
    pub fn new(header_rows: impl Into<String>, settle: Duration) -> Self {
        Self {
            header_rows: header_rows.into(),
            settle,
        }
    }

    /// Scroll until the table reaches `stop_date` or stops growing.
    ///
    /// Both checks run once per iteration, date first, so a page that reaches
    /// the stop date on its final growth counts as reached rather than
    /// exhausted. Fails with [`LoadError::Timeout`] after `max_iterations`.
    pub async fn load_until(
        &self,
        session: &mut dyn BrowserSession,
        stop_date: NaiveDate,
        max_iterations: u32,
    ) -> Result<LoadOutcome, LoadError> {
        let mut last_height = session.page_metric(PageMetric::ScrollHeight).await?;

        for iteration in 1..=max_iterations {
            session.scroll_to_bottom().await?;
            if !self.settle.is_zero() {
                tokio::time::sleep(self.settle).await;
            }

            if let Some(date) = self.last_section_date(session).await? {
                if date >= stop_date {
                    info!("Loaded through {} after {} scrolls", date, iteration);
                    return Ok(LoadOutcome::Reached {
                        date,
                        iterations: iteration,
                    });
                }
            }

            let height = session.page_metric(PageMetric::ScrollHeight).await?;
            if height <= last_height {
                info!("Page stopped growing after {} scrolls", iteration);
                return Ok(LoadOutcome::Exhausted {
                    iterations: iteration,
                });
            }
            last_height = height;
        }

        Err(LoadError::Timeout {
            iterations: max_iterations,
        })
    }

    /// Date of the last rendered section header, if it can be read.
    ///
    /// Headers still rendering or in an unexpected format are not an error;
    /// the loop just keeps scrolling.
    async fn last_section_date(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Option<NaiveDate>, SessionError> {
        let last = match session.query(&self.header_rows).await {
            Ok(headers) => headers.into_iter().last(),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Could not list section headers: {}", e);
                None
            }
        };
        let Some(last) = last else {
            return Ok(None);
        };
        match session.read_text(&last).await {
            Ok(text) => {
                let date = parse_section_date(&text);
                if date.is_none() {
                    debug!("Last section header {:?} is not a date", text);
                }
                Ok(date)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("Could not read last section header: {}", e);
                Ok(None)
            }
        }
    }
}
