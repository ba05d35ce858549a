//! Error taxonomy for the harvesting loop.
//!
//! Errors are recovered at the smallest scope that keeps useful output:
//! row errors never leave the parser, filter and load errors never leave
//! the chunk runner, and only [`HarvestError`] reaches a run's caller.

use thiserror::Error;

use crate::scrapers::browser::SessionError;

/// Run-level errors. Everything else is reported inside the run summary.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Nothing to chunk: inverted window or non-positive interval.
    #[error("invalid window: {0}")]
    InvalidWindow(String),
}

/// The remote view could not be configured for a chunk.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("{0} control not found")]
    ControlMissing(&'static str),

    #[error("filter spec has no date window")]
    MissingWindow,

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl FilterError {
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, FilterError::Session(e) if e.is_fatal())
    }
}

/// Incremental loading did not finish cleanly.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("load timed out after {iterations} iterations")]
    Timeout { iterations: u32 },

    #[error(transparent)]
    Session(#[from] SessionError),
}
