//! Progress events emitted while a run is in flight.

use crate::models::ChunkFailure;

/// Event emitted by [`RangeHarvester`](super::RangeHarvester) for progress tracking.
#[derive(Debug, Clone)]
pub enum HarvestEvent {
    /// Chunk processing started
    ChunkStarted {
        index: usize,
        total: usize,
        chunk_id: String,
    },
    /// Chunk finished and its records were persisted
    ChunkCompleted {
        index: usize,
        chunk_id: String,
        records: usize,
    },
    /// Chunk failed; `records` is how much partial data survived
    ChunkFailed {
        index: usize,
        chunk_id: String,
        reason: ChunkFailure,
        records: usize,
    },
    /// Chunk already had an artifact and was not re-scraped
    ChunkSkipped { index: usize, chunk_id: String },
    /// All chunks handled (or the run was aborted/cancelled)
    RunFinished {
        succeeded: usize,
        failed: usize,
        skipped: usize,
        records: usize,
    },
}
