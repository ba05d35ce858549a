//! Data models for range harvesting.

mod record;
mod result;
mod window;

pub use record::{Column, RawRow, Record, RowError};
pub use result::{ArtifactRef, ChunkFailure, ChunkOutcome, ChunkResult, FailedChunk, RunSummary};
pub use window::{Chunk, DateWindow, FilterSpec};
