//! Per-chunk results and the run summary aggregated from them.

use std::fmt;

use serde::Serialize;

use super::record::Record;
use super::window::{Chunk, DateWindow};

/// Why a chunk did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ChunkFailure {
    /// The remote view could not be filtered for this chunk.
    FilterError(String),
    /// Scrolling hit its iteration bound before the window was loaded.
    LoadTimeout { iterations: u32 },
    /// Scrolling failed for a reason other than the iteration bound.
    LoadError(String),
    /// The loaded page could not be read back for parsing.
    ParseError(String),
    /// The browsing session is unusable; the run stops after this chunk.
    SessionError(String),
    /// Records were produced but could not be written.
    PersistError(String),
    /// The chunk never ran because the run stopped early.
    Aborted(String),
}

impl ChunkFailure {
    /// Whether the run must stop after this failure.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, ChunkFailure::SessionError(_))
    }
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkFailure::FilterError(msg) => write!(f, "filter_error: {}", msg),
            ChunkFailure::LoadTimeout { .. } => write!(f, "load_timeout"),
            ChunkFailure::LoadError(msg) => write!(f, "load_error: {}", msg),
            ChunkFailure::ParseError(msg) => write!(f, "parse_error: {}", msg),
            ChunkFailure::SessionError(msg) => write!(f, "session_error: {}", msg),
            ChunkFailure::PersistError(msg) => write!(f, "persist_error: {}", msg),
            ChunkFailure::Aborted(msg) => write!(f, "aborted: {}", msg),
        }
    }
}

/// Final state of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    Success,
    Failure(ChunkFailure),
    /// An artifact for this chunk already existed and resume was requested.
    Skipped,
}

impl ChunkOutcome {
    pub fn failure(&self) -> Option<&ChunkFailure> {
        match self {
            ChunkOutcome::Failure(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Output of running one chunk. Partial records may accompany a failure.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk: Chunk,
    pub records: Vec<Record>,
    pub outcome: ChunkOutcome,
}

impl ChunkResult {
    pub fn success(chunk: Chunk, records: Vec<Record>) -> Self {
        Self {
            chunk,
            records,
            outcome: ChunkOutcome::Success,
        }
    }

    pub fn failure(chunk: Chunk, records: Vec<Record>, reason: ChunkFailure) -> Self {
        Self {
            chunk,
            records,
            outcome: ChunkOutcome::Failure(reason),
        }
    }

    pub fn skipped(chunk: Chunk) -> Self {
        Self {
            chunk,
            records: Vec::new(),
            outcome: ChunkOutcome::Skipped,
        }
    }
}

/// Reference to a persisted chunk artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    pub chunk_id: String,
    /// Store-specific location (a file path for the JSON directory store).
    pub location: String,
}

/// A chunk that did not succeed, with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedChunk {
    pub chunk: Chunk,
    pub reason: ChunkFailure,
    /// Records kept despite the failure (partial loads).
    pub partial_records: usize,
}

/// Aggregate over every chunk of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub window: DateWindow,
    pub planned_chunks: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub total_records: usize,
    pub failures: Vec<FailedChunk>,
    pub artifacts: Vec<ArtifactRef>,
    /// Set when a session-fatal condition stopped the run early.
    pub aborted: Option<String>,
    /// Set when the run stopped between chunks on request.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(window: DateWindow, planned_chunks: usize) -> Self {
        Self {
            window,
            planned_chunks,
            succeeded: 0,
            skipped: 0,
            total_records: 0,
            failures: Vec::new(),
            artifacts: Vec::new(),
            aborted: None,
            cancelled: false,
        }
    }

    /// Fold one chunk's result (and its artifact, if written) into the summary.
    pub fn record(&mut self, result: &ChunkResult, artifact: Option<ArtifactRef>) {
        self.total_records += result.records.len();
        match &result.outcome {
            ChunkOutcome::Success => self.succeeded += 1,
            ChunkOutcome::Skipped => self.skipped += 1,
            ChunkOutcome::Failure(reason) => self.failures.push(FailedChunk {
                chunk: result.chunk,
                reason: reason.clone(),
                partial_records: result.records.len(),
            }),
        }
        if let Some(artifact) = artifact {
            self.artifacts.push(artifact);
        }
    }

    /// Mark chunks that never ran.
    pub fn abort_remaining(&mut self, remaining: &[Chunk], reason: &str) {
        for chunk in remaining {
            self.failures.push(FailedChunk {
                chunk: *chunk,
                reason: ChunkFailure::Aborted(reason.to_string()),
                partial_records: 0,
            });
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True when every planned chunk succeeded or was skipped.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
            && !self.cancelled
            && self.succeeded + self.skipped == self.planned_chunks
    }
}
