//! Top-level driver: plan the window, run each chunk in order, persist as we go.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::error::HarvestError;
use super::events::HarvestEvent;
use super::planner;
use super::runner::ChunkRunner;
use crate::models::{
    ArtifactRef, Chunk, ChunkFailure, ChunkOutcome, ChunkResult, DateWindow, FilterSpec,
    RunSummary,
};
use crate::scrapers::browser::{BrowserSession, SessionError, SessionLauncher};
use crate::storage::{ChunkArtifact, ChunkStore};

/// Cooperative cancellation, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs a date window chunk by chunk over a single browser session.
pub struct RangeHarvester {
    launcher: Arc<dyn SessionLauncher>,
    store: Arc<dyn ChunkStore>,
    runner: ChunkRunner,
    base_url: String,
    resume: bool,
    events: Option<mpsc::UnboundedSender<HarvestEvent>>,
    cancel: CancelSignal,
}

impl RangeHarvester {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        store: Arc<dyn ChunkStore>,
        runner: ChunkRunner,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            launcher,
            store,
            runner,
            base_url: base_url.into(),
            resume: false,
            events: None,
            cancel: CancelSignal::new(),
        }
    }

    /// Skip chunks that already have an artifact in the store.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<HarvestEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    fn emit(&self, event: HarvestEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// Harvest `window` in chunks of `interval_days`.
    ///
    /// Only an unplannable window is an error. Everything that goes wrong
    /// after planning, including failing to start the browser, is reported
    /// in the returned summary.
    pub async fn run(
        &self,
        window: DateWindow,
        interval_days: i64,
        filter_base: &FilterSpec,
    ) -> Result<RunSummary, HarvestError> {
        let chunks = planner::plan(window, interval_days)?;
        let mut summary = RunSummary::new(window, chunks.len());
        info!(
            "Harvesting {} in {} chunks of up to {} days",
            window,
            chunks.len(),
            interval_days
        );

        match self.launcher.launch().await {
            Ok(mut session) => {
                let drive = self.drive(session.as_mut(), &chunks, filter_base, &mut summary);
                let outcome = AssertUnwindSafe(drive).catch_unwind().await;
                if let Err(payload) = outcome {
                    let reason = format!("run panicked: {}", panic_message(&*payload));
                    error!("{}", reason);
                    // Chunks are recorded in order, so the unrecorded tail starts here.
                    let done = summary.succeeded + summary.skipped + summary.failed();
                    summary.abort_remaining(&chunks[done.min(chunks.len())..], &reason);
                    summary.aborted = Some(reason);
                }
                if let Err(e) = session.close().await {
                    warn!("Failed to close browser session: {}", e);
                }
            }
            Err(e) => {
                error!("Could not start browser session: {}", e);
                let reason = format!("session_error: {}", e);
                summary.abort_remaining(&chunks, &reason);
                summary.aborted = Some(reason);
            }
        }

        info!(
            "Run finished: {} succeeded, {} failed, {} skipped, {} records",
            summary.succeeded,
            summary.failed(),
            summary.skipped,
            summary.total_records
        );
        self.emit(HarvestEvent::RunFinished {
            succeeded: summary.succeeded,
            failed: summary.failed(),
            skipped: summary.skipped,
            records: summary.total_records,
        });
        Ok(summary)
    }

    /// The chunk loop. Never returns early without accounting for every chunk.
    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        chunks: &[Chunk],
        filter_base: &FilterSpec,
        summary: &mut RunSummary,
    ) {
        if let Err(e) = self.open_page(session).await {
            let reason = format!("session_error: {}", e);
            error!("Could not open {}: {}", self.base_url, e);
            summary.abort_remaining(chunks, &reason);
            summary.aborted = Some(reason);
            return;
        }

        for (pos, chunk) in chunks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Run cancelled before chunk {}", chunk);
                summary.cancelled = true;
                summary.abort_remaining(&chunks[pos..], "cancelled");
                return;
            }

            let chunk_id = chunk.id();
            self.emit(HarvestEvent::ChunkStarted {
                index: chunk.index,
                total: chunks.len(),
                chunk_id: chunk_id.clone(),
            });

            if self.resume && self.store.contains(&chunk_id) {
                info!("Chunk {} already stored, skipping", chunk);
                summary.record(&ChunkResult::skipped(*chunk), None);
                self.emit(HarvestEvent::ChunkSkipped {
                    index: chunk.index,
                    chunk_id,
                });
                continue;
            }

            let run = AssertUnwindSafe(self.runner.run(session, *chunk, filter_base));
            let result = match run.catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let reason =
                        format!("chunk {} panicked: {}", chunk_id, panic_message(&*payload));
                    error!("{}", reason);
                    let failure = ChunkFailure::Aborted(reason.clone());
                    let result = ChunkResult::failure(*chunk, Vec::new(), failure.clone());
                    summary.record(&result, None);
                    self.emit(HarvestEvent::ChunkFailed {
                        index: chunk.index,
                        chunk_id,
                        reason: failure,
                        records: 0,
                    });
                    summary.abort_remaining(&chunks[pos + 1..], &reason);
                    summary.aborted = Some(reason);
                    return;
                }
            };

            let (result, artifact) = self.persist(result);
            summary.record(&result, artifact);

            match &result.outcome {
                ChunkOutcome::Failure(reason) => {
                    warn!("Chunk {} failed: {}", chunk, reason);
                    self.emit(HarvestEvent::ChunkFailed {
                        index: chunk.index,
                        chunk_id,
                        reason: reason.clone(),
                        records: result.records.len(),
                    });
                    if reason.is_session_fatal() {
                        let reason = reason.to_string();
                        error!("Session lost, aborting remaining chunks");
                        summary.abort_remaining(&chunks[pos + 1..], &reason);
                        summary.aborted = Some(reason);
                        return;
                    }
                }
                _ => {
                    info!("Chunk {} done: {} records", chunk, result.records.len());
                    self.emit(HarvestEvent::ChunkCompleted {
                        index: chunk.index,
                        chunk_id,
                        records: result.records.len(),
                    });
                }
            }
        }
    }

    /// Load the start page and clear the first-visit popup.
    ///
    /// Only fatal session errors are returned; a slow page load is usually
    /// still usable.
    async fn open_page(&self, session: &mut dyn BrowserSession) -> Result<(), SessionError> {
        match session.navigate(&self.base_url).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Continuing after navigation problem: {}", e),
        }
        self.runner.filter().dismiss_popup(session).await
    }

    /// Write the chunk's artifact when it has something worth keeping.
    ///
    /// Successes are always written. Timed-out loads are written only when
    /// they produced records, and other failures never are, so a failed
    /// re-run does not replace a good artifact.
    fn persist(&self, mut result: ChunkResult) -> (ChunkResult, Option<ArtifactRef>) {
        let keep = match &result.outcome {
            ChunkOutcome::Success => true,
            ChunkOutcome::Failure(ChunkFailure::LoadTimeout { .. }) => !result.records.is_empty(),
            _ => false,
        };
        if !keep {
            return (result, None);
        }

        let chunk_id = result.chunk.id();
        let artifact = ChunkArtifact::new(&result.chunk, result.records.clone());
        match self.store.write_chunk(&chunk_id, &artifact) {
            Ok(artifact) => (result, Some(artifact)),
            Err(e) => {
                error!("Failed to persist chunk {}: {}", chunk_id, e);
                let reason = ChunkFailure::PersistError(e.to_string());
                result.outcome = ChunkOutcome::Failure(reason);
                (result, None)
            }
        }
    }
}
