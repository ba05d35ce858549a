//! Chunk artifact persistence.
//!
//! One artifact per chunk, keyed by the chunk id. Writing the same id again
//! replaces the earlier artifact.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::{ArtifactRef, Chunk, Record};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write rejected for {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Local wall-clock time of the crawl, `YYYY-MM-DD HH:MM:SS`.
    pub crawled_at: String,
    pub filter_start: NaiveDate,
    pub filter_end: NaiveDate,
    pub count: usize,
}

/// The persisted form of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkArtifact {
    pub meta: ArtifactMeta,
    pub data: Vec<Record>,
}

impl ChunkArtifact {
    pub fn new(chunk: &Chunk, records: Vec<Record>) -> Self {
        Self {
            meta: ArtifactMeta {
                crawled_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                filter_start: chunk.window.start(),
                filter_end: chunk.window.end(),
                count: records.len(),
            },
            data: records,
        }
    }
}

/// Where chunk artifacts go.
pub trait ChunkStore: Send + Sync {
    /// Write (or overwrite) the artifact for `chunk_id`.
    fn write_chunk(
        &self,
        chunk_id: &str,
        artifact: &ChunkArtifact,
    ) -> Result<ArtifactRef, StorageError>;

    /// Whether an artifact for `chunk_id` already exists.
    fn contains(&self, chunk_id: &str) -> bool;
}

/// Stores each chunk as `{dir}/{chunk_id}.json`.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, chunk_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", chunk_id))
    }

    /// Read back a previously written artifact.
    pub fn read_chunk(&self, chunk_id: &str) -> Result<Option<ChunkArtifact>, StorageError> {
        let path = self.path_for(chunk_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

impl ChunkStore for JsonDirStore {
    fn write_chunk(
        &self,
        chunk_id: &str,
        artifact: &ChunkArtifact,
    ) -> Result<ArtifactRef, StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(chunk_id);

        // Write beside the target and rename over it, so readers never see a
        // half-written file.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, artifact)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        debug!("Wrote {} records to {}", artifact.meta.count, path.display());
        Ok(ArtifactRef {
            chunk_id: chunk_id.to_string(),
            location: path.display().to_string(),
        })
    }

    fn contains(&self, chunk_id: &str) -> bool {
        self.path_for(chunk_id).is_file()
    }
}

/// In-memory store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: Mutex<BTreeMap<String, ChunkArtifact>>,
    reject: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses writes for the given chunk ids.
    pub fn rejecting(chunk_ids: &[&str]) -> Self {
        Self {
            artifacts: Mutex::default(),
            reject: chunk_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn get(&self, chunk_id: &str) -> Option<ChunkArtifact> {
        self.artifacts
            .lock()
            .ok()
            .and_then(|map| map.get(chunk_id).cloned())
    }

    /// Stored chunk ids in order.
    pub fn chunk_ids(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkStore for MemoryStore {
    fn write_chunk(
        &self,
        chunk_id: &str,
        artifact: &ChunkArtifact,
    ) -> Result<ArtifactRef, StorageError> {
        if self.reject.iter().any(|id| id == chunk_id) {
            return Err(StorageError::Rejected(chunk_id.to_string()));
        }
        let mut map = self
            .artifacts
            .lock()
            .map_err(|_| StorageError::Rejected(chunk_id.to_string()))?;
        map.insert(chunk_id.to_string(), artifact.clone());
        Ok(ArtifactRef {
            chunk_id: chunk_id.to_string(),
            location: format!("memory:{}", chunk_id),
        })
    }

    fn contains(&self, chunk_id: &str) -> bool {
        self.artifacts
            .lock()
            .map(|map| map.contains_key(chunk_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateWindow;

    fn chunk() -> Chunk {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        )
        .unwrap();
        Chunk::new(1, window)
    }

    fn record(event: &str) -> Record {
        let cells: Vec<String> = ["08:30", "美國", "USD", "2", event, "", "", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Record::from_cells(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(), &cells).unwrap()
    }

    #[test]
    fn artifact_meta_describes_chunk() {
        let artifact = ChunkArtifact::new(&chunk(), vec![record("CPI"), record("PPI")]);
        assert_eq!(artifact.meta.count, 2);
        assert_eq!(artifact.meta.filter_start.to_string(), "2024-01-08");
        assert_eq!(artifact.meta.crawled_at.len(), "2024-01-08 12:00:00".len());

        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["meta"]["filter_end"], "2024-01-10");
        assert_eq!(json["data"][1]["event"], "PPI");
    }

    #[test]
    fn json_store_overwrites_by_chunk_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path().join("out"));
        let id = chunk().id();

        store
            .write_chunk(&id, &ChunkArtifact::new(&chunk(), vec![record("CPI")]))
            .unwrap();
        let written = store
            .write_chunk(&id, &ChunkArtifact::new(&chunk(), vec![record("GDP"), record("PMI")]))
            .unwrap();

        assert!(written.location.ends_with("2024-01-08_2024-01-10.json"));
        let files: Vec<_> = std::fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let read = store.read_chunk(&id).unwrap().unwrap();
        assert_eq!(read.meta.count, 2);
        assert_eq!(read.data[0].event, "GDP");
    }

    #[test]
    fn json_store_reports_missing_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        assert!(!store.contains("2024-01-01_2024-01-07"));
        assert!(store.read_chunk("2024-01-01_2024-01-07").unwrap().is_none());
    }

    #[test]
    fn memory_store_rejects_configured_ids() {
        let store = MemoryStore::rejecting(&["2024-01-08_2024-01-10"]);
        let err = store
            .write_chunk(&chunk().id(), &ChunkArtifact::new(&chunk(), vec![]))
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected(_)));
        assert!(store.is_empty());
    }
}
