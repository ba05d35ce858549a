//! Waiting for browser-initiated downloads to land on disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

/// Suffixes Chrome and Firefox use for downloads still in flight.
const PARTIAL_SUFFIXES: &[&str] = &["crdownload", "tmp", "part"];

/// Which files count as a finished download, and how often to look.
#[derive(Debug, Clone)]
pub struct DownloadWatch {
    pub extensions: Vec<String>,
    pub poll_interval: Duration,
}

impl Default for DownloadWatch {
    fn default() -> Self {
        Self {
            extensions: vec!["xls".into(), "xlsx".into(), "csv".into()],
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl DownloadWatch {
    fn is_partial(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| PARTIAL_SUFFIXES.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn is_wanted(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

/// State of a download directory at one instant.
#[derive(Debug, PartialEq, Eq)]
enum DirState {
    InProgress,
    Finished(PathBuf),
    Empty,
}

fn inspect(dir: &Path, watch: &DownloadWatch) -> std::io::Result<DirState> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if DownloadWatch::is_partial(&path) {
            return Ok(DirState::InProgress);
        }
        if !watch.is_wanted(&path) {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    Ok(match newest {
        Some((_, path)) => DirState::Finished(path),
        None => DirState::Empty,
    })
}

/// Poll `dir` until a finished download appears, returning the newest one.
///
/// While any partial file is present the download is considered in flight.
/// Returns `Ok(None)` once `timeout` elapses.
pub async fn wait_for_download(
    dir: &Path,
    timeout: Duration,
    watch: &DownloadWatch,
) -> std::io::Result<Option<PathBuf>> {
    let started = Instant::now();

    loop {
        match inspect(dir, watch)? {
            DirState::Finished(path) => {
                debug!("Download finished: {}", path.display());
                return Ok(Some(path));
            }
            DirState::InProgress => debug!("Download still in progress in {}", dir.display()),
            DirState::Empty => {}
        }

        if started.elapsed() >= timeout {
            warn!(
                "No finished download in {} after {:?}",
                dir.display(),
                timeout
            );
            return Ok(None);
        }
        tokio::time::sleep(watch.poll_interval.min(timeout)).await;
    }
}
