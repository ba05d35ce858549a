//! Browser session capability types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::download::{wait_for_download, DownloadWatch};

/// Errors raised by a browsing session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("browser connection lost: {0}")]
    Disconnected(String),

    #[error("navigation to {0} timed out")]
    NavigationTimeout(String),

    #[error("element {selector}[{index}] is no longer present")]
    StaleElement { selector: String, index: usize },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the session can no longer be driven at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Launch(_) | SessionError::Disconnected(_))
    }
}

/// Locator for an element: the `index`-th match of `selector`.
///
/// Handles are re-resolved on every action, so a re-rendered DOM yields
/// [`SessionError::StaleElement`] instead of acting on a detached node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }

    /// Handles for the first `count` matches of `selector`.
    pub fn all(selector: &str, count: usize) -> Vec<Self> {
        (0..count).map(|i| Self::new(selector, i)).collect()
    }
}

/// Numeric page properties the loader watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMetric {
    ScrollHeight,
}

impl PageMetric {
    /// JavaScript expression evaluating to the metric.
    pub fn expression(self) -> &'static str {
        match self {
            PageMetric::ScrollHeight => "document.body.scrollHeight",
        }
    }
}

/// A controlled browsing session.
///
/// One session is one exclusive resource: navigation and DOM state are global
/// to it, so every method takes `&mut self`.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// All elements currently matching a CSS selector.
    async fn query(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError>;

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, SessionError>;

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    async fn page_metric(&mut self, metric: PageMetric) -> Result<f64, SessionError>;

    /// Trigger incremental loading by scrolling to the end of the page.
    async fn scroll_to_bottom(&mut self) -> Result<(), SessionError>;

    async fn run_script(&mut self, script: &str) -> Result<serde_json::Value, SessionError>;

    /// Serialized DOM of the current page.
    async fn page_source(&mut self) -> Result<String, SessionError>;

    /// Wait for a finished download in `dir`, or `None` after `timeout`.
    async fn wait_for_download(
        &mut self,
        dir: &Path,
        timeout: Duration,
    ) -> Result<Option<PathBuf>, SessionError> {
        Ok(wait_for_download(dir, timeout, &DownloadWatch::default()).await?)
    }

    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens sessions. A run opens exactly one and closes it when done.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_launch_and_disconnect_are_fatal() {
        assert!(SessionError::Launch("no chrome".into()).is_fatal());
        assert!(SessionError::Disconnected("ws closed".into()).is_fatal());
        assert!(!SessionError::NavigationTimeout("https://example.com".into()).is_fatal());
        assert!(!SessionError::StaleElement {
            selector: "tr".into(),
            index: 3
        }
        .is_fatal());
    }

    #[test]
    fn handles_index_matches() {
        let handles = ElementHandle::all("ul li label", 3);
        assert_eq!(handles.len(), 3);
        assert_eq!(handles[2], ElementHandle::new("ul li label", 2));
    }
}
