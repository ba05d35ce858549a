//! Browser sessions for pages that render their tables with JavaScript.
//!
//! Uses chromiumoxide (CDP) when the `browser` feature is enabled. Everything
//! above this module talks to a [`BrowserSession`] and never to CDP directly.

#[cfg(feature = "browser")]
mod cdp;
mod config;
mod download;
mod selection;
#[cfg(test)]
pub(crate) mod testing;
mod types;

#[cfg(feature = "browser")]
pub use cdp::{CdpLauncher, CdpSession};
pub use config::BrowserEngineConfig;
pub use download::{wait_for_download, DownloadWatch};
pub use selection::{Locator, LocatorChain};
pub use types::{BrowserSession, ElementHandle, PageMetric, SessionError, SessionLauncher};

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct CdpLauncher {
    #[allow(dead_code)]
    config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl CdpLauncher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl SessionLauncher for CdpLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        Err(SessionError::Launch(
            "Browser support not compiled. Rebuild with: cargo build --features browser".into(),
        ))
    }
}
