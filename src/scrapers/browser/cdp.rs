//! Chrome DevTools Protocol session backed by chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::BrowserEngineConfig;
use super::types::{BrowserSession, ElementHandle, PageMetric, SessionError, SessionLauncher};

/// Install locations probed before searching `PATH`.
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/opt/google/chrome/google-chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Executable names searched for in `PATH`.
const CHROME_BINARIES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

fn from_cdp(e: CdpError) -> SessionError {
    match e {
        CdpError::Ws(_) => SessionError::Disconnected(e.to_string()),
        other => SessionError::Protocol(other.to_string()),
    }
}

/// Fixed install locations first, then a `PATH` lookup by name.
fn find_chrome() -> Result<PathBuf, SessionError> {
    let found = CHROME_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .or_else(|| {
            CHROME_BINARIES
                .iter()
                .find_map(|bin| which::which(bin).ok())
        })
        .ok_or_else(|| {
            SessionError::Launch(
                "no Chrome or Chromium executable found; install one or set browser.remote_url"
                    .to_string(),
            )
        })?;
    debug!("Using browser executable {}", found.display());
    Ok(found)
}

/// Launches (or connects to) Chrome and opens one page per session.
pub struct CdpLauncher {
    config: BrowserEngineConfig,
}

impl CdpLauncher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    async fn launch_local(&self) -> Result<(Browser, chromiumoxide::Handler), SessionError> {
        info!("Launching browser (headless={})", self.config.headless);

        let chrome_path = find_chrome()?;
        let (width, height) = self.config.window_size;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(width, height)
            .request_timeout(Duration::from_secs(self.config.timeout));

        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| SessionError::Launch(format!("Failed to build browser config: {}", e)))?;

        Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))
    }

    /// Attach to an already running browser through its DevTools endpoint.
    async fn connect_remote(
        &self,
        url: &str,
    ) -> Result<(Browser, chromiumoxide::Handler), SessionError> {
        info!("Connecting to remote browser at {}", url);

        // The HTTP side of the endpoint advertises the browser websocket
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .timeout(Duration::from_secs(self.config.timeout))
            .send()
            .await
            .map_err(|e| SessionError::Launch(format!("Failed to reach remote browser: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                SessionError::Launch(format!("Failed to parse browser version info: {}", e))
            })?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SessionError::Launch("No webSocketDebuggerUrl in response".into()))?;

        debug!("Browser websocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.timeout),
            ..Default::default()
        };

        Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))
    }
}

#[async_trait]
impl SessionLauncher for CdpLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        let (browser, mut handler) = match self.config.remote_url.as_deref() {
            Some(remote) => self.connect_remote(remote).await?,
            None => self.launch_local().await?,
        };

        // Spawn handler task
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(from_cdp)?;

        if let Some(ref dir) = self.config.download_dir {
            std::fs::create_dir_all(dir)?;
            let params = SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::Allow)
                .download_path(dir.to_string_lossy().to_string())
                .build()
                .map_err(SessionError::Launch)?;
            browser.execute(params).await.map_err(from_cdp)?;
            debug!("Downloads go to {}", dir.display());
        }

        Ok(Box::new(CdpSession {
            browser,
            page,
            handler_task,
            timeout: Duration::from_secs(self.config.timeout),
        }))
    }
}

/// One browser with one page, driven sequentially.
pub struct CdpSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    timeout: Duration,
}

impl CdpSession {
    async fn resolve(&self, handle: &ElementHandle) -> Result<Element, SessionError> {
        self.page
            .find_elements(handle.selector.as_str())
            .await
            .map_err(from_cdp)?
            .into_iter()
            .nth(handle.index)
            .ok_or_else(|| SessionError::StaleElement {
                selector: handle.selector.clone(),
                index: handle.index,
            })
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SessionError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| match e {
                CdpError::Ws(_) => from_cdp(e),
                other => SessionError::Script(other.to_string()),
            })?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        info!("Navigating to {}", url);
        match tokio::time::timeout(self.timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(from_cdp(e)),
            Err(_) => {
                // Stop whatever is still loading so the DOM settles.
                if let Err(e) = self.evaluate("window.stop();").await {
                    debug!("window.stop() failed: {}", e);
                }
                Err(SessionError::NavigationTimeout(url.to_string()))
            }
        }
    }

    async fn query(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        match self.page.find_elements(selector).await {
            Ok(elements) => Ok(ElementHandle::all(selector, elements.len())),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(from_cdp(e)),
        }
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        let el = self.resolve(element).await?;
        // Script click is not intercepted by overlays the way a mouse click is.
        el.call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(from_cdp)?;
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, SessionError> {
        let el = self.resolve(element).await?;
        Ok(el.inner_text().await.map_err(from_cdp)?.unwrap_or_default())
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        let el = self.resolve(element).await?;
        el.attribute(name).await.map_err(from_cdp)
    }

    async fn page_metric(&mut self, metric: PageMetric) -> Result<f64, SessionError> {
        let value = self.evaluate(metric.expression()).await?;
        value.as_f64().ok_or_else(|| {
            SessionError::Script(format!("{} is not a number", metric.expression()))
        })
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), SessionError> {
        self.evaluate("window.scrollTo(0, document.body.scrollHeight);")
            .await
            .map(|_| ())
    }

    async fn run_script(&mut self, script: &str) -> Result<serde_json::Value, SessionError> {
        self.evaluate(script).await
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        self.page.content().await.map_err(from_cdp)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        self.handler_task.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn chrome_lookup_finds_a_file_or_fails_to_launch() {
        match find_chrome() {
            Ok(path) => assert!(path.is_file()),
            Err(e) => assert!(matches!(e, SessionError::Launch(_))),
        }
    }

    #[test]
    fn path_lookup_agrees_with_which() {
        let on_path: Vec<PathBuf> = CHROME_BINARIES
            .iter()
            .filter_map(|bin| which::which(bin).ok())
            .collect();
        let fixed = CHROME_PATHS.iter().any(|p| Path::new(p).is_file());
        if !fixed {
            assert_eq!(find_chrome().ok(), on_path.into_iter().next());
        }
    }
}
