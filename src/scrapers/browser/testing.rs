//! Scripted in-memory session used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::types::{BrowserSession, ElementHandle, PageMetric, SessionError, SessionLauncher};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub attributes: HashMap<String, String>,
}

/// One state of the page between scrolls.
#[derive(Debug, Clone)]
pub struct ScrollFrame {
    pub height: f64,
    /// Texts of the header rows rendered so far.
    pub headers: Vec<String>,
}

/// Everything the fake observed, shared so tests can inspect it after the
/// session has been moved into the code under test.
#[derive(Debug, Default)]
pub struct FakeLog {
    pub navigations: Vec<String>,
    pub clicks: Vec<ElementHandle>,
    pub scripts: Vec<String>,
    pub scrolls: usize,
    pub closed: bool,
}

type SourceFn = Box<dyn Fn(&[String]) -> String + Send>;

pub struct FakeSession {
    elements: HashMap<String, Vec<FakeElement>>,
    failing_clicks: Vec<String>,
    script_failures: Vec<(String, bool)>,
    script_panics: Vec<String>,
    header_selector: Option<String>,
    frames: Vec<ScrollFrame>,
    frame: usize,
    source: SourceFn,
    pub log: Arc<Mutex<FakeLog>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            failing_clicks: Vec::new(),
            script_failures: Vec::new(),
            script_panics: Vec::new(),
            header_selector: None,
            frames: Vec::new(),
            frame: 0,
            source: Box::new(|_| String::new()),
            log: Arc::new(Mutex::new(FakeLog::default())),
        }
    }

    pub fn with_elements(mut self, selector: &str, texts: &[&str]) -> Self {
        self.elements.insert(
            selector.to_string(),
            texts
                .iter()
                .map(|t| FakeElement {
                    text: t.to_string(),
                    attributes: HashMap::new(),
                })
                .collect(),
        );
        self
    }

    /// Elements with one attribute each, given as `(text, name, value)`.
    pub fn with_element_attrs(mut self, selector: &str, items: &[(&str, &str, &str)]) -> Self {
        self.elements.insert(
            selector.to_string(),
            items
                .iter()
                .map(|(text, name, value)| FakeElement {
                    text: text.to_string(),
                    attributes: HashMap::from([(name.to_string(), value.to_string())]),
                })
                .collect(),
        );
        self
    }

    pub fn with_failing_click(mut self, selector: &str) -> Self {
        self.failing_clicks.push(selector.to_string());
        self
    }

    /// Scripts containing `needle` fail; `fatal` makes the failure a lost connection.
    pub fn with_script_failure(mut self, needle: &str, fatal: bool) -> Self {
        self.script_failures.push((needle.to_string(), fatal));
        self
    }

    /// Scripts containing `needle` panic, as a driver bug would.
    pub fn with_script_panic(mut self, needle: &str) -> Self {
        self.script_panics.push(needle.to_string());
        self
    }

    pub fn with_scroll_frames(mut self, header_selector: &str, frames: Vec<ScrollFrame>) -> Self {
        self.header_selector = Some(header_selector.to_string());
        self.frames = frames;
        self
    }

    /// Page source as a function of the scripts run so far.
    pub fn with_source(mut self, source: impl Fn(&[String]) -> String + Send + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    fn lookup(&self, element: &ElementHandle) -> Result<&FakeElement, SessionError> {
        self.elements
            .get(&element.selector)
            .and_then(|items| items.get(element.index))
            .ok_or_else(|| SessionError::StaleElement {
                selector: element.selector.clone(),
                index: element.index,
            })
    }

    fn frame_headers(&self) -> Vec<String> {
        self.frames
            .get(self.frame)
            .map(|f| f.headers.clone())
            .unwrap_or_default()
    }
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    async fn query(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        if self.header_selector.as_deref() == Some(selector) {
            return Ok(ElementHandle::all(selector, self.frame_headers().len()));
        }
        let count = self.elements.get(selector).map_or(0, Vec::len);
        Ok(ElementHandle::all(selector, count))
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        self.lookup(element)?;
        if self.failing_clicks.contains(&element.selector) {
            return Err(SessionError::Protocol("click intercepted".into()));
        }
        self.log.lock().unwrap().clicks.push(element.clone());
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, SessionError> {
        if self.header_selector.as_deref() == Some(element.selector.as_str()) {
            return self
                .frame_headers()
                .get(element.index)
                .cloned()
                .ok_or_else(|| SessionError::StaleElement {
                    selector: element.selector.clone(),
                    index: element.index,
                });
        }
        Ok(self.lookup(element)?.text.clone())
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        Ok(self.lookup(element)?.attributes.get(name).cloned())
    }

    async fn page_metric(&mut self, metric: PageMetric) -> Result<f64, SessionError> {
        match metric {
            PageMetric::ScrollHeight => Ok(self.frames.get(self.frame).map_or(0.0, |f| f.height)),
        }
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), SessionError> {
        self.log.lock().unwrap().scrolls += 1;
        if self.frame + 1 < self.frames.len() {
            self.frame += 1;
        }
        Ok(())
    }

    async fn run_script(&mut self, script: &str) -> Result<serde_json::Value, SessionError> {
        if let Some(needle) = self.script_panics.iter().find(|n| script.contains(n.as_str())) {
            panic!("driver crashed on {}", needle);
        }
        for (needle, fatal) in &self.script_failures {
            if script.contains(needle.as_str()) {
                return Err(if *fatal {
                    SessionError::Disconnected("websocket closed".into())
                } else {
                    SessionError::Script(format!("{} is not defined", needle))
                });
            }
        }
        self.log.lock().unwrap().scripts.push(script.to_string());
        // A new date window re-renders the table from the top.
        self.frame = 0;
        Ok(serde_json::Value::Null)
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        let scripts = self.log.lock().unwrap().scripts.clone();
        Ok((self.source)(&scripts))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Hands out sessions built by a factory and remembers their logs.
pub struct FakeLauncher {
    factory: Box<dyn Fn() -> FakeSession + Send + Sync>,
    pub logs: Mutex<Vec<Arc<Mutex<FakeLog>>>>,
    fail: bool,
}

impl FakeLauncher {
    pub fn new(factory: impl Fn() -> FakeSession + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            logs: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            factory: Box::new(FakeSession::new),
            logs: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn last_log(&self) -> Arc<Mutex<FakeLog>> {
        self.logs.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        if self.fail {
            return Err(SessionError::Launch("Chrome/Chromium not found".into()));
        }
        let session = (self.factory)();
        self.logs.lock().unwrap().push(session.log.clone());
        Ok(Box::new(session))
    }
}
