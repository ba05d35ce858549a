//! Configuration management.
//!
//! A config file is optional. Without one the defaults target the Investing.com
//! economic calendar, with environment variables layered on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::harvest::{
    millis, ChunkRunner, FilterApplier, FilterControls, FilterTiming, RetryPolicy, ScrollLoader,
    TableSource,
};
use crate::scrapers::browser::BrowserEngineConfig;
use crate::scrapers::snapshot::RowLayout;

/// Name `prefer` discovers config files under.
const CONFIG_NAME: &str = "rangeharvest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("invalid value {value:?} for {name}")]
    Env { name: &'static str, value: String },
}

/// How a run is paced and where it writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Days per chunk.
    pub interval_days: i64,
    /// Directory receiving one JSON artifact per chunk.
    pub output_dir: PathBuf,
    /// Skip chunks whose artifact already exists.
    pub resume: bool,
    pub max_scroll_iterations: u32,
    /// Pause after each scroll, in milliseconds.
    #[serde(with = "millis")]
    pub scroll_settle: Duration,
    pub filter_timing: FilterTiming,
    /// Retries for clicks intercepted by overlays.
    pub retry: RetryPolicy,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            interval_days: 7,
            output_dir: PathBuf::from("output"),
            resume: false,
            max_scroll_iterations: 60,
            scroll_settle: Duration::from_secs(2),
            filter_timing: FilterTiming::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything specific to the harvested site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    /// `id` of the calendar table.
    pub table_id: String,
    /// Live-DOM selector for section headers, watched while scrolling.
    pub header_rows: String,
    pub layout: RowLayout,
    pub controls: FilterControls,
    /// Category labels selected when none are given on the command line.
    pub targets: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hk.investing.com/economic-calendar/".into(),
            table_id: "economicCalendarData".into(),
            header_rows: "#economicCalendarData td.theDay".into(),
            layout: RowLayout::default(),
            controls: FilterControls::default(),
            targets: ["歐盟區", "英國", "德國", "美國", "中國", "日本", "南韓", "新加坡", "台灣"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub harvest: HarvestSettings,
    pub site: SiteConfig,
    pub browser: BrowserEngineConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit` if given, else from the first discovered file,
    /// else defaults. Environment overrides are applied last.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover().await,
        };
        let config = match path {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::load_from_path(&path).await?
            }
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Locate a `rangeharvest` config file in the standard locations.
    /// Only the path is taken from `prefer`; parsing goes through
    /// [`load_from_path`](Self::load_from_path).
    pub async fn discover() -> Option<PathBuf> {
        match prefer::load(CONFIG_NAME).await {
            Ok(found) => found.source_path().map(|p| p.to_path_buf()),
            Err(e) => {
                debug!("No config file discovered: {}", e);
                None
            }
        }
    }

    /// Load configuration from a specific file path.
    /// The format follows the file extension; anything unknown is read as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply `HARVEST_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    fn with_overrides(
        mut self,
        var: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(dir) = var("HARVEST_OUTPUT_DIR") {
            self.harvest.output_dir = PathBuf::from(dir);
        }
        if let Some(value) = var("HARVEST_INTERVAL_DAYS") {
            self.harvest.interval_days = value.parse().map_err(|_| ConfigError::Env {
                name: "HARVEST_INTERVAL_DAYS",
                value,
            })?;
        }
        if let Some(value) = var("HARVEST_HEADLESS") {
            self.browser.headless = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Env {
                        name: "HARVEST_HEADLESS",
                        value,
                    })
                }
            };
        }
        if let Some(url) = var("HARVEST_REMOTE_URL") {
            self.browser.remote_url = Some(url);
        }
        Ok(self)
    }

    /// Resolve a path that may be relative to the config file.
    /// A leading `~` is expanded first; absolute paths are returned as-is.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            return path;
        }
        match self.source_path.as_ref().and_then(|p| p.parent()) {
            Some(base) if !base.as_os_str().is_empty() => base.join(path),
            _ => path,
        }
    }

    /// The chunk runner described by this configuration.
    pub fn chunk_runner(&self) -> ChunkRunner {
        ChunkRunner::new(
            FilterApplier::new(
                self.site.controls.clone(),
                self.harvest.filter_timing,
                self.harvest.retry,
            ),
            ScrollLoader::new(self.site.header_rows.clone(), self.harvest.scroll_settle),
            self.harvest.max_scroll_iterations,
            TableSource {
                table_id: self.site.table_id.clone(),
                layout: self.site.layout.clone(),
            },
        )
    }
}
