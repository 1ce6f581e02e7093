//! Configuration for the eBus scraper.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::scraper::BASE_URL;
use crate::types::Direction;

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data/hermes_ebus_taipei.sqlite3".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Upstream site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    BASE_URL.to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub chrome_executable: Option<String>,
    /// Wait after interactions before reading the page
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_click_timeout_ms")]
    pub click_timeout_ms: u64,
    /// Scrolls on the route list page
    #[serde(default = "default_scroll_passes")]
    pub scroll_passes: u32,
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,
}

fn default_headless() -> bool {
    true
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_click_timeout_ms() -> u64 {
    5000
}

fn default_scroll_passes() -> u32 {
    5
}

fn default_scroll_pause_ms() -> u64 {
    1000
}

impl RendererConfig {
    pub fn click_timeout(&self) -> Duration {
        Duration::from_millis(self.click_timeout_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_executable: None,
            settle_ms: default_settle_ms(),
            click_timeout_ms: default_click_timeout_ms(),
            scroll_passes: default_scroll_passes(),
            scroll_pause_ms: default_scroll_pause_ms(),
        }
    }
}

/// Diagnostic output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Save rendered HTML of every fetched page
    #[serde(default)]
    pub dump_html: bool,
    #[serde(default = "default_html_dir")]
    pub html_dir: String,
}

fn default_html_dir() -> String {
    "data".to_string()
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dump_html: false,
            html_dir: default_html_dir(),
        }
    }
}

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Routes to sweep; empty means every pending route
    #[serde(default)]
    pub routes: Vec<String>,
    #[serde(default = "default_directions")]
    pub directions: Vec<Direction>,
    /// Also append arrival samples to the realtime table
    #[serde(default)]
    pub record_snapshots: bool,
}

fn default_directions() -> Vec<Direction> {
    Direction::ALL.to_vec()
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            directions: default_directions(),
            record_snapshots: false,
        }
    }
}

/// Route map configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Image drawn on stops a bus is arriving at
    #[serde(default)]
    pub bus_icon: Option<String>,
    /// Image drawn on the rider's stop
    #[serde(default)]
    pub person_icon: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub plot: PlotConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (EBUS_STORE__PATH, etc.)
            .add_source(
                config::Environment::with_prefix("EBUS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.store.path, "data/hermes_ebus_taipei.sqlite3");
        assert_eq!(config.source.base_url, "https://ebus.gov.taipei");
        assert!(config.renderer.headless);
        assert_eq!(config.renderer.click_timeout(), Duration::from_secs(5));
        assert_eq!(config.sweep.directions, vec![Direction::Go, Direction::Come]);
        assert!(!config.diagnostics.dump_html);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[renderer]\nsettle_ms = 100\n[sweep]\ndirections = [\"go\"]\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.renderer.settle_ms, 100);
        assert_eq!(config.renderer.scroll_passes, 5);
        assert_eq!(config.sweep.directions, vec![Direction::Go]);
    }
}
