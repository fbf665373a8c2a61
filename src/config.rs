//! Application configuration loaded from environment variables and the
//! saved board settings file.
//!
//! Environment variables (empty values are treated as unset):
//! - `PRICEBOARD_CONFIG`: path of the board settings JSON (default `board.json`)
//! - `PRICEBOARD_STATE_DIR`: directory for durable board state (default `.priceboard`)
//! - `PRICEBOARD_API_URL`: overrides the feed URL saved in the settings file

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::symbol::SymbolConfig;
use crate::notify::DEFAULT_MAX_VISIBLE;

/// Default settings file location.
pub const DEFAULT_CONFIG_PATH: &str = "board.json";

/// Default durable state directory.
pub const DEFAULT_STATE_DIR: &str = ".priceboard";

/// Default refresh interval (15 minutes).
pub const DEFAULT_TTL_SECONDS: u64 = 900;

/// Default time an alert stays visible.
pub const DEFAULT_POPUP_DURATION_SECONDS: u64 = 5;

/// Default upper bound on one feed request.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 30;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub board: BoardConfig,
    pub state_dir: PathBuf,
}

/// Board settings as saved by the settings screen.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardConfig {
    pub api_url: String,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
    /// Seconds an alert stays on screen.
    #[serde(default = "default_popup_duration")]
    pub popup_duration: u64,
    #[serde(default = "default_max_visible_popups")]
    pub max_visible_popups: usize,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_popup_duration() -> u64 {
    DEFAULT_POPUP_DURATION_SECONDS
}

fn default_max_visible_popups() -> usize {
    DEFAULT_MAX_VISIBLE
}

fn default_fetch_timeout_seconds() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECONDS
}

impl BoardConfig {
    /// Settings with every default applied.
    pub fn new(api_url: impl Into<String>, symbols: Vec<SymbolConfig>) -> Self {
        Self {
            api_url: api_url.into(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            symbols,
            popup_duration: DEFAULT_POPUP_DURATION_SECONDS,
            max_visible_popups: DEFAULT_MAX_VISIBLE,
            fetch_timeout_seconds: DEFAULT_FETCH_TIMEOUT_SECONDS,
        }
    }

    /// Loads and validates the settings file.
    ///
    /// # Errors
    ///
    /// Returns [`PriceBoardError::ConfigMissing`](crate::PriceBoardError::ConfigMissing)
    /// if the file does not exist, and a `Config` or `Json` error if it
    /// cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(crate::PriceBoardError::ConfigMissing(
                    path.display().to_string(),
                ));
            }
            Err(e) => {
                return Err(crate::PriceBoardError::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        Self::from_json(&contents)
    }

    /// Parses and validates settings from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and symbol uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`PriceBoardError::Config`](crate::PriceBoardError::Config)
    /// describing the first invalid value.
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |msg: String| -> crate::Result<()> { Err(crate::PriceBoardError::Config(msg)) };

        if self.api_url.trim().is_empty() {
            return invalid("apiUrl must not be empty".to_string());
        }
        if self.ttl_seconds == 0 {
            return invalid("ttlSeconds must be greater than zero".to_string());
        }
        if self.popup_duration == 0 {
            return invalid("popupDuration must be greater than zero".to_string());
        }
        if self.max_visible_popups == 0 {
            return invalid("maxVisiblePopups must be at least 1".to_string());
        }
        if self.fetch_timeout_seconds == 0 {
            return invalid("fetchTimeoutSeconds must be greater than zero".to_string());
        }

        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.symbol.trim().is_empty() {
                return invalid("symbol codes must not be empty".to_string());
            }
            if !seen.insert(symbol.symbol.as_str()) {
                return invalid(format!("symbol {} is configured twice", symbol.symbol));
            }
        }

        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn popup_duration(&self) -> Duration {
        Duration::from_secs(self.popup_duration)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Loads the application configuration from the environment and the
/// settings file it points at.
///
/// # Errors
///
/// Returns [`PriceBoardError::ConfigMissing`](crate::PriceBoardError::ConfigMissing)
/// if no settings file has been saved yet, or a `Config`/`Json` error if it
/// is invalid.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let config_path = non_empty_var("PRICEBOARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let state_dir = non_empty_var("PRICEBOARD_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

    let mut board = BoardConfig::load(&config_path)?;
    if let Some(api_url) = non_empty_var("PRICEBOARD_API_URL") {
        board.api_url = api_url;
    }

    Ok(AppConfig { board, state_dir })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
