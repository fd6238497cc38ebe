//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Caller overrides (command-line flags)
//! 2. Environment variables (FEEDWATCH_*)
//! 3. TOML config file (explicit path, or FEEDWATCH_CONFIG_FILE)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Env var naming a TOML config file.
pub const CONFIG_FILE_ENV: &str = "FEEDWATCH_CONFIG_FILE";

/// Identity sent when none is configured. Some origins refuse the default
/// client identity, so this mimics a desktop browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit";

/// Scoped-tag extraction rule: text inside every `tag` whose `attr_key`
/// attribute equals `attr_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRule {
    pub tag: String,
    pub attr_key: String,
    pub attr_value: String,
}

impl ExtractRule {
    pub fn new(tag: impl Into<String>, attr_key: impl Into<String>, attr_value: impl Into<String>) -> Self {
        Self { tag: tag.into(), attr_key: attr_key.into(), attr_value: attr_value.into() }
    }

    /// `<div class="article__title">`
    pub fn default_title() -> Self {
        Self::new("div", "class", "article__title")
    }

    /// `<div class="article__text">`
    pub fn default_body() -> Self {
        Self::new("div", "class", "article__text")
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Overrides passed to [`AppConfig::load_with`]
/// 2. Environment variables (FEEDWATCH_*)
/// 3. TOML config file
/// 4. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// RSS feed to ingest. `None` disables feed ingestion for the run.
    ///
    /// Set via FEEDWATCH_FEED_URL environment variable.
    #[serde(default)]
    pub feed_url: Option<String>,

    /// Staleness and retention threshold in seconds (default: 3 days).
    ///
    /// Set via FEEDWATCH_THRESHOLD_SECS environment variable.
    #[serde(default = "default_threshold_secs")]
    pub threshold_secs: u64,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via FEEDWATCH_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Path to the SQLite ledger database.
    ///
    /// Set via FEEDWATCH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via FEEDWATCH_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via FEEDWATCH_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Rule locating the article title.
    ///
    /// Set via FEEDWATCH_TITLE_RULE__TAG / __ATTR_KEY / __ATTR_VALUE.
    #[serde(default = "ExtractRule::default_title")]
    pub title_rule: ExtractRule,

    /// Rule locating the article body.
    ///
    /// Set via FEEDWATCH_BODY_RULE__TAG / __ATTR_KEY / __ATTR_VALUE.
    #[serde(default = "ExtractRule::default_body")]
    pub body_rule: ExtractRule,
}

fn default_threshold_secs() -> u64 {
    259_200 // 3 days
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./feedwatch.sqlite")
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            threshold_secs: default_threshold_secs(),
            user_agent: default_user_agent(),
            db_path: default_db_path(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            title_rule: ExtractRule::default_title(),
            body_rule: ExtractRule::default_body(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Staleness/retention threshold as a signed delta for timestamp arithmetic.
    pub fn threshold(&self) -> TimeDelta {
        i64::try_from(self.threshold_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Load configuration from defaults, the config file and the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(None))
    }

    /// Load configuration with an explicit config file and caller overrides.
    ///
    /// `overrides` must serialize to a map; keys it leaves out keep their
    /// lower-precedence value.
    pub fn load_with<T: Serialize>(config_file: Option<&Path>, overrides: &T) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(config_file).merge(Serialized::defaults(overrides)))
    }

    /// Layered figment without caller overrides.
    ///
    /// An explicit `config_file` takes the place of `FEEDWATCH_CONFIG_FILE`.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let config_path = config_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from));
        if let Some(config_path) = config_path {
            figment = figment.merge(Toml::file(config_path));
        }

        figment.merge(
            Env::prefixed("FEEDWATCH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
