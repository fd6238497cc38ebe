//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, ExtractRule};
use thiserror::Error;

/// Longest accepted threshold: 100 years.
const MAX_THRESHOLD_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `threshold_secs` is 0 or exceeds 100 years
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `feed_url` is set but blank
    /// - either extraction rule has a blank tag or attribute key
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_secs == 0 {
            return Err(ConfigError::Invalid { field: "threshold_secs".into(), reason: "must be greater than 0".into() });
        }
        if self.threshold_secs > MAX_THRESHOLD_SECS {
            return Err(ConfigError::Invalid {
                field: "threshold_secs".into(),
                reason: "must not exceed 100 years".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if let Some(feed_url) = &self.feed_url
            && feed_url.trim().is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "feed_url".into(),
                reason: "must not be blank; leave it unset to disable feed ingestion".into(),
            });
        }

        validate_rule("title_rule", &self.title_rule)?;
        validate_rule("body_rule", &self.body_rule)?;

        if self.feed_url.is_none() {
            tracing::debug!("feed_url not set; runs will only re-check the existing ledger");
        }

        Ok(())
    }
}

fn validate_rule(field: &str, rule: &ExtractRule) -> Result<(), ConfigError> {
    if rule.tag.trim().is_empty() {
        return Err(ConfigError::Invalid { field: format!("{field}.tag"), reason: "must not be empty".into() });
    }
    if rule.attr_key.trim().is_empty() {
        return Err(ConfigError::Invalid { field: format!("{field}.attr_key"), reason: "must not be empty".into() });
    }
    Ok(())
}
