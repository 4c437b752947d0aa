//! Scout worker configuration from `BS_*` environment variables.

use sage::config::env_string;
use sage::error::{Error, Result};

/// Worker configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ScoutConfig {
    /// Base URL of the OPDS catalog to scout.
    pub opds_base_url: String,
    pub opds_username: Option<String>,
    pub opds_password: Option<String>,
    /// Base URL of the Sage API, e.g. `http://api:8080/api/v1`.
    pub api_base_url: String,
    /// Floor for the watermark; the persisted value wins when newer.
    pub since_timestamp: i64,
    /// Concurrent item tasks.
    pub concurrency: usize,
    /// Max items per run; 0 means unlimited.
    pub batch_size: usize,
    /// Politeness delay before each item task, in milliseconds.
    pub delay_ms: u64,
    /// Largest download accepted, in bytes.
    pub max_book_size_bytes: u64,
    /// Path of the watermark state file.
    pub state_file: String,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            opds_base_url: String::new(),
            opds_username: None,
            opds_password: None,
            api_base_url: "http://localhost:8080/api/v1".to_string(),
            since_timestamp: 0,
            concurrency: 5,
            batch_size: 0,
            delay_ms: 0,
            max_book_size_bytes: 50 * 1024 * 1024,
            state_file: "scout_state.json".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{key} is not a valid value: {raw}"))),
        None => Ok(default),
    }
}

impl ScoutConfig {
    /// Build from `BS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on unparseable values or failed validation.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            opds_base_url: env_string("BS_OPDS_BASE_URL").unwrap_or_default(),
            opds_username: env_string("BS_OPDS_USERNAME"),
            opds_password: env_string("BS_OPDS_PASSWORD"),
            api_base_url: env_string("BS_API_BASE_URL").unwrap_or(defaults.api_base_url),
            since_timestamp: env_parse("BS_WORKER_SINCE_TIMESTAMP", defaults.since_timestamp)?,
            concurrency: env_parse("BS_WORKER_CONCURRENCY", defaults.concurrency)?,
            batch_size: env_parse("BS_WORKER_BATCH_SIZE", defaults.batch_size)?,
            delay_ms: env_parse("BS_WORKER_DELAY_MS", defaults.delay_ms)?,
            max_book_size_bytes: env_parse("BS_MAX_BOOK_SIZE_BYTES", defaults.max_book_size_bytes)?,
            state_file: env_string("BS_STATE_FILE").unwrap_or(defaults.state_file),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.opds_base_url.is_empty() {
            return Err(Error::config("BS_OPDS_BASE_URL is required"));
        }
        if self.concurrency < 1 {
            return Err(Error::config("BS_WORKER_CONCURRENCY must be at least 1"));
        }
        if self.since_timestamp < 0 {
            return Err(Error::config("BS_WORKER_SINCE_TIMESTAMP cannot be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_base_url() {
        let cfg = ScoutConfig::default();
        assert!(cfg.validate().is_err());

        let cfg = ScoutConfig {
            opds_base_url: "http://catalog".into(),
            ..ScoutConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let cfg = ScoutConfig {
            opds_base_url: "http://catalog".into(),
            concurrency: 0,
            ..ScoutConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
