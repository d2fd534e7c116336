// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_FLUSH_THRESHOLD: usize = 100;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Payload compression applied by the HTTP publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Gzip,
    None,
}

impl Compression {
    /// Value of the `Content-Encoding` header for this compression.
    #[must_use]
    pub fn content_encoding(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::None => "identity",
        }
    }
}

impl FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gzip" => Ok(Compression::Gzip),
            "none" => Ok(Compression::None),
            _ => Err(ConfigError::UnknownCompression(s.to_string())),
        }
    }
}

/// Configuration for the event client, its buffer and its publisher.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ingestion API base URL, e.g. `http://samsara-ingestion.local/`
    pub url: String,
    /// Source identifier given to events recorded without one
    pub default_source_id: String,
    /// Whether to start the background publishing task on construction
    pub start_publishing: bool,
    /// How often the publishing task checks the buffer
    pub flush_interval: Duration,
    /// Maximum number of buffered events; oldest are dropped beyond it.
    /// Zero disables buffering.
    pub capacity: usize,
    /// Minimum number of buffered events before a flush is attempted
    pub flush_threshold: usize,
    /// Network timeout for a single publish request
    pub send_timeout: Duration,
    pub compression: Compression,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::new(),
            default_source_id: String::new(),
            start_publishing: true,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            capacity: DEFAULT_CAPACITY,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            compression: Compression::default(),
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let url = env::var("SAMSARA_URL").unwrap_or(defaults.url);
        let default_source_id =
            env::var("SAMSARA_SOURCE_ID").unwrap_or(defaults.default_source_id);
        let start_publishing = env::var("SAMSARA_START_PUBLISHING")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.start_publishing);
        let flush_interval = parse_env::<u64>("SAMSARA_PUBLISH_INTERVAL_MS")?
            .map_or(defaults.flush_interval, Duration::from_millis);
        let capacity = parse_env("SAMSARA_MAX_BUFFER_SIZE")?.unwrap_or(defaults.capacity);
        let flush_threshold =
            parse_env("SAMSARA_MIN_BUFFER_SIZE")?.unwrap_or(defaults.flush_threshold);
        let send_timeout = parse_env::<u64>("SAMSARA_SEND_TIMEOUT_MS")?
            .map_or(defaults.send_timeout, Duration::from_millis);
        let compression = match env::var("SAMSARA_COMPRESSION") {
            Ok(val) => val.parse()?,
            Err(_) => defaults.compression,
        };
        let https_proxy = env::var("SAMSARA_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        let log_level = env::var("SAMSARA_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            url,
            default_source_id,
            start_publishing,
            flush_interval,
            capacity,
            flush_threshold,
            send_timeout,
            compression,
            https_proxy,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < self.flush_threshold {
            return Err(ConfigError::Invalid(format!(
                "capacity ({}) can not be less than flush threshold ({})",
                self.capacity, self.flush_threshold
            )));
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "flush interval must be greater than 0".to_string(),
            ));
        }

        if self.send_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "send timeout must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{key} has an invalid value: '{val}'"))),
        Err(_) => Ok(None),
    }
}
