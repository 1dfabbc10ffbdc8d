//! Client configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! api_url = "https://whisperer.example.edu"
//! request_timeout = "15s"
//!
//! [usage]
//! poll_interval = "30s"
//! min_refresh_interval = "10s"
//! low_threshold = 80.0
//! exhausted_threshold = 100.0
//! ```
//!
//! Every key can be overridden from the environment with the `WHISPERER`
//! prefix and `__` as separator, e.g. `WHISPERER__USAGE__POLL_INTERVAL=1m`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ClientResult;
use crate::error::ClientError;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "whisperer.toml";

/// Root client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL.
    pub api_url: String,

    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Usage meter settings.
    pub usage: UsageConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            request_timeout: Duration::from_secs(30),
            usage: UsageConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Checks cross-field constraints.
    pub fn validate(&self) -> ClientResult<()> {
        let url = Url::parse(&self.api_url).map_err(|e| {
            ClientError::configuration(format!("api_url {:?} is not a URL: {e}", self.api_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::configuration(format!(
                "api_url must use http or https, got {}",
                url.scheme()
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::configuration("request_timeout must be non-zero"));
        }
        self.usage.validate()
    }
}

/// Usage meter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Period between background polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Manual refreshes closer together than this are skipped.
    #[serde(with = "humantime_serde")]
    pub min_refresh_interval: Duration,

    /// Percentage at which usage is reported as low on budget.
    pub low_threshold: f64,

    /// Percentage at which the budget is reported as exhausted.
    pub exhausted_threshold: f64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            min_refresh_interval: Duration::from_secs(10),
            low_threshold: 80.0,
            exhausted_threshold: 100.0,
        }
    }
}

impl UsageConfig {
    pub fn validate(&self) -> ClientResult<()> {
        if self.poll_interval.is_zero() {
            return Err(ClientError::configuration("usage.poll_interval must be non-zero"));
        }
        if !(self.low_threshold > 0.0 && self.low_threshold <= self.exhausted_threshold) {
            return Err(ClientError::configuration(format!(
                "usage thresholds must satisfy 0 < low ({}) <= exhausted ({})",
                self.low_threshold, self.exhausted_threshold
            )));
        }
        Ok(())
    }
}

/// Loads configuration from `path` (or [`DEFAULT_CONFIG_FILE`] when `None`)
/// and `WHISPERER__*` environment variables, then validates it. A missing
/// file is not an error.
pub fn load_config(path: Option<&Path>) -> ClientResult<ClientConfig> {
    let mut builder = Config::builder();
    let file = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if file.exists() {
        builder = builder.add_source(File::from(file));
    }
    // Environment variable overrides, e.g. WHISPERER__API_URL=https://...
    builder = builder.add_source(
        Environment::with_prefix("WHISPERER")
            .prefix_separator("__")
            .try_parsing(true)
            .separator("__"),
    );
    let cfg = builder
        .build()
        .map_err(|e| ClientError::configuration(format!("config build error: {e}")))?;
    let merged: ClientConfig = cfg
        .try_deserialize()
        .map_err(|e| ClientError::configuration(format!("config deserialize error: {e}")))?;
    merged.validate()?;
    Ok(merged)
}
