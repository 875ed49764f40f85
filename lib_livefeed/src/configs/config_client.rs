//! # Live Client Configuration
//!
//! Every field is optional so that partial sources can be layered. Later sources
//! win for each field that they set:
//!
//! 1. Built-in defaults (`LiveClientConfig::defaults`).
//! 2. A JSON file: `LIVEFEED_CONFIG_PATH`, or `livefeed.conf` in the working
//!    directory when present.
//! 3. Environment variables, after loading a `.env` file if one exists.
//!
//! | Variable                            | Field                 |
//! |-------------------------------------|-----------------------|
//! | `LIVEFEED_URL`                      | `url`                 |
//! | `LIVEFEED_MAX_RECONNECT_ATTEMPTS`   | `maxReconnectAttempts`|
//! | `LIVEFEED_RECONNECT_INTERVAL_MS`    | `reconnectIntervalMs` |
//! | `LIVEFEED_RECONNECT_MAX_DELAY_MS`   | `reconnectMaxDelayMs` |
//! | `LIVEFEED_BACKOFF`                  | `backoff`             |
//! | `LIVEFEED_BACKOFF_FACTOR`           | `backoffFactor`       |
//! | `LIVEFEED_BACKOFF_JITTER`           | `backoffJitter`       |

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::reconnect::{
    ExponentialBackoffPolicy, FixedIntervalPolicy, ReconnectPolicy, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RECONNECT_INTERVAL,
};
use crate::error::{LiveFeedError, LiveFeedResult};

/// Default JSON config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "livefeed.conf";
/// Default live endpoint of the trading API server.
pub const DEFAULT_URL: &str = "ws://localhost:5000/ws";

/// Which `ReconnectPolicy` to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// `FixedIntervalPolicy`.
    Fixed,
    /// `ExponentialBackoffPolicy`.
    Exponential,
}

impl FromStr for BackoffKind {
    type Err = LiveFeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            other => Err(LiveFeedError::Config(format!("unknown backoff '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveClientConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: Option<String>,
    /// Reconnect attempts allowed after a session ends.
    pub max_reconnect_attempts: Option<u32>,
    /// Fixed delay, or initial delay for exponential backoff, in milliseconds.
    pub reconnect_interval_ms: Option<u64>,
    /// Ceiling for exponential backoff, in milliseconds.
    pub reconnect_max_delay_ms: Option<u64>,
    pub backoff: Option<BackoffKind>,
    pub backoff_factor: Option<f64>,
    pub backoff_jitter: Option<f64>,
}

impl LiveClientConfig {
    /// Built-in defaults: fixed 5 s interval, 5 attempts.
    pub fn defaults() -> Self {
        Self {
            url: Some(DEFAULT_URL.to_string()),
            max_reconnect_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            reconnect_interval_ms: Some(DEFAULT_RECONNECT_INTERVAL.as_millis() as u64),
            reconnect_max_delay_ms: Some(60_000),
            backoff: Some(BackoffKind::Fixed),
            backoff_factor: Some(2.0),
            backoff_jitter: Some(0.5),
        }
    }

    /// Merges two configs; fields set in `other` override `self`.
    pub fn merge(self, other: LiveClientConfig) -> LiveClientConfig {
        LiveClientConfig {
            url: other.url.or(self.url),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            reconnect_interval_ms: other.reconnect_interval_ms.or(self.reconnect_interval_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            backoff: other.backoff.or(self.backoff),
            backoff_factor: other.backoff_factor.or(self.backoff_factor),
            backoff_jitter: other.backoff_jitter.or(self.backoff_jitter),
        }
    }

    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> LiveFeedResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Reads the `LIVEFEED_*` variables through `lookup`.
    pub fn from_env_with<F>(lookup: F) -> LiveFeedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            url: lookup("LIVEFEED_URL"),
            max_reconnect_attempts: parse_var(&lookup, "LIVEFEED_MAX_RECONNECT_ATTEMPTS")?,
            reconnect_interval_ms: parse_var(&lookup, "LIVEFEED_RECONNECT_INTERVAL_MS")?,
            reconnect_max_delay_ms: parse_var(&lookup, "LIVEFEED_RECONNECT_MAX_DELAY_MS")?,
            backoff: parse_var(&lookup, "LIVEFEED_BACKOFF")?,
            backoff_factor: parse_var(&lookup, "LIVEFEED_BACKOFF_FACTOR")?,
            backoff_jitter: parse_var(&lookup, "LIVEFEED_BACKOFF_JITTER")?,
        })
    }

    /// Reads the `LIVEFEED_*` variables from the process environment.
    pub fn from_env() -> LiveFeedResult<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// The validated target URL.
    pub fn target_url(&self) -> LiveFeedResult<Url> {
        let raw = self.url.as_deref().unwrap_or(DEFAULT_URL);
        let url = Url::parse(raw)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(LiveFeedError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Builds the configured reconnect policy.
    pub fn build_policy(&self) -> LiveFeedResult<Arc<dyn ReconnectPolicy>> {
        let max_attempts = self.max_reconnect_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let interval = self
            .reconnect_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RECONNECT_INTERVAL);

        match self.backoff.unwrap_or(BackoffKind::Fixed) {
            BackoffKind::Fixed => Ok(Arc::new(FixedIntervalPolicy::new(max_attempts, interval))),
            BackoffKind::Exponential => {
                let max_delay = self
                    .reconnect_max_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_secs(60));
                let policy = ExponentialBackoffPolicy::new(
                    max_attempts,
                    interval,
                    max_delay,
                    self.backoff_factor.unwrap_or(2.0),
                    self.backoff_jitter.unwrap_or(0.5),
                )?;
                Ok(Arc::new(policy))
            }
        }
    }

    /// Checks that the target and the reconnect policy can both be built.
    pub fn validate(&self) -> LiveFeedResult<()> {
        self.target_url()?;
        self.build_policy()?;
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> LiveFeedResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            LiveFeedError::InvalidEnvVar { name: name.to_string(), value }
        }),
    }
}

/// Resolves which config file to read, if any.
fn config_file_path<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("LIVEFEED_CONFIG_PATH") {
        Some(path) => Some(PathBuf::from(path)),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    }
}

/// Loads defaults, then the config file, then the environment.
pub fn load_config_with<F>(lookup: F) -> LiveFeedResult<LiveClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = LiveClientConfig::defaults();

    match config_file_path(&lookup) {
        Some(path) => {
            log::info!("Loading live feed config from {}", path.display());
            config = config.merge(LiveClientConfig::from_file(&path)?);
        }
        None => log::debug!("No live feed config file; using defaults and environment."),
    }

    config = config.merge(LiveClientConfig::from_env_with(&lookup)?);
    config.validate()?;
    Ok(config)
}

/// Loads the configuration from the process environment (seeded from `.env`).
pub fn load_config() -> LiveFeedResult<LiveClientConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        log::debug!("Loaded environment from {}", path.display());
    }
    load_config_with(|name| std::env::var(name).ok())
}
