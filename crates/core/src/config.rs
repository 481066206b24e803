// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and retry configuration
//!
//! Loadable from TOML; durations use humantime strings (`"250ms"`, `"6s"`).
//!
//! ```toml
//! connect_string = "zk1:2181,zk2:2181"
//! session_timeout = "10s"
//! max_connect_attempts = 5
//!
//! [retry]
//! base_delay = "250ms"
//!
//! [multi_lock]
//! max_attempts = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Backoff between attempts to open a connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectBackoff {
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for ConnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(7500),
        }
    }
}

/// Delay schedule for re-running a primitive's failed operation
///
/// Attempt `n` waits `base_delay + n * step`, capped at `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub step: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            step: Duration::from_millis(500),
            max_delay: Duration::from_millis(7500),
        }
    }
}

/// Backoff and attempt budget for multi-path acquisition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiLockConfig {
    #[serde(with = "humantime_serde")]
    pub min_retry_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_retry_delay: Duration,
    pub max_attempts: u32,
}

impl Default for MultiLockConfig {
    fn default() -> Self {
        Self {
            min_retry_delay: Duration::from_millis(125),
            max_retry_delay: Duration::from_millis(4000),
            max_attempts: 10,
        }
    }
}

impl MultiLockConfig {
    pub fn with_retry_delays(mut self, min: Duration, max: Duration) -> Self {
        self.min_retry_delay = min;
        self.max_retry_delay = max;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "multi_lock.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.min_retry_delay > self.max_retry_delay {
            return Err(ConfigError::Invalid(
                "multi_lock.min_retry_delay exceeds max_retry_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a [`crate::Session`] needs to connect and schedule retries
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `host1:port1,host2:port2`
    pub connect_string: String,
    #[serde(with = "humantime_serde", default = "default_session_timeout")]
    pub session_timeout: Duration,
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
    #[serde(default)]
    pub connect_backoff: ConnectBackoff,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub multi_lock: MultiLockConfig,
    /// Retry worker threads; defaults to available parallelism
    #[serde(default)]
    pub retry_workers: Option<usize>,
}

fn default_session_timeout() -> Duration {
    Duration::from_millis(6000)
}

fn default_max_connect_attempts() -> u32 {
    5
}

impl SessionConfig {
    pub fn new(connect_string: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            session_timeout: default_session_timeout(),
            max_connect_attempts: default_max_connect_attempts(),
            connect_backoff: ConnectBackoff::default(),
            retry: RetryPolicy::default(),
            multi_lock: MultiLockConfig::default(),
            retry_workers: None,
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_max_connect_attempts(mut self, attempts: u32) -> Self {
        self.max_connect_attempts = attempts;
        self
    }

    pub fn with_connect_backoff(mut self, backoff: ConnectBackoff) -> Self {
        self.connect_backoff = backoff;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_multi_lock(mut self, multi_lock: MultiLockConfig) -> Self {
        self.multi_lock = multi_lock;
        self
    }

    pub fn with_retry_workers(mut self, workers: usize) -> Self {
        self.retry_workers = Some(workers);
        self
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_string.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "connect_string must not be empty".to_string(),
            ));
        }
        if self.max_connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_connect_attempts must be at least 1".to_string(),
            ));
        }
        if self.connect_backoff.initial_delay > self.connect_backoff.max_delay {
            return Err(ConfigError::Invalid(
                "connect_backoff.initial_delay exceeds max_delay".to_string(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid(
                "retry.base_delay exceeds max_delay".to_string(),
            ));
        }
        if self.retry_workers == Some(0) {
            return Err(ConfigError::Invalid(
                "retry_workers must be at least 1".to_string(),
            ));
        }
        self.multi_lock.validate()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
