use crate::allocator::{EngineSettings, Policy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top level configuration of the `netaddr` tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    /// Treat pre-existing or missing state as an error
    #[serde(default = "default_strict")]
    pub strict: bool,
}

/// Where allocation state lives and how patiently it is accessed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_path")]
    pub path: PathBuf,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Retries of a store request that failed transiently
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

fn default_strict() -> bool {
    true
}

fn default_path() -> PathBuf {
    PathBuf::from("netaddr.state")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retries() -> u32 {
    10
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(100)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            request_timeout: default_request_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            strict: default_strict(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.store.path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidStore(
                "path cannot be empty".to_string(),
            ));
        }
        if self.store.request_timeout.is_zero() {
            return Err(ValidationError::InvalidStore(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> Policy {
        if self.strict {
            Policy::Strict
        } else {
            Policy::Tolerant
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            request_timeout: self.store.request_timeout,
            retry: RetryPolicy {
                retries: self.store.retries,
                delay: self.store.retry_delay,
            },
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid store configuration: {0}")]
    InvalidStore(String),
}
