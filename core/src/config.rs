//! Client configuration.

use std::time::Duration;

use thiserror::Error;

/// Environment variable overriding the request timeout, in whole seconds.
pub const TIMEOUT_ENV: &str = "API_CLIENT_TIMEOUT_SECS";

/// Twenty minutes, matching the session the mobile app used.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1200);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a whole number of seconds, got {value:?}")]
    InvalidTimeout { name: &'static str, value: String },
}

/// Settings shared by every request a client issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source. Unset variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(TIMEOUT_ENV) {
            let secs: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidTimeout {
                name: TIMEOUT_ENV,
                value: value.clone(),
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}
