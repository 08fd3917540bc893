//! # Probe Configuration
//!
//! Environment-based configuration for the smoke-test runner.

use cache_wrapper::{CacheError, CacheHostsConfig};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Store the probe talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Live Redis servers from the hosts configuration
    #[default]
    Redis,
    /// In-process emulator shared by every registered label
    Memory,
}

impl FromStr for Backend {
    type Err = CacheError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(CacheError::Config(format!(
                "CACHE_BACKEND must be 'redis' or 'memory', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => f.write_str("redis"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Probe configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Logging level
    pub log_level: String,

    /// Which store to run against
    pub backend: Backend,

    /// Service segment of every probe key
    pub service_prefix: String,

    /// Key segment of every probe key
    pub key_prefix: String,

    /// Hosts to register
    pub hosts: CacheHostsConfig,
}

impl ProbeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> cache_wrapper::Result<Self> {
        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            backend: env::var("CACHE_BACKEND")
                .ok()
                .map(|raw| raw.parse())
                .transpose()?
                .unwrap_or_default(),

            service_prefix: env::var("CACHE_SERVICE_PREFIX")
                .unwrap_or_else(|_| "probe".to_string()),

            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or_else(|_| "smoke".to_string()),

            hosts: CacheHostsConfig::from_env()?,
        })
    }
}
