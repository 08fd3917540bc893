//! Cache layer error types

use thiserror::Error;

/// Cache layer errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Transport or server-side failure, passed through untouched.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Please use batch processing for keys count > {limit} (got {count})")]
    BatchTooLarge { count: usize, limit: usize },

    #[error("No cache host registered under label '{0}'")]
    UnknownHost(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// True for errors raised before any command reached the store.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_)
                | Self::BatchTooLarge { .. }
                | Self::UnknownHost(_)
                | Self::InvalidArgument(_)
                | Self::Config(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
