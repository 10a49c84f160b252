//! Error types for Shardline
//!
//! These are the errors that abort a run before any work is dispatched:
//! invalid topology, invalid batching parameters, keys that cannot be hashed.
//! Failures that happen while a shard job is executing are reported as data
//! in the run report instead (see `shardline_core::ExecutionError`).

use thiserror::Error;

/// Result type alias for Shardline operations
pub type Result<T> = std::result::Result<T, ShardlineError>;

/// Main error type for Shardline
#[derive(Error, Debug)]
pub enum ShardlineError {
    #[error("Invalid shard count: {0} (must be greater than 0)")]
    InvalidShardCount(i64),

    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(i64),

    #[error("Invalid concurrency limit: {0} (must be greater than 0)")]
    InvalidConcurrency(i64),

    #[error("Cannot hash an empty composite key")]
    EmptyKey,

    #[error("Invalid shard target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ShardlineError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error comes from invalid configuration rather than bad input data
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidShardCount(_)
                | Self::InvalidChunkSize(_)
                | Self::InvalidConcurrency(_)
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ShardlineError::InvalidShardCount(0).to_string(),
            "Invalid shard count: 0 (must be greater than 0)"
        );
        assert_eq!(ShardlineError::EmptyKey.to_string(), "Cannot hash an empty composite key");
    }

    #[test]
    fn test_is_config() {
        assert!(ShardlineError::InvalidShardCount(-1).is_config());
        assert!(ShardlineError::config("bad").is_config());
        assert!(!ShardlineError::EmptyKey.is_config());
        assert!(!ShardlineError::InvalidTarget("x".into()).is_config());
    }
}
