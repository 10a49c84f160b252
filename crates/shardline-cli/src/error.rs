//! Error types for the Shardline CLI
//!
//! Messages are user-facing and say what to check next.

use shardline_common::ShardlineError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Sharding parameters or keys were rejected before any work started
    #[error("{0}. Check the SHARDLINE_* environment variables and the command flags.")]
    Sharding(#[from] ShardlineError),

    /// Configuration is missing or inconsistent
    #[error("Configuration error: {0}. Check your environment variables or command flags.")]
    Config(String),

    /// Database operation failed (SQLx)
    #[error("Database error: {0}. Check the shard connection URLs in SHARDLINE_SHARD_URLS.")]
    Database(#[from] sqlx::Error),

    /// JSON rendering failed
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the command never got as far as running
    ///
    /// These map to exit code 2, like clap's own usage errors.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Sharding(_) | Self::Config(_))
    }
}
