//! Database configuration for the Postgres backend

use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Comma separated connection URLs, one per shard, in ordinal order.
pub const ENV_SHARD_URLS: &str = "SHARDLINE_SHARD_URLS";

pub const ENV_MAX_CONNECTIONS: &str = "SHARDLINE_DB_MAX_CONNECTIONS";
pub const ENV_CONNECT_TIMEOUT: &str = "SHARDLINE_DB_CONNECT_TIMEOUT";

/// Default maximum connections per shard pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for every shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Index `n` is the URL of shard `ds_n`
    pub shard_urls: Vec<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Load from environment, reading `.env` first when present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let shard_urls = lookup(ENV_SHARD_URLS)
            .ok_or_else(|| CliError::config(format!("{} is not set", ENV_SHARD_URLS)))?
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        Ok(Self {
            shard_urls,
            max_connections: parse_var(&lookup, ENV_MAX_CONNECTIONS)?
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            connect_timeout_secs: parse_var(&lookup, ENV_CONNECT_TIMEOUT)?
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        })
    }

    /// Validate against the number of shards a run routes to
    pub fn validate(&self, shard_count: u32) -> Result<()> {
        if self.shard_urls.len() != shard_count as usize {
            return Err(CliError::config(format!(
                "{} lists {} URLs but the run uses {} shards",
                ENV_SHARD_URLS,
                self.shard_urls.len(),
                shard_count
            )));
        }

        if let Some(index) = self.shard_urls.iter().position(String::is_empty) {
            return Err(CliError::config(format!(
                "{} has an empty URL for ds_{}",
                ENV_SHARD_URLS, index
            )));
        }

        if self.max_connections == 0 {
            return Err(CliError::config("Database max_connections must be greater than 0"));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CliError::config(format!("{} is not a valid number: {}", name, raw))),
    }
}
