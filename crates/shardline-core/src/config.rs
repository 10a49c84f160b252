//! Sharding configuration

use serde::{Deserialize, Serialize};
use shardline_common::{Result, ShardlineError};
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;
use crate::router::{ShardCount, ShardRouter, ShardingStrategy};

// ============================================================================
// Sharding Configuration Constants
// ============================================================================

/// Default number of shards.
pub const DEFAULT_SHARD_COUNT: i64 = 2;

/// Default number of records per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

pub const ENV_SHARD_COUNT: &str = "SHARDLINE_SHARD_COUNT";
pub const ENV_CHUNK_SIZE: &str = "SHARDLINE_CHUNK_SIZE";
pub const ENV_CONCURRENCY: &str = "SHARDLINE_CONCURRENCY";
pub const ENV_DEADLINE_MS: &str = "SHARDLINE_DEADLINE_MS";
pub const ENV_STRATEGY: &str = "SHARDLINE_STRATEGY";

/// Everything the core needs to route, partition and dispatch a run
///
/// Values are kept raw so that a bad setting is reported by
/// [`ShardingConfig::validate`] instead of being silently clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingConfig {
    pub shard_count: i64,
    pub chunk_size: usize,
    /// Defaults to the shard count when unset
    pub concurrency: Option<usize>,
    pub deadline: Option<Duration>,
    pub strategy: ShardingStrategy,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: None,
            deadline: None,
            strategy: ShardingStrategy::default(),
        }
    }
}

impl ShardingConfig {
    pub fn builder() -> ShardingConfigBuilder {
        ShardingConfigBuilder::default()
    }

    /// Load from the process environment, reading `.env` first when present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            shard_count: parse_var(&lookup, ENV_SHARD_COUNT)?.unwrap_or(defaults.shard_count),
            chunk_size: parse_var(&lookup, ENV_CHUNK_SIZE)?.unwrap_or(defaults.chunk_size),
            concurrency: parse_var(&lookup, ENV_CONCURRENCY)?,
            deadline: parse_var::<u64, _>(&lookup, ENV_DEADLINE_MS)?.map(Duration::from_millis),
            strategy: match lookup(ENV_STRATEGY) {
                Some(value) => value.trim().parse()?,
                None => defaults.strategy,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        ShardCount::new(self.shard_count)?;

        if self.chunk_size == 0 {
            return Err(ShardlineError::InvalidChunkSize(0));
        }

        if self.concurrency == Some(0) {
            return Err(ShardlineError::InvalidConcurrency(0));
        }

        if self.deadline == Some(Duration::ZERO) {
            return Err(ShardlineError::config("Deadline must be greater than 0"));
        }

        Ok(())
    }

    /// Worker pool size actually used for a run
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or_else(|| usize::try_from(self.shard_count).unwrap_or(1).max(1))
    }

    pub fn router(&self) -> Result<ShardRouter> {
        Ok(ShardRouter::new(ShardCount::new(self.shard_count)?, self.strategy))
    }

    pub fn coordinator_config(&self) -> Result<CoordinatorConfig> {
        self.validate()?;
        let config = CoordinatorConfig::new(self.effective_concurrency())?;
        Ok(match self.deadline {
            Some(deadline) => config.with_deadline(deadline),
            None => config,
        })
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
            .map_err(|_| ShardlineError::config(format!("{} is not a valid number: {}", name, raw))),
    }
}

/// Builder for [`ShardingConfig`]
#[derive(Debug, Default)]
pub struct ShardingConfigBuilder {
    config: ShardingConfig,
}

impl ShardingConfigBuilder {
    pub fn shard_count(mut self, shard_count: i64) -> Self {
        self.config.shard_count = shard_count;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = Some(concurrency);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = Some(deadline);
        self
    }

    pub fn strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<ShardingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
