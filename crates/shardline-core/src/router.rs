//! Shard targets and key routing
//!
//! Routing is a pure function of the key text and the shard count. The
//! strategy is picked once, when the router is configured, and every call to
//! [`ShardRouter::route`] goes through the same contract whatever the strategy.
//!
//! `HashModulo` remaps almost every key when the shard count changes. That is
//! fine for a fixed topology; resharding needs a different strategy.

use serde::{Deserialize, Serialize};
use shardline_common::{Result, ShardlineError};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use crate::hasher::{CompositeKey, KeyHasher};

/// Prefix of rendered shard target names (`ds_0`, `ds_1`, ...)
pub const TARGET_PREFIX: &str = "ds_";

/// One independently addressable shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ShardTarget {
    ordinal: u32,
}

impl ShardTarget {
    pub fn new(ordinal: u32) -> Self {
        Self { ordinal }
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Position of this target in per-shard vectors
    pub fn index(&self) -> usize {
        self.ordinal as usize
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ShardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TARGET_PREFIX, self.ordinal)
    }
}

impl FromStr for ShardTarget {
    type Err = ShardlineError;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix(TARGET_PREFIX)
            .and_then(|n| n.parse::<u32>().ok())
            .map(Self::new)
            .ok_or_else(|| ShardlineError::InvalidTarget(s.to_string()))
    }
}

impl From<ShardTarget> for String {
    fn from(target: ShardTarget) -> Self {
        target.to_string()
    }
}

impl TryFrom<String> for ShardTarget {
    type Error = ShardlineError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Validated, strictly positive number of shards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct ShardCount(NonZeroU32);

impl ShardCount {
    /// Fails with [`ShardlineError::InvalidShardCount`] for zero, negative or
    /// out-of-range counts
    pub fn new(count: i64) -> Result<Self> {
        u32::try_from(count)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(ShardlineError::InvalidShardCount(count))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Every target of this topology, in ordinal order
    pub fn targets(&self) -> impl Iterator<Item = ShardTarget> {
        (0..self.get()).map(ShardTarget::new)
    }
}

impl TryFrom<i64> for ShardCount {
    type Error = ShardlineError;

    fn try_from(count: i64) -> Result<Self> {
        Self::new(count)
    }
}

impl From<ShardCount> for u32 {
    fn from(count: ShardCount) -> Self {
        count.get()
    }
}

impl fmt::Display for ShardCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a key hash is turned into a shard ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingStrategy {
    /// `hash(key) mod shard_count`
    #[default]
    HashModulo,
}

impl ShardingStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            ShardingStrategy::HashModulo => "hash_modulo",
        }
    }

    fn ordinal_for(&self, hash: u32, shard_count: ShardCount) -> u32 {
        match self {
            ShardingStrategy::HashModulo => hash % shard_count.get(),
        }
    }
}

impl FromStr for ShardingStrategy {
    type Err = ShardlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hash_modulo" | "hash-modulo" | "modulo" => Ok(ShardingStrategy::HashModulo),
            other => Err(ShardlineError::config(format!("Unknown sharding strategy: {}", other))),
        }
    }
}

impl fmt::Display for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A computed key to target pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardAssignment {
    pub key: CompositeKey,
    pub target: ShardTarget,
}

/// Maps composite keys to exactly one shard of a fixed topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    shard_count: ShardCount,
    strategy: ShardingStrategy,
}

impl ShardRouter {
    pub fn new(shard_count: ShardCount, strategy: ShardingStrategy) -> Self {
        Self {
            shard_count,
            strategy,
        }
    }

    /// Hash-modulo router, validating the raw shard count
    pub fn hash_modulo(shard_count: i64) -> Result<Self> {
        Ok(Self::new(ShardCount::new(shard_count)?, ShardingStrategy::HashModulo))
    }

    pub fn shard_count(&self) -> ShardCount {
        self.shard_count
    }

    pub fn strategy(&self) -> ShardingStrategy {
        self.strategy
    }

    pub fn targets(&self) -> impl Iterator<Item = ShardTarget> {
        self.shard_count.targets()
    }

    /// Route ordered key parts to their shard
    pub fn route<S: AsRef<str>>(&self, parts: &[S]) -> Result<ShardTarget> {
        let hash = KeyHasher::hash(parts)?;
        Ok(ShardTarget::new(self.strategy.ordinal_for(hash, self.shard_count)))
    }

    pub fn route_key(&self, key: &CompositeKey) -> Result<ShardTarget> {
        self.route(key.parts())
    }

    pub fn assign(&self, key: CompositeKey) -> Result<ShardAssignment> {
        let target = self.route_key(&key)?;
        Ok(ShardAssignment { key, target })
    }
}

/// One-shot hash-modulo routing
///
/// Fails with [`ShardlineError::InvalidShardCount`] when `shard_count <= 0`.
pub fn route<S: AsRef<str>>(parts: &[S], shard_count: i64) -> Result<ShardTarget> {
    ShardRouter::hash_modulo(shard_count)?.route(parts)
}
