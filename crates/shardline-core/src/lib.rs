//! Shardline Core
//!
//! Shard routing and concurrent per-shard batch execution.
//!
//! Records flow through the crate in one direction:
//!
//! 1. [`KeyHasher`] turns a [`CompositeKey`] into a stable non-negative hash
//! 2. [`ShardRouter`] maps that hash onto one [`ShardTarget`]
//! 3. [`ShardPartitioner`] groups records per target into [`BatchJob`]s
//! 4. [`ParallelShardCoordinator`] runs each job through a [`BatchExecutor`]
//!    against a [`DmlSink`] and collects a [`RunReport`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shardline_core::{
//!     CompositeKey, MemorySink, ParallelShardCoordinator, ShardPartitioner, ShardingConfig,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ShardingConfig::from_env()?;
//! let users: Vec<(u64, String)> = (0..1_000).map(|i| (i, format!("User{}", i))).collect();
//!
//! let jobs = ShardPartitioner::new(config.router()?)
//!     .partition(users, |(id, name)| CompositeKey::new([id.to_string(), name.clone()]))?
//!     .into_jobs(config.chunk_size)?;
//!
//! let sink = Arc::new(MemorySink::<(u64, String)>::new());
//! let report = ParallelShardCoordinator::new(sink, config.coordinator_config()?)
//!     .run(jobs)
//!     .await;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod hasher;
pub mod memory;
pub mod partitioner;
pub mod report;
pub mod router;
pub mod sink;

pub use config::ShardingConfig;
pub use coordinator::{CoordinatorConfig, ParallelShardCoordinator};
pub use executor::{
    BatchExecutor, BatchJob, ChunkPhase, ExecutionError, ExecutionResult, ExecutionStatus,
};
pub use hasher::{CompositeKey, KeyHasher};
pub use memory::{MemorySink, MemorySinkStats};
pub use partitioner::{ConcurrentPartitioner, ShardBuckets, ShardPartitioner};
pub use report::{RunReport, RunSummary, ShardSummary};
pub use router::{route, ShardCount, ShardRouter, ShardTarget, ShardingStrategy};
pub use sink::DmlSink;
