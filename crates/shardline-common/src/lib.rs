//! Shardline Common Library
//!
//! Shared error handling and logging for the Shardline workspace.
//!
//! - **Error Handling**: configuration-time error type and result alias
//! - **Logging**: `tracing` subscriber setup driven by environment or builder
//!
//! # Example
//!
//! ```no_run
//! use shardline_common::logging::{init_logging, LogConfig};
//! use shardline_common::{Result, ShardlineError};
//!
//! fn validate_shards(count: i64) -> Result<u32> {
//!     u32::try_from(count)
//!         .ok()
//!         .filter(|n| *n > 0)
//!         .ok_or(ShardlineError::InvalidShardCount(count))
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     validate_shards(2)?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, ShardlineError};
