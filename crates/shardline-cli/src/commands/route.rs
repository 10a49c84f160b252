//! Route command implementation

use shardline_core::{CompositeKey, ShardCount, ShardRouter, ShardingConfig};
use tracing::debug;

use crate::error::{CliError, Result};
use crate::output::{render_routes, RouteRow};
use crate::OutputFormat;

/// Route every key and print the placements
pub fn run(
    keys: &[String],
    shards: Option<i64>,
    separator: &str,
    format: OutputFormat,
) -> Result<()> {
    let base = ShardingConfig::from_env()?;
    let router = ShardRouter::new(
        ShardCount::new(shards.unwrap_or(base.shard_count))?,
        base.strategy,
    );

    let rows = route_keys(&router, keys, separator)?;
    println!("{}", render_routes(&rows, format)?);
    Ok(())
}

/// Split each key on `separator` and route the resulting parts
pub fn route_keys(router: &ShardRouter, keys: &[String], separator: &str) -> Result<Vec<RouteRow>> {
    if separator.is_empty() {
        return Err(CliError::config("Key separator cannot be empty"));
    }

    keys.iter()
        .map(|key| -> Result<RouteRow> {
            let composite: CompositeKey = key.split(separator).collect();
            let assignment = router.assign(composite)?;
            let hash = assignment.key.hash_value()?;
            debug!(key = %key, hash, shard = %assignment.target, "Routed key");
            Ok(RouteRow {
                key: key.clone(),
                hash,
                target: assignment.target,
            })
        })
        .collect()
}
