//! Load command implementation
//!
//! Generates synthetic users, partitions them by `(id, username)` and runs
//! the chunked DML for every shard in parallel.

use shardline_core::{
    BatchJob, MemorySink, ParallelShardCoordinator, RunReport, ShardPartitioner, ShardTarget,
    ShardingConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{CliError, Result};
use crate::output::render_report;
use crate::postgres::PostgresSink;
use crate::records::{generate_users, UserRecord};
use crate::{Backend, LoadArgs};

/// Run the load command
///
/// Returns whether every shard succeeded.
pub async fn run(args: &LoadArgs) -> Result<bool> {
    let config = resolve_config(ShardingConfig::from_env()?, args)?;
    let load = execute(&config, args).await?;

    // Report first: closing waits on jobs abandoned at the deadline
    println!("{}", render_report(&load.report, args.format)?);
    let complete = load.report.is_complete();
    load.close().await;
    Ok(complete)
}

/// Finished load whose backend may still hold open connections
pub struct LoadRun {
    pub report: RunReport,
    pools: Option<Arc<PostgresSink>>,
}

impl LoadRun {
    /// Release the backend
    ///
    /// Closing the Postgres pools waits for connections still held by jobs
    /// abandoned at the deadline. Once closed, those jobs fail their next
    /// `begin`, so nothing past their current chunk is written.
    pub async fn close(self) {
        if let Some(sink) = self.pools {
            sink.close().await;
        }
    }
}

/// Partition and execute, without printing
pub async fn execute(config: &ShardingConfig, args: &LoadArgs) -> Result<LoadRun> {
    let router = config.router()?;
    let coordinator_config = config.coordinator_config()?;
    validate_fault(args, router.shard_count().get())?;

    info!(
        records = args.records,
        shards = router.shard_count().get(),
        chunk_size = config.chunk_size,
        concurrency = coordinator_config.concurrency(),
        backend = ?args.backend,
        operation = %args.operation,
        "Starting load"
    );

    let started = Instant::now();
    let jobs = ShardPartitioner::new(router)
        .partition(generate_users(args.records)?, UserRecord::shard_key)?
        .into_jobs(config.chunk_size)?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        buckets = ?jobs.iter().map(BatchJob::len).collect::<Vec<_>>(),
        "Partitioned records"
    );

    match args.backend {
        Backend::Memory => {
            let mut sink = MemorySink::<UserRecord>::new();
            if let (Some(shard), Some(chunk)) = (args.fail_shard, args.fail_chunk) {
                sink = sink.fail_on_submit(ShardTarget::new(shard), chunk);
            }
            let report = ParallelShardCoordinator::new(Arc::new(sink), coordinator_config)
                .run(jobs)
                .await;
            Ok(LoadRun {
                report,
                pools: None,
            })
        }
        Backend::Postgres => {
            let database = DatabaseConfig::from_env()?;
            database.validate(router.shard_count().get())?;

            let sink = Arc::new(PostgresSink::connect(&database, args.operation).await?);
            let report = ParallelShardCoordinator::new(Arc::clone(&sink), coordinator_config)
                .run(jobs)
                .await;
            Ok(LoadRun {
                report,
                pools: Some(sink),
            })
        }
    }
}

/// Overlay command flags on the environment configuration
pub fn resolve_config(base: ShardingConfig, args: &LoadArgs) -> Result<ShardingConfig> {
    let mut config = base;
    if let Some(shards) = args.shards {
        config.shard_count = shards;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = Some(concurrency);
    }
    if let Some(deadline_ms) = args.deadline_ms {
        config.deadline = Some(Duration::from_millis(deadline_ms));
    }
    config.validate()?;
    Ok(config)
}

fn validate_fault(args: &LoadArgs, shard_count: u32) -> Result<()> {
    let Some(shard) = args.fail_shard else {
        return Ok(());
    };
    if args.backend != Backend::Memory {
        return Err(CliError::config("Fault injection is only available with the memory backend"));
    }
    if shard >= shard_count {
        return Err(CliError::config(format!(
            "--fail-shard {} is outside ds_0..ds_{}",
            shard,
            shard_count - 1
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Operation, OutputFormat};
    use shardline_core::ExecutionStatus;

    fn args() -> LoadArgs {
        LoadArgs {
            records: 1_000,
            shards: None,
            chunk_size: None,
            concurrency: None,
            deadline_ms: None,
            backend: Backend::Memory,
            operation: Operation::Insert,
            fail_shard: None,
            fail_chunk: None,
            format: OutputFormat::Table,
        }
    }

    #[test]
    fn test_flags_override_environment() {
        let args = LoadArgs {
            shards: Some(4),
            chunk_size: Some(25),
            deadline_ms: Some(2_000),
            ..args()
        };
        let config = resolve_config(ShardingConfig::default(), &args).unwrap();

        assert_eq!(config.shard_count, 4);
        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.effective_concurrency(), 4);
        assert_eq!(config.deadline, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_invalid_flags_are_usage_errors() {
        let args = LoadArgs {
            shards: Some(0),
            ..args()
        };
        let err = resolve_config(ShardingConfig::default(), &args).unwrap_err();
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn test_memory_load_commits_everything() {
        let config = ShardingConfig::default();
        let load = execute(&config, &args()).await.unwrap();

        assert!(load.report.is_complete());
        assert_eq!(load.report.total_committed(), 1_000);
        assert_eq!(load.report.results().len(), 2);
        assert!(load.pools.is_none());
        load.close().await;
    }

    #[tokio::test]
    async fn test_record_count_out_of_id_range() {
        let args = LoadArgs {
            records: u64::MAX,
            ..args()
        };
        let err = execute(&ShardingConfig::default(), &args).await.err().unwrap();
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn test_injected_fault_fails_one_shard() {
        let config = ShardingConfig::default();
        let args = LoadArgs {
            fail_shard: Some(1),
            fail_chunk: Some(1),
            ..args()
        };
        let report = execute(&config, &args).await.unwrap().report;

        let failed = report.result_for(ShardTarget::new(1)).unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.committed, 50);
        assert!(report.result_for(ShardTarget::new(0)).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_fault_shard_out_of_range() {
        let args = LoadArgs {
            fail_shard: Some(5),
            fail_chunk: Some(0),
            ..args()
        };
        let err = execute(&ShardingConfig::default(), &args).await.err().unwrap();
        assert!(err.is_usage());
    }
}
