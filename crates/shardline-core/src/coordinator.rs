//! Parallel dispatch of per-shard jobs
//!
//! Every job runs on its own task, gated by a semaphore so no more than
//! `concurrency` jobs execute at once. Results flow back over a channel and
//! are reassembled in submission order. A failed, panicking or late job only
//! affects its own entry in the [`RunReport`].

use chrono::Utc;
use futures::FutureExt;
use shardline_common::{Result, ShardlineError};
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::executor::{
    panic_message, BatchExecutor, BatchJob, ExecutionError, ExecutionResult, ExecutionStatus,
};
use crate::report::RunReport;
use crate::router::ShardTarget;
use crate::sink::DmlSink;

/// Worker pool bound and optional overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    concurrency: NonZeroUsize,
    deadline: Option<Duration>,
}

impl CoordinatorConfig {
    /// Fails with [`ShardlineError::InvalidConcurrency`] when `concurrency` is 0
    pub fn new(concurrency: usize) -> Result<Self> {
        let concurrency = NonZeroUsize::new(concurrency.min(Semaphore::MAX_PERMITS))
            .ok_or(ShardlineError::InvalidConcurrency(0))?;
        Ok(Self {
            concurrency,
            deadline: None,
        })
    }

    /// Stop waiting for jobs once `deadline` has elapsed since the run started
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }
}

/// Fans per-shard jobs out to a bounded set of workers
pub struct ParallelShardCoordinator<S> {
    sink: Arc<S>,
    config: CoordinatorConfig,
}

impl<S> ParallelShardCoordinator<S>
where
    S: DmlSink + 'static,
    S::Record: 'static,
{
    pub fn new(sink: Arc<S>, config: CoordinatorConfig) -> Self {
        Self { sink, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Run every job and wait for all of them, or for the deadline
    ///
    /// The report has exactly one result per job, in the order the jobs were
    /// given. Jobs that did not report by the deadline are marked `Timeout`;
    /// the ones still waiting for a worker slot are never started, and the
    /// ones already running are left to finish with their result discarded.
    pub async fn run(&self, jobs: Vec<BatchJob<S::Record>>) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = self.config.deadline.map(|d| started + d);

        info!(
            %run_id,
            jobs = jobs.len(),
            records = jobs.iter().map(BatchJob::len).sum::<usize>(),
            concurrency = self.config.concurrency(),
            deadline_ms = self.config.deadline.map(|d| d.as_millis() as u64),
            sink = self.sink.name(),
            "Starting shard run"
        );

        if jobs.is_empty() {
            return RunReport::new(run_id, started_at, Vec::new(), started.elapsed());
        }

        let targets: Vec<ShardTarget> = jobs.iter().map(BatchJob::target).collect();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency()));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ExecutionResult)>();

        for (index, job) in jobs.into_iter().enumerate() {
            let executor = BatchExecutor::new(Arc::clone(&self.sink));
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                let target = job.target();
                let job_started = Instant::now();
                // Sink panics are reported by the executor with their progress.
                // This only catches panics outside a chunk.
                let result = match AssertUnwindSafe(executor.run(&job)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(shard = %target, panic = %message, "Worker panicked");
                        ExecutionResult::failed(
                            target,
                            0,
                            0,
                            job_started.elapsed(),
                            ExecutionError::WorkerPanicked(message),
                        )
                    }
                };

                // The receiver is gone once the deadline passed.
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let mut slots: Vec<Option<ExecutionResult>> = targets.iter().map(|_| None).collect();
        let mut pending = slots.len();
        let mut deadline_hit = false;

        while pending > 0 {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(%run_id, pending, "Deadline elapsed, abandoning unfinished jobs");
                        deadline_hit = true;
                        break;
                    }
                },
                None => rx.recv().await,
            };

            let Some((index, result)) = next else {
                break;
            };
            if let Some(slot) = slots.get_mut(index) {
                if slot.replace(result).is_none() {
                    pending -= 1;
                }
            }
        }
        cancel.cancel();

        let elapsed = started.elapsed();
        let results: Vec<ExecutionResult> = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| match slot {
                Some(result) => result,
                None if deadline_hit => ExecutionResult::timed_out(target, elapsed),
                None => ExecutionResult::failed(
                    target,
                    0,
                    0,
                    elapsed,
                    ExecutionError::WorkerLost,
                ),
            })
            .collect();

        let report = RunReport::new(run_id, started_at, results, elapsed);
        info!(
            %run_id,
            committed = report.total_committed(),
            succeeded = report.count(ExecutionStatus::Success),
            failed = report.count(ExecutionStatus::Failed),
            timed_out = report.count(ExecutionStatus::Timeout),
            elapsed_ms = elapsed.as_millis() as u64,
            "Shard run finished"
        );
        report
    }
}
