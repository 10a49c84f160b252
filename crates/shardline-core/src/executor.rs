//! Chunked, transactional execution of one shard's records
//!
//! Each chunk gets its own scope: begin, submit, commit. The first failing
//! chunk is rolled back and ends the job. Chunks committed before it stay
//! committed, and so do they when the sink panics mid-chunk.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use shardline_common::{Result, ShardlineError};
use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::router::ShardTarget;
use crate::sink::DmlSink;

/// Records bound for one shard, executed in chunks of `chunk_size`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob<R> {
    target: ShardTarget,
    records: Vec<R>,
    chunk_size: NonZeroUsize,
}

impl<R> BatchJob<R> {
    /// Fails with [`ShardlineError::InvalidChunkSize`] when `chunk_size` is 0
    pub fn new(target: ShardTarget, records: Vec<R>, chunk_size: usize) -> Result<Self> {
        let chunk_size =
            NonZeroUsize::new(chunk_size).ok_or(ShardlineError::InvalidChunkSize(0))?;
        Ok(Self {
            target,
            records,
            chunk_size,
        })
    }

    pub fn target(&self) -> ShardTarget {
        self.target
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `ceil(len / chunk_size)`
    pub fn chunk_count(&self) -> usize {
        self.records.len().div_ceil(self.chunk_size.get())
    }

    pub fn chunks(&self) -> std::slice::Chunks<'_, R> {
        self.records.chunks(self.chunk_size.get())
    }
}

/// Final state of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step of a chunk that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkPhase {
    Begin,
    Submit,
    Commit,
}

impl fmt::Display for ChunkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            ChunkPhase::Begin => "begin",
            ChunkPhase::Submit => "submit",
            ChunkPhase::Commit => "commit",
        };
        f.write_str(phase)
    }
}

/// Why a job did not succeed
///
/// These travel inside [`ExecutionResult`] as data. Nothing here is raised
/// across the coordinator.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Chunk {chunk} failed during {phase}")]
    ChunkExecutionFailure {
        chunk: usize,
        phase: ChunkPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("Deadline elapsed before the job reported")]
    Timeout,

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Worker exited without reporting a result")]
    WorkerLost,
}

impl ExecutionError {
    /// Message with every cause in the chain, outermost first
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            text.push_str(": ");
            text.push_str(&err.to_string());
            cause = err.source();
        }
        text
    }

    /// Index of the failed chunk, when a chunk failed
    pub fn chunk(&self) -> Option<usize> {
        match self {
            ExecutionError::ChunkExecutionFailure { chunk, .. } => Some(*chunk),
            _ => None,
        }
    }
}

/// Outcome of one job
#[derive(Debug)]
pub struct ExecutionResult {
    pub target: ShardTarget,
    pub status: ExecutionStatus,
    /// Records in committed chunks
    pub committed: usize,
    pub chunks_committed: usize,
    pub elapsed: Duration,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    pub fn success(
        target: ShardTarget,
        committed: usize,
        chunks_committed: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            target,
            status: ExecutionStatus::Success,
            committed,
            chunks_committed,
            elapsed,
            error: None,
        }
    }

    pub fn failed(
        target: ShardTarget,
        committed: usize,
        chunks_committed: usize,
        elapsed: Duration,
        error: ExecutionError,
    ) -> Self {
        Self {
            target,
            status: ExecutionStatus::Failed,
            committed,
            chunks_committed,
            elapsed,
            error: Some(error),
        }
    }

    /// Job that did not report before the deadline. Progress it may have
    /// made is unknown, so nothing is counted as committed.
    pub fn timed_out(target: ShardTarget, elapsed: Duration) -> Self {
        Self {
            target,
            status: ExecutionStatus::Timeout,
            committed: 0,
            chunks_committed: 0,
            elapsed,
            error: Some(ExecutionError::Timeout),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Drives a sink over one job, chunk by chunk
pub struct BatchExecutor<S> {
    sink: Arc<S>,
}

impl<S> Clone for BatchExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S: DmlSink> BatchExecutor<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Execute every chunk of `job` in order
    ///
    /// Never fails: chunk errors are reported through the returned result.
    /// A panic inside the sink ends the job as [`ExecutionError::WorkerPanicked`]
    /// with the chunks committed before it still counted. The panicking
    /// chunk's scope is dropped without an explicit rollback.
    #[instrument(skip_all, fields(shard = %job.target(), records = job.len()))]
    pub async fn run(&self, job: &BatchJob<S::Record>) -> ExecutionResult {
        let started = Instant::now();
        let target = job.target();
        let mut committed = 0;
        let mut chunks_committed = 0;

        for (chunk, records) in job.chunks().enumerate() {
            let outcome = AssertUnwindSafe(self.run_chunk(target, chunk, records))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(chunk, committed, panic = %message, "Sink panicked, stopping job");
                    Err(ExecutionError::WorkerPanicked(message))
                });

            match outcome {
                Ok(()) => {
                    committed += records.len();
                    chunks_committed += 1;
                    debug!(chunk, records = records.len(), committed, "Chunk committed");
                }
                Err(error @ ExecutionError::WorkerPanicked(_)) => {
                    return ExecutionResult::failed(
                        target,
                        committed,
                        chunks_committed,
                        started.elapsed(),
                        error,
                    );
                }
                Err(error) => {
                    warn!(
                        chunk,
                        committed,
                        error = %error.describe(),
                        "Chunk failed, stopping job"
                    );
                    return ExecutionResult::failed(
                        target,
                        committed,
                        chunks_committed,
                        started.elapsed(),
                        error,
                    );
                }
            }
        }

        let elapsed = started.elapsed();
        info!(
            committed,
            chunks = chunks_committed,
            elapsed_ms = elapsed.as_millis() as u64,
            sink = self.sink.name(),
            "Job completed"
        );
        ExecutionResult::success(target, committed, chunks_committed, elapsed)
    }

    async fn run_chunk(
        &self,
        target: ShardTarget,
        chunk: usize,
        records: &[S::Record],
    ) -> std::result::Result<(), ExecutionError> {
        let failure = |phase, source| ExecutionError::ChunkExecutionFailure {
            chunk,
            phase,
            source,
        };

        let mut scope = self
            .sink
            .begin_scope(target)
            .await
            .map_err(|e| failure(ChunkPhase::Begin, e))?;

        if let Err(e) = self.sink.submit_batch(&mut scope, records).await {
            if let Err(rollback_err) = self.sink.rollback(scope).await {
                warn!(chunk, error = %rollback_err, "Rollback failed");
            }
            return Err(failure(ChunkPhase::Submit, e));
        }

        // A failed commit consumed the scope; the backend discards the work.
        self.sink
            .commit(scope)
            .await
            .map_err(|e| failure(ChunkPhase::Commit, e))
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
