//! Aggregated outcome of one coordinator run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::executor::{ExecutionResult, ExecutionStatus};
use crate::router::ShardTarget;

/// One result per submitted job, in submission order, plus wall-clock time
#[derive(Debug)]
pub struct RunReport {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    results: Vec<ExecutionResult>,
    elapsed: Duration,
}

impl RunReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        results: Vec<ExecutionResult>,
        elapsed: Duration,
    ) -> Self {
        Self {
            run_id,
            started_at,
            results,
            elapsed,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ExecutionResult> {
        self.results
    }

    /// Total wall-clock time of the run
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn result_for(&self, target: ShardTarget) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.target == target)
    }

    pub fn total_committed(&self) -> usize {
        self.results.iter().map(|r| r.committed).sum()
    }

    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// True when every job succeeded
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(ExecutionResult::is_success)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            elapsed_ms: self.elapsed.as_millis() as u64,
            total_committed: self.total_committed(),
            succeeded: self.count(ExecutionStatus::Success),
            failed: self.count(ExecutionStatus::Failed),
            timed_out: self.count(ExecutionStatus::Timeout),
            complete: self.is_complete(),
            shards: self.results.iter().map(ShardSummary::from).collect(),
        }
    }
}

/// Serializable view of a [`RunReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub total_committed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub complete: bool,
    pub shards: Vec<ShardSummary>,
}

/// Per-shard row of a [`RunSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSummary {
    pub target: ShardTarget,
    pub status: ExecutionStatus,
    pub committed: usize,
    pub chunks: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ExecutionResult> for ShardSummary {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            target: result.target,
            status: result.status,
            committed: result.committed,
            chunks: result.chunks_committed,
            elapsed_ms: result.elapsed.as_millis() as u64,
            error: result.error.as_ref().map(|e| e.describe()),
        }
    }
}
