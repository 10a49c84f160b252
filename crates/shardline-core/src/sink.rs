//! Storage-facing capability used by the batch executor
//!
//! A sink adapts one storage backend. The executor opens a scope per chunk,
//! submits the chunk through it, then commits or rolls it back.

use anyhow::Result;
use async_trait::async_trait;

use crate::router::ShardTarget;

/// Transactional batch writer for a sharded backend
///
/// Implementations must be safe to share between workers. Every scope is
/// owned by exactly one worker and is consumed by `commit` or `rollback`, so
/// a backend releases its resources when the scope value is dropped.
#[async_trait]
pub trait DmlSink: Send + Sync {
    /// Opaque operation submitted in batches (a row, a document, a statement)
    type Record: Send + Sync;

    /// Transactional handle bound to one shard
    type Scope: Send;

    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Open a transactional scope on `target`
    async fn begin_scope(&self, target: ShardTarget) -> Result<Self::Scope>;

    /// Apply one chunk inside `scope` as a single batched operation
    async fn submit_batch(&self, scope: &mut Self::Scope, chunk: &[Self::Record]) -> Result<()>;

    async fn commit(&self, scope: Self::Scope) -> Result<()>;

    async fn rollback(&self, scope: Self::Scope) -> Result<()>;
}
