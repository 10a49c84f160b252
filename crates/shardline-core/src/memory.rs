//! In-memory [`DmlSink`] for dry runs and tests
//!
//! Submitted chunks are staged in the scope and only become visible on
//! commit. Faults, panics and per-shard latency can be injected to exercise
//! the executor and coordinator without a database.

use anyhow::bail;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::router::ShardTarget;
use crate::sink::DmlSink;

/// Counters observed by a [`MemorySink`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySinkStats {
    pub scopes_begun: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Most scopes that were open at the same time
    pub peak_open_scopes: usize,
}

#[derive(Debug, Default)]
struct ScopeCounters {
    begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    open: AtomicUsize,
    peak_open: AtomicUsize,
}

/// Decrements the open-scope gauge however the scope ends
#[derive(Debug)]
struct OpenScope {
    counters: Arc<ScopeCounters>,
}

impl OpenScope {
    fn new(counters: Arc<ScopeCounters>) -> Self {
        counters.begun.fetch_add(1, Ordering::SeqCst);
        let open = counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_open.fetch_max(open, Ordering::SeqCst);
        Self { counters }
    }
}

impl Drop for OpenScope {
    fn drop(&mut self) {
        self.counters.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scope of a [`MemorySink`]: records staged for one shard
#[derive(Debug)]
pub struct MemoryScope<R> {
    target: ShardTarget,
    staged: Vec<R>,
    _open: OpenScope,
}

impl<R> MemoryScope<R> {
    pub fn target(&self) -> ShardTarget {
        self.target
    }

    pub fn staged(&self) -> &[R] {
        &self.staged
    }
}

/// Stores committed records per shard in memory
#[derive(Debug)]
pub struct MemorySink<R> {
    committed: Mutex<HashMap<ShardTarget, Vec<R>>>,
    submits: Mutex<HashMap<ShardTarget, usize>>,
    failures: HashMap<ShardTarget, HashSet<usize>>,
    panics: HashMap<ShardTarget, HashSet<usize>>,
    latency: HashMap<ShardTarget, Duration>,
    default_latency: Option<Duration>,
    counters: Arc<ScopeCounters>,
}

impl<R> Default for MemorySink<R> {
    fn default() -> Self {
        Self {
            committed: Mutex::new(HashMap::new()),
            submits: Mutex::new(HashMap::new()),
            failures: HashMap::new(),
            panics: HashMap::new(),
            latency: HashMap::new(),
            default_latency: None,
            counters: Arc::new(ScopeCounters::default()),
        }
    }
}

impl<R: Clone> MemorySink<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `nth` submit (0-based) made against `target`
    pub fn fail_on_submit(mut self, target: ShardTarget, nth: usize) -> Self {
        self.failures.entry(target).or_default().insert(nth);
        self
    }

    /// Panic inside the `nth` submit (0-based) made against `target`
    pub fn panic_on_submit(mut self, target: ShardTarget, nth: usize) -> Self {
        self.panics.entry(target).or_default().insert(nth);
        self
    }

    /// Sleep for `delay` before each submit against `target`
    pub fn with_latency(mut self, target: ShardTarget, delay: Duration) -> Self {
        self.latency.insert(target, delay);
        self
    }

    /// Sleep for `delay` before submits against shards without their own latency
    pub fn with_default_latency(mut self, delay: Duration) -> Self {
        self.default_latency = Some(delay);
        self
    }

    /// Snapshot of the records committed to `target`, in commit order
    pub fn committed(&self, target: ShardTarget) -> Vec<R> {
        self.committed_map().get(&target).cloned().unwrap_or_default()
    }

    pub fn committed_len(&self, target: ShardTarget) -> usize {
        self.committed_map().get(&target).map_or(0, Vec::len)
    }

    pub fn total_committed(&self) -> usize {
        self.committed_map().values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> MemorySinkStats {
        MemorySinkStats {
            scopes_begun: self.counters.begun.load(Ordering::SeqCst),
            commits: self.counters.commits.load(Ordering::SeqCst),
            rollbacks: self.counters.rollbacks.load(Ordering::SeqCst),
            peak_open_scopes: self.counters.peak_open.load(Ordering::SeqCst),
        }
    }

    fn committed_map(&self) -> std::sync::MutexGuard<'_, HashMap<ShardTarget, Vec<R>>> {
        self.committed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_submit(&self, target: ShardTarget) -> usize {
        let mut submits = self.submits.lock().unwrap_or_else(|e| e.into_inner());
        let counter = submits.entry(target).or_insert(0);
        let nth = *counter;
        *counter += 1;
        nth
    }
}

#[async_trait]
impl<R> DmlSink for MemorySink<R>
where
    R: Clone + Send + Sync,
{
    type Record = R;
    type Scope = MemoryScope<R>;

    fn name(&self) -> &str {
        "memory"
    }

    async fn begin_scope(&self, target: ShardTarget) -> anyhow::Result<Self::Scope> {
        Ok(MemoryScope {
            target,
            staged: Vec::new(),
            _open: OpenScope::new(Arc::clone(&self.counters)),
        })
    }

    async fn submit_batch(&self, scope: &mut Self::Scope, chunk: &[R]) -> anyhow::Result<()> {
        let target = scope.target;
        let nth = self.next_submit(target);

        if let Some(delay) = self.latency.get(&target).copied().or(self.default_latency) {
            tokio::time::sleep(delay).await;
        }
        if self.panics.get(&target).is_some_and(|p| p.contains(&nth)) {
            panic!("injected panic on submit {} for {}", nth, target);
        }
        if self.failures.get(&target).is_some_and(|f| f.contains(&nth)) {
            bail!("injected failure on submit {} for {}", nth, target);
        }

        scope.staged.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(&self, scope: Self::Scope) -> anyhow::Result<()> {
        let MemoryScope { target, staged, .. } = scope;
        self.committed_map().entry(target).or_default().extend(staged);
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, scope: Self::Scope) -> anyhow::Result<()> {
        drop(scope);
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
