//! Postgres backend: one pool per shard, one transaction per chunk
//!
//! Statements target `t_user (id, username, email)` on every shard. Creating
//! that table is left to the operator.

use anyhow::{bail, Context};
use async_trait::async_trait;
use shardline_core::{DmlSink, ShardTarget};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::records::UserRecord;
use crate::Operation;

/// Postgres accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

const INSERT_COLUMNS: usize = 3;

/// Open transaction on one shard
pub struct PgScope {
    target: ShardTarget,
    tx: Transaction<'static, Postgres>,
}

/// [`DmlSink`] that applies one DML operation to sharded Postgres databases
pub struct PostgresSink {
    pools: Vec<PgPool>,
    operation: Operation,
}

impl PostgresSink {
    pub fn new(pools: Vec<PgPool>, operation: Operation) -> Self {
        Self { pools, operation }
    }

    /// Connect one pool per configured shard URL
    pub async fn connect(config: &DatabaseConfig, operation: Operation) -> Result<Self> {
        let mut pools = Vec::with_capacity(config.shard_urls.len());
        for (ordinal, url) in config.shard_urls.iter().enumerate() {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
                .connect(url)
                .await?;
            info!(shard = %ShardTarget::new(ordinal as u32), "Connected shard pool");
            pools.push(pool);
        }
        Ok(Self::new(pools, operation))
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Close every pool, waiting for connections to be released
    pub async fn close(&self) {
        for pool in &self.pools {
            pool.close().await;
        }
    }

    fn pool(&self, target: ShardTarget) -> anyhow::Result<&PgPool> {
        self.pools
            .get(target.index())
            .with_context(|| format!("No connection pool configured for {}", target))
    }
}

/// Build the batched statement for `chunk`
///
/// Inserts use one multi-row `VALUES` list; updates and deletes match the
/// chunk's ids with `= ANY($1)`.
pub fn build_statement(operation: Operation, chunk: &[UserRecord]) -> QueryBuilder<'static, Postgres> {
    match operation {
        Operation::Insert => {
            let mut builder = QueryBuilder::new("INSERT INTO t_user (id, username, email) ");
            builder.push_values(chunk, |mut row, user| {
                row.push_bind(user.id)
                    .push_bind(user.username.clone())
                    .push_bind(user.email.clone());
            });
            builder
        }
        Operation::Update => {
            let mut builder =
                QueryBuilder::new("UPDATE t_user SET email = email || '_updated' WHERE id = ANY(");
            builder.push_bind(ids(chunk)).push(")");
            builder
        }
        Operation::Delete => {
            let mut builder = QueryBuilder::new("DELETE FROM t_user WHERE id = ANY(");
            builder.push_bind(ids(chunk)).push(")");
            builder
        }
    }
}

fn ids(chunk: &[UserRecord]) -> Vec<i64> {
    chunk.iter().map(|user| user.id).collect()
}

#[async_trait]
impl DmlSink for PostgresSink {
    type Record = UserRecord;
    type Scope = PgScope;

    fn name(&self) -> &str {
        "postgres"
    }

    async fn begin_scope(&self, target: ShardTarget) -> anyhow::Result<PgScope> {
        let tx = self
            .pool(target)?
            .begin()
            .await
            .with_context(|| format!("Failed to start transaction on {}", target))?;
        Ok(PgScope { target, tx })
    }

    async fn submit_batch(&self, scope: &mut PgScope, chunk: &[UserRecord]) -> anyhow::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if self.operation == Operation::Insert && chunk.len() * INSERT_COLUMNS > MAX_BIND_PARAMS {
            bail!(
                "Chunk of {} rows exceeds the {} bind parameter limit",
                chunk.len(),
                MAX_BIND_PARAMS
            );
        }

        let result = build_statement(self.operation, chunk)
            .build()
            .execute(&mut *scope.tx)
            .await
            .with_context(|| format!("Failed to {} batch on {}", self.operation, scope.target))?;

        debug!(
            shard = %scope.target,
            records = chunk.len(),
            rows_affected = result.rows_affected(),
            "Batch executed"
        );
        Ok(())
    }

    async fn commit(&self, scope: PgScope) -> anyhow::Result<()> {
        let target = scope.target;
        scope
            .tx
            .commit()
            .await
            .with_context(|| format!("Failed to commit transaction on {}", target))
    }

    async fn rollback(&self, scope: PgScope) -> anyhow::Result<()> {
        let target = scope.target;
        scope
            .tx
            .rollback()
            .await
            .with_context(|| format!("Failed to roll back transaction on {}", target))
    }
}
