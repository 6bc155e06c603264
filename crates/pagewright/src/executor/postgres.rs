use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{QueryExecutor, bind_values, database_url};
use crate::config::Config;
use crate::query::{Backend, QueryPlan};

/// Default per-page statement timeout.
const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL executor.
///
/// Each page runs in its own transaction so `SET LOCAL statement_timeout`
/// covers the data and count queries and resets on commit.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
    statement_timeout_secs: u64,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout_secs: DEFAULT_STATEMENT_TIMEOUT_SECS,
        }
    }

    /// Executor over `pool` with the configured statement timeout.
    pub fn from_config(pool: PgPool, config: &Config) -> Self {
        Self::new(pool).with_statement_timeout(config.statement_timeout_secs)
    }

    /// Connect to the configured database URL.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .connect(database_url(config)?)
            .await
            .context("failed to connect to PostgreSQL")?;
        Ok(Self::from_config(pool, config))
    }

    pub fn with_statement_timeout(mut self, secs: u64) -> Self {
        self.statement_timeout_secs = secs;
        self
    }

    pub fn statement_timeout_secs(&self) -> u64 {
        self.statement_timeout_secs
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}s'",
            self.statement_timeout_secs
        ))
        .execute(&mut *tx)
        .await
        .context("failed to set statement timeout")?;

        Ok(tx)
    }
}

async fn rows(tx: &mut sqlx::PgConnection, plan: &QueryPlan) -> Result<Vec<serde_json::Value>> {
    let (sql, values) = plan.to_sql(Backend::Postgres);
    let sql = format!("SELECT row_to_json(t) FROM ({sql}) t");
    tracing::debug!(sql = %sql, "executing data query");
    let query = bind_values!(sqlx::query_scalar::<_, serde_json::Value>(&sql), values);
    query
        .fetch_all(tx)
        .await
        .context("failed to execute data query")
}

async fn count(tx: &mut sqlx::PgConnection, plan: &QueryPlan) -> Result<i64> {
    let (sql, values) = plan.to_sql(Backend::Postgres);
    tracing::debug!(sql = %sql, "executing count query");
    let query = bind_values!(sqlx::query_scalar::<_, i64>(&sql), values);
    query
        .fetch_one(tx)
        .await
        .context("failed to execute count query")
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn fetch_rows(&self, plan: &QueryPlan) -> Result<Vec<serde_json::Value>> {
        let mut tx = self.begin().await?;
        let rows = rows(&mut tx, plan).await?;
        tx.commit()
            .await
            .context("failed to commit query transaction")?;
        Ok(rows)
    }

    async fn fetch_count(&self, plan: &QueryPlan) -> Result<i64> {
        let mut tx = self.begin().await?;
        let total = count(&mut tx, plan).await?;
        tx.commit()
            .await
            .context("failed to commit query transaction")?;
        Ok(total)
    }

    async fn fetch_page(
        &self,
        data: &QueryPlan,
        count_plan: Option<&QueryPlan>,
    ) -> Result<(Vec<serde_json::Value>, Option<i64>)> {
        let mut tx = self.begin().await?;
        let total = match count_plan {
            Some(plan) => Some(count(&mut tx, plan).await?),
            None => None,
        };
        let rows = rows(&mut tx, data).await?;
        tx.commit()
            .await
            .context("failed to commit query transaction")?;
        Ok((rows, total))
    }
}
