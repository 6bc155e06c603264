use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::{QueryExecutor, bind_values, database_url};
use crate::config::Config;
use crate::query::{Backend, QueryPlan};

/// SQLite executor.
///
/// Rows are turned into JSON with `json_object` over the plan's output
/// columns. SQLite has no boolean type, so booleans come back as 0/1.
#[derive(Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database URL. SQLite has no statement
    /// timeout, so the configured one is not used.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .connect(database_url(config)?)
            .await
            .context("failed to connect to SQLite")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// `SELECT json_object('a', t."a", ...) FROM (sql) t`
fn json_rows_sql(plan: &QueryPlan, sql: &str) -> String {
    let fields = plan
        .columns()
        .iter()
        .map(|c| {
            format!(
                "'{}', t.\"{}\"",
                c.name.replace('\'', "''"),
                c.name.replace('"', "\"\"")
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT json_object({fields}) FROM ({sql}) t")
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn fetch_rows(&self, plan: &QueryPlan) -> Result<Vec<serde_json::Value>> {
        let (sql, values) = plan.to_sql(Backend::Sqlite);
        let sql = json_rows_sql(plan, &sql);
        tracing::debug!(sql = %sql, "executing data query");
        let query = bind_values!(sqlx::query_scalar::<_, serde_json::Value>(&sql), values);
        query
            .fetch_all(&self.pool)
            .await
            .context("failed to execute data query")
    }

    async fn fetch_count(&self, plan: &QueryPlan) -> Result<i64> {
        let (sql, values) = plan.to_sql(Backend::Sqlite);
        tracing::debug!(sql = %sql, "executing count query");
        let query = bind_values!(sqlx::query_scalar::<_, i64>(&sql), values);
        query
            .fetch_one(&self.pool)
            .await
            .context("failed to execute count query")
    }
}
