//! Query execution.
//!
//! Executors run built plans and hand rows back as JSON objects keyed by
//! output column name. Failures are reported as `anyhow` errors with context;
//! the page service wraps them in `EngineError::Execution`.

mod postgres;
mod sqlite;

use anyhow::Context;
use async_trait::async_trait;

use crate::config::Config;
use crate::query::{Backend, QueryPlan};

pub use postgres::PgExecutor;
pub use sqlite::SqliteExecutor;

/// Runs data and count plans against a database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Backend the plans must be rendered for.
    fn backend(&self) -> Backend;

    /// Run a data plan, returning one JSON object per row.
    async fn fetch_rows(&self, plan: &QueryPlan) -> anyhow::Result<Vec<serde_json::Value>>;

    /// Run a count plan.
    async fn fetch_count(&self, plan: &QueryPlan) -> anyhow::Result<i64>;

    /// Run the data plan and, when present, the count plan.
    async fn fetch_page(
        &self,
        data: &QueryPlan,
        count: Option<&QueryPlan>,
    ) -> anyhow::Result<(Vec<serde_json::Value>, Option<i64>)> {
        let rows = self.fetch_rows(data).await?;
        let total = match count {
            Some(plan) => Some(self.fetch_count(plan).await?),
            None => None,
        };
        Ok((rows, total))
    }
}

fn database_url(config: &Config) -> anyhow::Result<&str> {
    config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to connect")
}

/// Bind rendered sea-query values onto an sqlx query, in placeholder order.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values.0 {
            query = match value {
                sea_query::Value::Bool(v) => query.bind(v),
                sea_query::Value::TinyInt(v) => query.bind(v.map(i16::from)),
                sea_query::Value::SmallInt(v) => query.bind(v),
                sea_query::Value::Int(v) => query.bind(v),
                sea_query::Value::BigInt(v) => query.bind(v),
                sea_query::Value::TinyUnsigned(v) => query.bind(v.map(i16::from)),
                sea_query::Value::SmallUnsigned(v) => query.bind(v.map(i32::from)),
                sea_query::Value::Unsigned(v) => query.bind(v.map(i64::from)),
                sea_query::Value::BigUnsigned(v) => {
                    query.bind(v.map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
                }
                sea_query::Value::Float(v) => query.bind(v),
                sea_query::Value::Double(v) => query.bind(v),
                sea_query::Value::String(v) => query.bind(v.map(|s| *s)),
                sea_query::Value::Char(v) => query.bind(v.map(|c| c.to_string())),
                other => anyhow::bail!("unsupported parameter value: {other:?}"),
            };
        }
        query
    }};
}

pub(crate) use bind_values;
