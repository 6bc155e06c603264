//! Pagewright test utilities.
//!
//! Helpers for integration testing: in-memory databases, fixture scripts,
//! tracing setup and assertion utilities for rendered SQL and JSON rows.

use std::sync::Once;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

static TRACING: Once = Once::new();

/// Install a fmt subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Create an in-memory SQLite database.
///
/// A single connection keeps every query on the same database.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
}

/// Run a script of `;`-separated statements, in order.
pub async fn execute_script(pool: &SqlitePool, script: &str) -> Result<(), sqlx::Error> {
    for statement in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Create an in-memory database and run `script` against it.
pub async fn seeded_pool(script: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = memory_pool().await?;
    execute_script(&pool, script).await?;
    Ok(pool)
}

/// Assertion helpers for rendered SQL and JSON rows.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that `first` occurs before `second`.
    pub fn in_order(haystack: &str, first: &str, second: &str) {
        let a = haystack.find(first);
        let b = haystack.find(second);
        assert!(
            matches!((a, b), (Some(a), Some(b)) if a < b),
            "Expected '{first}' before '{second}'\nActual: {haystack}"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_runs_in_order() {
        let pool = seeded_pool(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO t (id, name) VALUES (1, 'a');
             INSERT INTO t (id, name) VALUES (2, 'b');",
        )
        .await
        .unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn sql_assertions() {
        assert::contains("SELECT a FROM b", "FROM b");
        assert::not_contains("SELECT a FROM b", "WHERE");
        assert::in_order("SELECT a FROM b ORDER BY a", "FROM", "ORDER BY");
        assert::has_key(&serde_json::json!({"a": 1}), "a");
    }
}
