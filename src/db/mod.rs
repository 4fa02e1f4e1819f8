//! Database execution targets.
//!
//! Each endpoint executes against an [`ExecutionTarget`]. The SQLite target
//! uses an SQLx pool; statement text reaches the driver unchanged apart from
//! named placeholders, and parameters are always bound by the driver.

mod params;
mod rows;

pub use params::{Bindings, QueryParams, resolve_bindings};

use crate::policy::{Access, ResponseShape};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
///
/// `Query` carries the driver's own message; it is returned to the caller
/// as-is.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to open database {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("{0}")]
    Query(String),
    #[error("missing value for parameter '{0}'")]
    MissingParameter(String),
    #[error("cannot mix positional '?' placeholders with named parameters")]
    MixedParameters,
    #[error("only one statement is allowed without API key")]
    MultipleStatements,
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => DbError::Query(db.message().to_string()),
            other => DbError::Query(other.to_string()),
        }
    }
}

/// What running a statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Rows(Vec<Map<String, Value>>),
    Write {
        /// Only looked up for [`ResponseShape::StatusMessageWithInsertId`].
        last_insert_id: Option<i64>,
    },
}

/// Somewhere statements run.
///
/// Implementations must run a [`ResponseShape::StatusMessageWithInsertId`]
/// statement and its identity lookup on one connection, with no other
/// statement in between, and must make an [`Access::ReadOnly`] statement
/// fail rather than change anything.
#[async_trait]
pub trait ExecutionTarget: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn execute(
        &self,
        query: &str,
        params: Option<&QueryParams>,
        shape: ResponseShape,
        access: Access,
    ) -> Result<ExecutionOutcome, DbError>;
}

/// A pooled SQLite database.
#[derive(Clone)]
pub struct SqliteTarget {
    name: String,
    pool: SqlitePool,
}

impl SqliteTarget {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open `path`, creating the file if needed. `:memory:` opens a private
    /// in-memory database.
    pub async fn connect(path: &str) -> Result<Self, DbError> {
        let connect_err = |source| DbError::Connect {
            path: path.to_string(),
            source,
        };

        let pool = if path == ":memory:" {
            // Shared cache keeps every pooled connection on the same database;
            // the unique name keeps separate targets apart.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:sqlgate-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(None)
                .max_lifetime(None)
                .min_connections(1)
                .connect_with(options)
                .await
                .map_err(connect_err)?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await
                .map_err(connect_err)?
        };

        info!(path = %path, "Database connected");

        Ok(Self {
            name: path.to_string(),
            pool,
        })
    }
}

#[async_trait]
impl ExecutionTarget for SqliteTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        query: &str,
        params: Option<&QueryParams>,
        shape: ResponseShape,
        access: Access,
    ) -> Result<ExecutionOutcome, DbError> {
        let bindings = resolve_bindings(query, params)?;
        if access == Access::ReadOnly && bindings.multiple_statements {
            return Err(DbError::MultipleStatements);
        }

        let mut statement = sqlx::query(&bindings.sql);
        for value in &bindings.values {
            statement = rows::bind_value(statement, value);
        }

        // One connection for the whole exchange: last_insert_rowid() is
        // per-connection state.
        let mut conn = self.pool.acquire().await?;

        // Set on every acquire: the flag is per connection and outlives the
        // request, and `EXPLAIN PRAGMA` flips it while preparing.
        let pragma = match access {
            Access::ReadOnly => "PRAGMA query_only = ON",
            Access::ReadWrite => "PRAGMA query_only = OFF",
        };
        sqlx::query(pragma).execute(&mut *conn).await?;

        match shape {
            ResponseShape::RowSet => {
                let fetched = statement.fetch_all(&mut *conn).await?;
                let rows = fetched
                    .iter()
                    .map(rows::row_to_json)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ExecutionOutcome::Rows(rows))
            }
            ResponseShape::StatusMessage => {
                statement.execute(&mut *conn).await?;
                Ok(ExecutionOutcome::Write { last_insert_id: None })
            }
            ResponseShape::StatusMessageWithInsertId => {
                statement.execute(&mut *conn).await?;
                let last_insert_id: i64 = sqlx::query_scalar("SELECT last_insert_rowid()")
                    .fetch_one(&mut *conn)
                    .await?;
                Ok(ExecutionOutcome::Write {
                    last_insert_id: Some(last_insert_id).filter(|id| *id != 0),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(
        target: &SqliteTarget,
        query: &str,
        shape: ResponseShape,
    ) -> Result<ExecutionOutcome, DbError> {
        target.execute(query, None, shape, Access::ReadWrite).await
    }

    async fn rows(target: &SqliteTarget, query: &str) -> Vec<Map<String, Value>> {
        match run(target, query, ResponseShape::RowSet).await.unwrap() {
            ExecutionOutcome::Rows(rows) => rows,
            other => panic!("expected rows, got {other:?}"),
        }
    }

    async fn seeded() -> SqliteTarget {
        let target = SqliteTarget::connect(":memory:").await.unwrap();
        run(
            &target,
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL, data BLOB)",
            ResponseShape::StatusMessage,
        )
        .await
        .unwrap();
        target
    }

    #[tokio::test]
    async fn insert_reports_identity_from_same_connection() {
        let target = seeded().await;
        for expected in 1..=3 {
            let outcome = run(
                &target,
                "INSERT INTO items (name) VALUES ('widget')",
                ResponseShape::StatusMessageWithInsertId,
            )
            .await
            .unwrap();
            assert_eq!(
                outcome,
                ExecutionOutcome::Write {
                    last_insert_id: Some(expected),
                }
            );
        }
    }

    #[tokio::test]
    async fn zero_identity_is_not_reported() {
        let target = seeded().await;
        run(
            &target,
            "CREATE TABLE tags (name TEXT PRIMARY KEY) WITHOUT ROWID",
            ResponseShape::StatusMessage,
        )
        .await
        .unwrap();

        // Nothing inserted yet on this connection, so the identity is 0.
        for query in [
            "INSERT INTO items (name) SELECT 'x' WHERE 0",
            "INSERT INTO tags (name) VALUES ('red')",
            "INSERT OR IGNORE INTO tags (name) VALUES ('red')",
        ] {
            let outcome = run(&target, query, ResponseShape::StatusMessageWithInsertId)
                .await
                .unwrap();
            assert_eq!(outcome, ExecutionOutcome::Write { last_insert_id: None }, "{query}");
        }
    }

    #[tokio::test]
    async fn rows_keep_column_order_and_types() {
        let target = seeded().await;
        run(
            &target,
            "INSERT INTO items (name, price, data) VALUES ('a', 1.5, x'0102')",
            ResponseShape::StatusMessageWithInsertId,
        )
        .await
        .unwrap();

        let rows = rows(
            &target,
            "SELECT name, id, price, data, NULL AS nothing, 1 + 1 AS two FROM items",
        )
        .await;
        assert_eq!(rows.len(), 1);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ["name", "id", "price", "data", "nothing", "two"]);
        assert_eq!(rows[0]["name"], json!("a"));
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["price"], json!(1.5));
        assert_eq!(rows[0]["data"], json!("AQI="));
        assert_eq!(rows[0]["nothing"], Value::Null);
        assert_eq!(rows[0]["two"], json!(2));
    }

    #[tokio::test]
    async fn named_and_positional_parameters_bind() {
        let target = seeded().await;
        let named: QueryParams =
            serde_json::from_value(json!({"price": 2.25, "name": "gadget"})).unwrap();
        target
            .execute(
                "INSERT INTO items (name, price) VALUES (:name, :price)",
                Some(&named),
                ResponseShape::StatusMessageWithInsertId,
                Access::ReadWrite,
            )
            .await
            .unwrap();

        let positional: QueryParams = serde_json::from_value(json!(["gadget"])).unwrap();
        let outcome = target
            .execute(
                "SELECT price FROM items WHERE name = ?",
                Some(&positional),
                ResponseShape::RowSet,
                Access::ReadOnly,
            )
            .await
            .unwrap();
        let ExecutionOutcome::Rows(rows) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(rows[0]["price"], json!(2.25));
    }

    #[tokio::test]
    async fn update_reports_no_identity() {
        let target = seeded().await;
        for _ in 0..2 {
            run(
                &target,
                "INSERT INTO items (name) VALUES ('x')",
                ResponseShape::StatusMessageWithInsertId,
            )
            .await
            .unwrap();
        }
        let outcome = run(&target, "UPDATE items SET price = 3", ResponseShape::StatusMessage)
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Write { last_insert_id: None });
        assert_eq!(
            rows(&target, "SELECT count(*) AS n FROM items WHERE price = 3").await[0]["n"],
            json!(2)
        );
    }

    const CTE_INSERT: &str = "WITH c AS (SELECT 'sneaky') INSERT INTO items (name) SELECT * FROM c";

    #[tokio::test]
    async fn read_only_access_cannot_write() {
        let target = seeded().await;
        let read_only = |query: &'static str| {
            let target = target.clone();
            async move {
                target
                    .execute(query, None, ResponseShape::RowSet, Access::ReadOnly)
                    .await
            }
        };

        let err = read_only("SELECT 1; INSERT INTO items (name) VALUES ('sneaky')")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MultipleStatements));

        let err = read_only(CTE_INSERT).await.unwrap_err();
        assert!(matches!(err, DbError::Query(ref msg) if msg.contains("readonly")), "{err}");

        // Flipping the flag while preparing does not carry into the next request.
        read_only("EXPLAIN PRAGMA query_only = OFF").await.unwrap();
        let err = read_only(CTE_INSERT).await.unwrap_err();
        assert!(matches!(err, DbError::Query(_)));

        assert_eq!(rows(&target, "SELECT count(*) AS n FROM items").await[0]["n"], json!(0));
        let ExecutionOutcome::Rows(rows) = read_only("SELECT 1 AS one;").await.unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows[0]["one"], json!(1));
    }

    #[tokio::test]
    async fn read_write_access_is_restored_after_read_only() {
        let target = seeded().await;
        target
            .execute("SELECT 1", None, ResponseShape::RowSet, Access::ReadOnly)
            .await
            .unwrap();
        run(
            &target,
            "WITH c AS (SELECT 'ok') INSERT INTO items (name) SELECT * FROM c",
            ResponseShape::RowSet,
        )
        .await
        .unwrap();
        assert_eq!(rows(&target, "SELECT name FROM items").await[0]["name"], json!("ok"));
    }

    #[tokio::test]
    async fn driver_errors_carry_the_driver_message() {
        let target = seeded().await;
        let err = run(&target, "SELECT * FROM missing_table", ResponseShape::RowSet)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Query(ref msg) if msg.contains("no such table")));
    }

    #[tokio::test]
    async fn memory_targets_are_isolated() {
        let a = seeded().await;
        let b = SqliteTarget::connect(":memory:").await.unwrap();
        assert!(a.name() == ":memory:" && b.name() == ":memory:");
        let err = run(&b, "SELECT * FROM items", ResponseShape::RowSet)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Query(_)));
    }

    #[tokio::test]
    async fn file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gate.db");
        let target = SqliteTarget::connect(path.to_str().unwrap()).await.unwrap();
        assert_eq!(rows(&target, "SELECT 1 AS one").await[0]["one"], json!(1));
        assert!(path.exists());
    }
}
