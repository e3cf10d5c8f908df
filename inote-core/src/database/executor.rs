//! Retrying statement executor
//!
//! The only way repositories reach the store. Every statement runs on a
//! handle from the [`ConnectionManager`]; when it fails with a recoverable
//! error the handle is invalidated (and the store rebuilt for corruption),
//! then the statement is retried exactly once on a fresh handle.

use crate::database::connection::ConnectionManager;
use crate::error::{Result, StoreErrorKind};
use chrono::{DateTime, Utc};
use sqlx::query::{Query, QueryAs};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Sqlite, SqlitePool};
use std::future::Future;
use std::sync::Arc;

/// An owned statement parameter, re-bindable for the retry
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Outcome of a write statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub changes: u64,
    pub insert_id: i64,
}

fn bind_query<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Real(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Bool(v) => query.bind(*v),
            Value::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

fn bind_query_as<'q, T>(
    mut query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
    params: &'q [Value],
) -> QueryAs<'q, Sqlite, T, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Real(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Bool(v) => query.bind(*v),
            Value::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

/// Retry-wrapped command/query interface shared by all repositories
#[derive(Clone)]
pub struct Database {
    manager: Arc<ConnectionManager>,
}

impl Database {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Run a write statement
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.with_retry(|pool| async move {
            let result = bind_query(sqlx::query(sql), params).execute(&pool).await?;
            Ok(ExecResult {
                changes: result.rows_affected(),
                insert_id: result.last_insert_rowid(),
            })
        })
        .await
    }

    /// Run a read statement and map every row
    pub async fn query<T>(&self, sql: &str, params: &[Value]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.with_retry(|pool| async move {
            let rows = bind_query_as(sqlx::query_as::<_, T>(sql), params)
                .fetch_all(&pool)
                .await?;
            Ok(rows)
        })
        .await
    }

    /// Run a read statement expected to return at most one row
    pub async fn query_optional<T>(&self, sql: &str, params: &[Value]) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.with_retry(|pool| async move {
            let row = bind_query_as(sqlx::query_as::<_, T>(sql), params)
                .fetch_optional(&pool)
                .await?;
            Ok(row)
        })
        .await
    }

    /// Run a read statement returning a single value
    pub async fn query_scalar<T>(&self, sql: &str, params: &[Value]) -> Result<T>
    where
        (T,): for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.with_retry(|pool| async move {
            let (value,) = bind_query_as(sqlx::query_as::<_, (T,)>(sql), params)
                .fetch_one(&pool)
                .await?;
            Ok(value)
        })
        .await
    }

    /// Run `op` against a live handle, recovering and retrying once on a
    /// recoverable failure. Errors from the retry are returned as-is.
    pub async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failed_generation = None;

        let first = match self.manager.acquire().await {
            Ok(handle) => {
                failed_generation = Some(handle.generation());
                op(handle.pool().clone()).await
            }
            Err(e) => Err(e),
        };

        let err = match first {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let kind = err.store_kind();
        if !kind.is_recoverable() {
            return Err(err);
        }

        tracing::warn!(
            "Database error detected during operation ({:?}), retrying: {}",
            kind,
            err
        );

        if let Some(generation) = failed_generation {
            self.manager.invalidate(generation).await;
        }

        if kind == StoreErrorKind::Corruption {
            self.manager.recover(failed_generation).await?;
        }

        let handle = self.manager.acquire().await?;
        op(handle.pool().clone()).await
    }
}
