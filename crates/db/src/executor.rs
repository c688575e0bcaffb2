//! Timed query execution against Postgres.
//!
//! Implements the pipeline's `QueryExecutor` port. Every execution checks a
//! connection out of the bounded pool, applies a per-session statement
//! timeout, runs the single statement, resets the timeout, and lets the
//! checkout drop back to the pool on every exit path. Rows are rendered to
//! JSON objects keyed by column name so the composition pass can embed them
//! directly in its prompt.

use async_trait::async_trait;
use leadlens_agent::pipeline::{ExecuteError, QueryExecutor};
use leadlens_core::QueryResult;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use tracing::warn;

use crate::connection::DbPool;

/// Postgres SQLSTATE for a statement cancelled by `statement_timeout`.
const QUERY_CANCELED: &str = "57014";

pub struct PgQueryExecutor {
    pool: DbPool,
    statement_timeout_ms: u64,
}

impl PgQueryExecutor {
    pub fn new(pool: DbPool, statement_timeout_ms: u64) -> Self {
        Self { pool, statement_timeout_ms }
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult, ExecuteError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|err| ExecuteError::Acquire(err.to_string()))?;

        sqlx::query(&format!("SET statement_timeout = {}", self.statement_timeout_ms))
            .execute(&mut *conn)
            .await
            .map_err(|err| ExecuteError::Query(err.to_string()))?;

        let fetched = sqlx::query(sql).fetch_all(&mut *conn).await;

        // The timeout is session state on a pooled connection: reset it
        // before the checkout drops, on the success and the failure path.
        if let Err(err) = sqlx::query("SET statement_timeout = 0").execute(&mut *conn).await {
            warn!(
                event_name = "db.executor.timeout_reset_failed",
                error = %err,
                "failed to reset statement_timeout on pooled connection"
            );
        }

        let rows = fetched.map_err(map_query_error)?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let row_count = rows.len();
        let json_rows = rows.iter().map(row_to_json).collect();

        Ok(QueryResult { sql: sql.to_string(), columns, rows: json_rows, row_count })
    }
}

fn map_query_error(err: sqlx::Error) -> ExecuteError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(QUERY_CANCELED) {
            return ExecuteError::StatementTimeout;
        }
        return ExecuteError::Query(db_err.message().to_string());
    }
    ExecuteError::Query(err.to_string())
}

/// Decode one row into a JSON object keyed by column name. Chat queries are
/// ad hoc, so decoding is by runtime type name with a text fallback rather
/// than compile-time column types.
fn row_to_json(row: &PgRow) -> serde_json::Value {
    let mut object = serde_json::Map::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_info().name());
        object.insert(column.name().to_string(), value);
    }
    serde_json::Value::Object(object)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> serde_json::Value {
    use serde_json::Value;

    match type_name {
        "BOOL" => scalar(row.try_get::<Option<bool>, _>(index)),
        "INT2" => scalar(row.try_get::<Option<i16>, _>(index)),
        "INT4" => scalar(row.try_get::<Option<i32>, _>(index)),
        "INT8" => scalar(row.try_get::<Option<i64>, _>(index)),
        "FLOAT4" => scalar(row.try_get::<Option<f32>, _>(index)),
        "FLOAT8" => scalar(row.try_get::<Option<f64>, _>(index)),
        "NUMERIC" => match row.try_get::<Option<rust_decimal::Decimal>, _>(index) {
            Ok(Some(decimal)) => {
                serde_json::to_value(decimal).unwrap_or_else(|_| Value::String(decimal.to_string()))
            }
            Ok(None) => Value::Null,
            Err(_) => text_fallback(row, index),
        },
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            scalar(row.try_get::<Option<String>, _>(index))
        }
        "UUID" => match row.try_get::<Option<uuid::Uuid>, _>(index) {
            Ok(Some(id)) => Value::String(id.to_string()),
            Ok(None) => Value::Null,
            Err(_) => text_fallback(row, index),
        },
        "TIMESTAMPTZ" => match row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
            Ok(Some(ts)) => Value::String(ts.to_rfc3339()),
            Ok(None) => Value::Null,
            Err(_) => text_fallback(row, index),
        },
        "TIMESTAMP" => match row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
            Ok(Some(ts)) => Value::String(ts.to_string()),
            Ok(None) => Value::Null,
            Err(_) => text_fallback(row, index),
        },
        "DATE" => match row.try_get::<Option<chrono::NaiveDate>, _>(index) {
            Ok(Some(date)) => Value::String(date.to_string()),
            Ok(None) => Value::Null,
            Err(_) => text_fallback(row, index),
        },
        "JSON" | "JSONB" => match row.try_get::<Option<serde_json::Value>, _>(index) {
            Ok(Some(value)) => value,
            Ok(None) => Value::Null,
            Err(_) => text_fallback(row, index),
        },
        _ => text_fallback(row, index),
    }
}

fn scalar<T: Into<serde_json::Value>>(
    result: Result<Option<T>, sqlx::Error>,
) -> serde_json::Value {
    match result {
        Ok(Some(value)) => value.into(),
        _ => serde_json::Value::Null,
    }
}

fn text_fallback(row: &PgRow, index: usize) -> serde_json::Value {
    match row.try_get::<Option<String>, _>(index) {
        Ok(Some(value)) => serde_json::Value::String(value),
        _ => serde_json::Value::Null,
    }
}
