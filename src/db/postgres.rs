//! PostgreSQL connector.
//!
//! Provides `PostgresConnector`, a sqlx pool that implements the `Connector`
//! trait. The source timeout is installed as the session
//! `statement_timeout` so the server cancels statements the gateway has
//! stopped waiting for.

use crate::config::SourceConfig;
use crate::db::pool::{connect_with_retry, format_query_error, map_connection_error, PoolSlot};
use crate::db::{ColumnInfo, Connector, EngineType, QueryResult, Row, Schema, Value};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column as SqlxColumn, Decode, Executor, Row as SqlxRow, Type, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// PostgreSQL connector.
#[derive(Debug)]
pub struct PostgresConnector {
    source_id: String,
    dsn: String,
    statement_timeout: Duration,
    read_only: bool,
    pool: PoolSlot<PgPool>,
}

impl PostgresConnector {
    /// Creates an unconnected connector for the given source.
    pub fn new(source: &SourceConfig) -> Self {
        Self {
            source_id: source.id.clone(),
            dsn: source.dsn.clone(),
            statement_timeout: source.statement_timeout(),
            read_only: source.readonly.unwrap_or(false),
            pool: PoolSlot::new(),
        }
    }

    /// Creates a connector around an existing pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(source_id: impl Into<String>, pool: PgPool) -> Self {
        let slot = PoolSlot::new();
        slot.set(pool);
        Self {
            source_id: source_id.into(),
            dsn: String::new(),
            statement_timeout: crate::config::DEFAULT_QUERY_TIMEOUT,
            read_only: false,
            pool: slot,
        }
    }

    /// Server options sent in the startup packet.
    fn session_options(&self) -> Vec<(&'static str, String)> {
        let mut options = vec![(
            "statement_timeout",
            format!("{}ms", self.statement_timeout.as_millis()),
        )];
        if self.read_only {
            options.push(("default_transaction_read_only", "on".to_string()));
        }
        options
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn engine(&self) -> EngineType {
        EngineType::Postgres
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn connect(&self) -> Result<()> {
        let options = PgConnectOptions::from_str(&self.dsn)
            .map_err(|e| map_connection_error(e, &self.source_id))?
            .options(self.session_options());

        let pool = connect_with_retry(&self.source_id, || {
            PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
        })
        .await
        .map_err(|e| map_connection_error(e, &self.source_id))?;

        debug!("Source '{}': connected to PostgreSQL", self.source_id);
        self.pool.set(pool);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_set()
    }

    async fn execute_sql(&self, sql: &str, deadline: Instant) -> Result<QueryResult> {
        let pool = self.pool.get(&self.source_id)?;
        let start = Instant::now();

        let rows: Vec<PgRow> = tokio::time::timeout_at(deadline, sqlx::query(sql).fetch_all(&pool))
            .await
            .map_err(|_| GatewayError::Timeout(start.elapsed()))?
            .map_err(format_query_error)?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match rows.first() {
            Some(first) => column_info(first.columns()),
            // Empty result: ask the server to describe the statement instead.
            None => match (&pool).describe(sql).await {
                Ok(described) => column_info(described.columns()),
                Err(_) => Vec::new(),
            },
        };

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();
        Ok(QueryResult::with_data(columns, rows).with_execution_time(execution_time))
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let pool = self.pool.get(&self.source_id)?;

        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                CASE WHEN table_schema = 'public' THEN table_name::text
                     ELSE table_schema::text || '.' || table_name::text END,
                column_name::text,
                data_type::text,
                is_nullable::text
            FROM information_schema.columns
            WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY table_schema, table_name, ordinal_position
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| GatewayError::query(format!("Failed to introspect schema: {e}")))?;

        Ok(Schema::from_column_rows(rows.into_iter().map(
            |(table, column, data_type, is_nullable)| {
                (table, column, data_type, is_nullable == "YES")
            },
        )))
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }

    fn clone_connector(&self) -> Box<dyn Connector> {
        Box::new(Self {
            source_id: self.source_id.clone(),
            dsn: self.dsn.clone(),
            statement_timeout: self.statement_timeout,
            read_only: self.read_only,
            pool: PoolSlot::new(),
        })
    }
}

fn column_info(columns: &[sqlx::postgres::PgColumn]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode_or_raw(row, index, Value::Bool),
        "INT2" | "SMALLINT" => decode_or_raw(row, index, |v: i16| Value::Int(v as i64)),
        "INT4" | "INT" | "INTEGER" => decode_or_raw(row, index, |v: i32| Value::Int(v as i64)),
        "INT8" | "BIGINT" => decode_or_raw(row, index, Value::Int),
        "FLOAT4" | "REAL" => decode_or_raw(row, index, |v: f32| Value::Float(v as f64)),
        "FLOAT8" | "DOUBLE PRECISION" => decode_or_raw(row, index, Value::Float),
        // NaN and values beyond Decimal's range fall back to the raw value.
        "NUMERIC" | "DECIMAL" => {
            decode_or_raw(row, index, |v: Decimal| Value::String(v.to_string()))
        }
        "UUID" => decode_or_raw(row, index, |v: Uuid| Value::String(v.to_string())),
        "INTERVAL" => decode_or_raw(row, index, |v: PgInterval| {
            Value::String(format_interval(&v))
        }),
        "BYTEA" => decode_or_raw(row, index, Value::Bytes),
        "JSON" | "JSONB" => decode_or_raw(row, index, Value::Json),
        "TIMESTAMPTZ" => decode_or_raw(row, index, |v: chrono::DateTime<chrono::Utc>| {
            Value::String(v.to_rfc3339())
        }),
        "TIMESTAMP" => decode_or_raw(row, index, |v: chrono::NaiveDateTime| {
            Value::String(v.to_string())
        }),
        "DATE" => decode_or_raw(row, index, |v: chrono::NaiveDate| Value::String(v.to_string())),
        "TIME" => decode_or_raw(row, index, |v: chrono::NaiveTime| Value::String(v.to_string())),
        _ => decode_or_raw(row, index, Value::String),
    }
}

/// Decodes a column as `T`, falling back to the raw value when `T` does not
/// match the column type.
fn decode_or_raw<'r, T, F>(row: &'r PgRow, index: usize, map: F) -> Value
where
    T: Decode<'r, Postgres> + Type<Postgres>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<Option<T>, _>(index) {
        Ok(Some(value)) => map(value),
        Ok(None) => Value::Null,
        Err(e) => {
            debug!("Column {}: decoding from raw value ({})", index, e);
            raw_value(row, index)
        }
    }
}

/// Text when the wire bytes are printable UTF-8 (enums, domains over text,
/// citext), otherwise the bytes themselves.
fn raw_value(row: &PgRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let Ok(bytes) = raw.as_bytes() else {
        return Value::Null;
    };
    bytes_to_value(bytes)
}

fn bytes_to_value(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) => {
            Value::String(text.to_string())
        }
        _ => Value::Bytes(bytes.to_vec()),
    }
}

/// ISO 8601 duration, e.g. `P1M2DT3.5S`.
fn format_interval(interval: &PgInterval) -> String {
    let seconds = interval.microseconds as f64 / 1_000_000.0;
    format!("P{}M{}DT{}S", interval.months, interval.days, seconds)
}
