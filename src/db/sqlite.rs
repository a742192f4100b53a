//! SQLite connector.
//!
//! SQLite runs in-process, so there is no server that can cancel a
//! statement. The deadline bounds how long the caller waits; the statement
//! itself finishes on the driver's worker thread.

use crate::config::SourceConfig;
use crate::db::pool::{connect_with_retry, format_query_error, map_connection_error, PoolSlot};
use crate::db::{ColumnInfo, Connector, EngineType, QueryResult, Row, Schema, Value};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteColumn, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// SQLite connector.
#[derive(Debug)]
pub struct SqliteConnector {
    source_id: String,
    dsn: String,
    read_only: bool,
    pool: PoolSlot<SqlitePool>,
}

impl SqliteConnector {
    /// Creates an unconnected connector for the given source.
    pub fn new(source: &SourceConfig) -> Self {
        Self {
            source_id: source.id.clone(),
            dsn: source.dsn.clone(),
            read_only: source.readonly.unwrap_or(false),
            pool: PoolSlot::new(),
        }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn engine(&self) -> EngineType {
        EngineType::Sqlite
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn connect(&self) -> Result<()> {
        let options = SqliteConnectOptions::from_str(&self.dsn)
            .map_err(|e| map_connection_error(e, &self.source_id))?
            .read_only(self.read_only)
            .busy_timeout(Duration::from_secs(5));

        let pool = connect_with_retry(&self.source_id, || {
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
        })
        .await
        .map_err(|e| map_connection_error(e, &self.source_id))?;

        debug!("Source '{}': opened SQLite database", self.source_id);
        self.pool.set(pool);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_set()
    }

    async fn execute_sql(&self, sql: &str, deadline: Instant) -> Result<QueryResult> {
        let pool = self.pool.get(&self.source_id)?;
        let start = Instant::now();

        let rows: Vec<SqliteRow> =
            match tokio::time::timeout_at(deadline, sqlx::query(sql).fetch_all(&pool)).await {
                Ok(result) => result.map_err(format_query_error)?,
                Err(_) => {
                    warn!(
                        "Source '{}': stopped waiting on SQLite statement; it cannot be cancelled",
                        self.source_id
                    );
                    return Err(GatewayError::Timeout(start.elapsed()));
                }
            };

        let execution_time = start.elapsed();

        let columns = match rows.first() {
            Some(first) => column_info(first.columns()),
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

        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT m.name, p.name, p.type, p."notnull"
            FROM sqlite_master m
            JOIN pragma_table_info(m.name) p
            WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
            ORDER BY m.name, p.cid
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| GatewayError::query(format!("Failed to introspect schema: {e}")))?;

        Ok(Schema::from_column_rows(rows.into_iter().map(
            |(table, column, data_type, not_null)| (table, column, data_type, not_null == 0),
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
            read_only: self.read_only,
            pool: PoolSlot::new(),
        })
    }
}

fn column_info(columns: &[SqliteColumn]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Decodes by the value's storage class, not the declared column type.
/// SQLite columns are dynamically typed.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match storage_class.as_str() {
        "INTEGER" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
