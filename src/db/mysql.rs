//! MySQL and MariaDB connector.
//!
//! Both engines share the sqlx MySQL driver. They differ only in the
//! session variable that bounds statement time: `max_execution_time`
//! (milliseconds, MySQL) or `max_statement_time` (seconds, MariaDB).

use crate::config::SourceConfig;
use crate::db::pool::{connect_with_retry, format_query_error, map_connection_error, PoolSlot};
use crate::db::{ColumnInfo, Connector, EngineType, QueryResult, Row, Schema, Value};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlColumn, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// MySQL / MariaDB connector.
#[derive(Debug)]
pub struct MySqlConnector {
    source_id: String,
    engine: EngineType,
    dsn: String,
    statement_timeout: Duration,
    read_only: bool,
    pool: PoolSlot<MySqlPool>,
}

impl MySqlConnector {
    /// Creates an unconnected connector for the given source.
    pub fn new(source: &SourceConfig) -> Self {
        Self {
            source_id: source.id.clone(),
            engine: source.engine,
            dsn: source.dsn.clone(),
            statement_timeout: source.statement_timeout(),
            read_only: source.readonly.unwrap_or(false),
            pool: PoolSlot::new(),
        }
    }

    /// Session statements run on every new pooled connection.
    fn session_statements(&self) -> Vec<String> {
        let mut statements = vec![match self.engine {
            EngineType::Mariadb => format!(
                "SET SESSION max_statement_time = {}",
                self.statement_timeout.as_secs_f64()
            ),
            _ => format!(
                "SET SESSION max_execution_time = {}",
                self.statement_timeout.as_millis()
            ),
        }];
        if self.read_only {
            statements.push("SET SESSION TRANSACTION READ ONLY".to_string());
        }
        statements
    }
}

/// sqlx only understands the `mysql:` scheme.
fn normalize_dsn(dsn: &str) -> String {
    match dsn.strip_prefix("mariadb:") {
        Some(rest) => format!("mysql:{rest}"),
        None => dsn.to_string(),
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn engine(&self) -> EngineType {
        self.engine
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn connect(&self) -> Result<()> {
        let options = MySqlConnectOptions::from_str(&normalize_dsn(&self.dsn))
            .map_err(|e| map_connection_error(e, &self.source_id))?;
        let session = self.session_statements();

        let pool = connect_with_retry(&self.source_id, || {
            let session = session.clone();
            MySqlPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .after_connect(move |conn, _meta| {
                    let session = session.clone();
                    Box::pin(async move {
                        for statement in &session {
                            conn.execute(statement.as_str()).await?;
                        }
                        Ok(())
                    })
                })
                .connect_with(options.clone())
        })
        .await
        .map_err(|e| map_connection_error(e, &self.source_id))?;

        debug!("Source '{}': connected to {}", self.source_id, self.engine);
        self.pool.set(pool);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_set()
    }

    async fn execute_sql(&self, sql: &str, deadline: Instant) -> Result<QueryResult> {
        let pool = self.pool.get(&self.source_id)?;
        let start = Instant::now();

        let rows: Vec<MySqlRow> =
            tokio::time::timeout_at(deadline, sqlx::query(sql).fetch_all(&pool))
                .await
                .map_err(|_| GatewayError::Timeout(start.elapsed()))?
                .map_err(format_query_error)?;

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

        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                CAST(table_name AS CHAR),
                CAST(column_name AS CHAR),
                CAST(column_type AS CHAR),
                CAST(is_nullable AS CHAR)
            FROM information_schema.columns
            WHERE table_schema = DATABASE()
            ORDER BY table_name, ordinal_position
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
            engine: self.engine,
            dsn: self.dsn.clone(),
            statement_timeout: self.statement_timeout,
            read_only: self.read_only,
            pool: PoolSlot::new(),
        })
    }
}

fn column_info(columns: &[MySqlColumn]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let type_name = type_name.to_uppercase();

    match type_name.as_str() {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(index)
            .ok()
            .flatten()
            .map(|v| match i64::try_from(v) {
                Ok(signed) => Value::Int(signed),
                Err(_) => Value::String(v.to_string()),
            })
            .unwrap_or(Value::Null),

        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        // DECIMAL travels as text in the binary protocol.
        "DECIMAL" => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),

        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        "JSON" => row
            .try_get::<Option<serde_json::Value>, _>(index)
            .ok()
            .flatten()
            .map(Value::Json)
            .unwrap_or(Value::Null),

        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
