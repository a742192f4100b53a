//! Connector abstraction.
//!
//! Provides a trait-based interface for database engines so the execution
//! coordinator never depends on a concrete driver. Production connectors
//! are sqlx pools; tests use the doubles in `mock`.

mod mock;
mod mysql;
mod pool;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use mock::{FailingConnector, MockConnector};
pub use mysql::MySqlConnector;
pub use postgres::PostgresConnector;
pub use schema::{Column, ObjectType, Schema, Table};
pub use sqlite::SqliteConnector;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::SourceConfig;
use crate::error::{GatewayError, Result};
use crate::safety::SqlDialect;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Postgres,
    Mysql,
    Mariadb,
    Sqlserver,
    Sqlite,
}

impl EngineType {
    /// Returns the engine name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Sqlserver => "sqlserver",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses an engine from a name or DSN scheme.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" => Some(Self::Mysql),
            "mariadb" => Some(Self::Mariadb),
            "sqlserver" | "mssql" => Some(Self::Sqlserver),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Tokenizer dialect used when classifying statements for this engine.
    pub fn dialect(&self) -> SqlDialect {
        match self {
            Self::Postgres => SqlDialect::Postgres,
            Self::Mysql | Self::Mariadb => SqlDialect::MySql,
            Self::Sqlserver => SqlDialect::MsSql,
            Self::Sqlite => SqlDialect::Sqlite,
        }
    }

    /// Whether a running statement can be cancelled server-side when its
    /// deadline passes. SQLite runs in-process and cannot be preempted.
    pub fn supports_cancellation(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the (not yet connected) connector for a configured source.
///
/// SQL Server has no driver in this build; such sources need a connector
/// registered by the embedding application.
pub fn connector_for(source: &SourceConfig) -> Result<Arc<dyn Connector>> {
    match source.engine {
        EngineType::Postgres => Ok(Arc::new(PostgresConnector::new(source))),
        EngineType::Mysql | EngineType::Mariadb => Ok(Arc::new(MySqlConnector::new(source))),
        EngineType::Sqlite => Ok(Arc::new(SqliteConnector::new(source))),
        EngineType::Sqlserver => Err(GatewayError::connection(format!(
            "Source '{}': no built-in SQL Server driver; register a connector for it",
            source.id
        ))),
    }
}

/// Capability set every engine adapter provides.
///
/// All operations take `&self`; connectors own their pools and are shared
/// across concurrent requests behind an `Arc`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The engine this connector talks to.
    fn engine(&self) -> EngineType;

    /// Identifier of the configured source this connector serves.
    fn source_id(&self) -> &str;

    /// Opens the connection pool.
    async fn connect(&self) -> Result<()>;

    /// Returns true if the pool is open.
    fn is_connected(&self) -> bool;

    /// Connects if not already connected.
    async fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    /// Executes a SQL statement, giving up at `deadline`.
    async fn execute_sql(&self, sql: &str, deadline: Instant) -> Result<QueryResult>;

    /// Introspects user tables and their columns.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Closes the connection pool.
    async fn disconnect(&self) -> Result<()>;

    /// Produces an independent, unconnected connector for the same source.
    fn clone_connector(&self) -> Box<dyn Connector>;
}
