//! Shared fixtures for the integration tests.

pub mod concurrency_test;
pub mod postgres_test;
pub mod readonly_test;
pub mod staging_test;
pub mod timeout_test;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use safe_sql_gateway::config::{GatewayConfig, SourceConfig};
use safe_sql_gateway::connection::ConnectorManager;
use safe_sql_gateway::db::{Connector, EngineType, SqliteConnector};
use safe_sql_gateway::query::QueryExecutor;
use safe_sql_gateway::response::ToolResponse;
use safe_sql_gateway::staging::ResultStager;
use safe_sql_gateway::tools::ToolRegistry;
use tempfile::TempDir;
use tokio::time::Instant;

/// A temporary directory holding SQLite databases and the staging area.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join(".safe-sql-results")
    }

    pub fn stager(&self) -> ResultStager {
        ResultStager::new(self.staging_dir())
    }

    /// Creates `<name>.db` with a `users` table holding `users`.
    pub async fn sqlite_source(&self, id: &str, users: &[(i64, &str, &str)]) -> SourceConfig {
        let path = self.dir.path().join(format!("{id}.db"));
        std::fs::File::create(&path).unwrap();
        let source = SourceConfig::new(id, EngineType::Sqlite, sqlite_dsn(&path));

        let seeder = SqliteConnector::new(&source);
        seeder.connect().await.unwrap();
        run(
            &seeder,
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT NOT NULL)",
        )
        .await;
        for (user_id, name, email) in users {
            run(
                &seeder,
                &format!("INSERT INTO users (id, name, email) VALUES ({user_id}, '{name}', '{email}')"),
            )
            .await;
        }
        seeder.disconnect().await.unwrap();

        source
    }

    /// Builds a registry over real connectors for `config`.
    pub async fn gateway(&self, config: &GatewayConfig, allow_destructive: bool) -> ToolRegistry {
        let connectors = Arc::new(ConnectorManager::from_config(config));
        connectors.connect_all().await.unwrap();
        let executor = QueryExecutor::new(Arc::new(self.stager()));
        ToolRegistry::initialize(config, allow_destructive, connectors, executor).unwrap()
    }
}

pub fn sqlite_dsn(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

pub fn config_with(sources: Vec<SourceConfig>) -> GatewayConfig {
    GatewayConfig {
        sources,
        tools: Vec::new(),
    }
}

pub async fn run(connector: &dyn Connector, sql: &str) {
    connector
        .execute_sql(sql, Instant::now() + Duration::from_secs(10))
        .await
        .unwrap();
}

pub fn code(response: &ToolResponse) -> Option<String> {
    response
        .payload()
        .unwrap()
        .get("code")
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

pub const ALICE: (i64, &str, &str) = (1, "Alice", "alice@example.com");
pub const BOB: (i64, &str, &str) = (2, "Bob", "bob@example.com");
pub const CAROL: (i64, &str, &str) = (3, "Carol", "carol@example.com");
