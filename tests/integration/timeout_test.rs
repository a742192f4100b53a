//! Deadline enforcement through the registry.
//!
//! Uses a slow test double on paused time, so the 60 second default can be
//! checked without waiting a minute.

use std::sync::Arc;
use std::time::Duration;

use safe_sql_gateway::config::{GatewayConfig, ToolBindingConfig};
use safe_sql_gateway::connection::ConnectorManager;
use safe_sql_gateway::db::MockConnector;
use safe_sql_gateway::query::QueryExecutor;
use safe_sql_gateway::tools::ToolRegistry;
use tokio::time::Instant;

use super::{code, Fixture};

fn registry(fixture: &Fixture, config: &GatewayConfig, mock: &MockConnector) -> ToolRegistry {
    let mut manager = ConnectorManager::new();
    manager.register(Arc::new(mock.clone()));
    let executor = QueryExecutor::new(Arc::new(fixture.stager()));
    ToolRegistry::initialize(config, false, Arc::new(manager), executor).unwrap()
}

async fn assert_times_out_within(registry: &ToolRegistry, expected: Duration) {
    let start = Instant::now();
    let response = registry
        .execute_sql("execute_sql", "SELECT pg_sleep(3600)")
        .await;
    let elapsed = start.elapsed();

    assert!(response.is_error);
    assert_eq!(code(&response).as_deref(), Some("EXECUTION_ERROR"));
    let error = response.payload().unwrap()["error"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(error.contains("timed out"), "{error}");

    assert!(elapsed >= expected, "finished too early: {elapsed:?}");
    assert!(elapsed <= expected.mul_f64(1.5), "finished too late: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_is_sixty_seconds() {
    let fixture = Fixture::new();
    let config = GatewayConfig::from_dsn("postgres://localhost/db").unwrap();
    let mock = MockConnector::new("default").with_delay(Duration::from_secs(3600));
    let registry = registry(&fixture, &config, &mock);

    assert_times_out_within(&registry, Duration::from_secs(60)).await;
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_source_timeout_applies() {
    let fixture = Fixture::new();
    let mut config = GatewayConfig::from_dsn("postgres://localhost/db").unwrap();
    config.sources[0].timeout = Some(5);
    let mock = MockConnector::new("default").with_delay(Duration::from_secs(3600));
    let registry = registry(&fixture, &config, &mock);

    assert_times_out_within(&registry, Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_tool_timeout_overrides_source() {
    let fixture = Fixture::new();
    let mut config = GatewayConfig::from_dsn("postgres://localhost/db").unwrap();
    config.sources[0].timeout = Some(30);
    let mut tool = ToolBindingConfig::execute_sql("default");
    tool.timeout = Some(2);
    config.tools.push(tool);
    let mock = MockConnector::new("default").with_delay(Duration::from_secs(3600));
    let registry = registry(&fixture, &config, &mock);

    assert_times_out_within(&registry, Duration::from_secs(2)).await;
}

#[tokio::test(start_paused = true)]
async fn test_fast_query_beats_deadline() {
    let fixture = Fixture::new();
    let mut config = GatewayConfig::from_dsn("postgres://localhost/db").unwrap();
    config.sources[0].timeout = Some(5);
    let mock = MockConnector::new("default").with_delay(Duration::from_secs(1));
    let registry = registry(&fixture, &config, &mock);

    let response = registry.execute_sql("execute_sql", "SELECT 1").await;
    assert!(!response.is_error, "{:?}", response.payload());
}
