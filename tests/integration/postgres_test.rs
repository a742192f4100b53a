//! PostgreSQL end-to-end tests.
//!
//! These tests require a running PostgreSQL database and are skipped
//! unless DATABASE_URL is set.

use safe_sql_gateway::config::GatewayConfig;
use safe_sql_gateway::tools::ToolRegistry;

use super::{code, Fixture};

async fn get_test_gateway(fixture: &Fixture, timeout: Option<u64>) -> Option<ToolRegistry> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let mut config = GatewayConfig::from_dsn(&url).ok()?;
    config.sources[0].timeout = timeout;
    Some(fixture.gateway(&config, false).await)
}

#[tokio::test]
async fn test_select_is_staged() {
    let fixture = Fixture::new();
    let Some(registry) = get_test_gateway(&fixture, None).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let response = registry
        .execute_sql("execute_sql", "SELECT 1 AS num, 'hello' AS greeting")
        .await;
    assert!(!response.is_error, "{:?}", response.payload());

    let staged = fixture.stager().latest_for("default").await.unwrap().unwrap();
    let rows: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(staged).unwrap()).unwrap();
    assert_eq!(rows, serde_json::json!([{"num": 1, "greeting": "hello"}]));
}

#[tokio::test]
async fn test_destructive_is_rejected() {
    let fixture = Fixture::new();
    let Some(registry) = get_test_gateway(&fixture, None).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let response = registry
        .execute_sql("execute_sql", "DROP TABLE IF EXISTS safe_sql_never_created")
        .await;
    assert_eq!(code(&response).as_deref(), Some("READONLY_VIOLATION"));
}

#[tokio::test]
async fn test_server_side_timeout() {
    let fixture = Fixture::new();
    let Some(registry) = get_test_gateway(&fixture, Some(1)).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let start = std::time::Instant::now();
    let response = registry
        .execute_sql("execute_sql", "SELECT pg_sleep(10)")
        .await;
    assert_eq!(code(&response).as_deref(), Some("EXECUTION_ERROR"));
    assert!(start.elapsed() < std::time::Duration::from_secs(5));
}
