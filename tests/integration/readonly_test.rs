//! Read-only enforcement against a real SQLite database.

use pretty_assertions::assert_eq;
use serde_json::json;

use safe_sql_gateway::config::{GatewayConfig, ToolBindingConfig};

use super::{code, config_with, Fixture, ALICE, BOB};

const DESTRUCTIVE: &[&str] = &[
    "UPDATE users SET name = 'Mallory'",
    "DELETE FROM users WHERE id = 1",
    "INSERT INTO users (id, name, email) VALUES (9, 'Eve', 'eve@example.com')",
    "DROP TABLE users",
    "WITH gone AS (DELETE FROM users RETURNING *) SELECT * FROM gone",
    "SELECT 1; DELETE FROM users",
    "/* harmless */ DELETE FROM users",
    "PRAGMA journal_mode = DELETE",
];

async fn user_count(fixture: &Fixture, registry: &safe_sql_gateway::tools::ToolRegistry) -> i64 {
    let response = registry
        .execute_sql("execute_sql", "SELECT COUNT(*) AS n FROM users")
        .await;
    assert!(!response.is_error);
    let staged = fixture.stager().latest_for("local").await.unwrap().unwrap();
    let rows: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(staged).unwrap()).unwrap();
    rows[0]["n"].as_i64().unwrap()
}

#[tokio::test]
async fn test_cli_default_is_read_only() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE, BOB]).await;
    let registry = fixture.gateway(&config_with(vec![source]), false).await;

    for sql in DESTRUCTIVE {
        let response = registry.execute_sql("execute_sql", sql).await;
        assert!(response.is_error, "{sql}");
        assert_eq!(code(&response).as_deref(), Some("READONLY_VIOLATION"), "{sql}");
    }

    assert_eq!(user_count(&fixture, &registry).await, 2);
}

#[tokio::test]
async fn test_tool_readonly_overrides_destructive_flag() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE, BOB]).await;
    let mut tool = ToolBindingConfig::execute_sql("local");
    tool.readonly = Some(true);
    let config = GatewayConfig {
        sources: vec![source],
        tools: vec![tool],
    };
    let registry = fixture.gateway(&config, true).await;

    let response = registry
        .execute_sql("execute_sql", "DELETE FROM users")
        .await;
    assert_eq!(code(&response).as_deref(), Some("READONLY_VIOLATION"));
    assert_eq!(user_count(&fixture, &registry).await, 2);
}

#[tokio::test]
async fn test_destructive_flag_allows_writes() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE, BOB]).await;
    let registry = fixture.gateway(&config_with(vec![source]), true).await;

    let response = registry
        .execute_sql("execute_sql", "DELETE FROM users WHERE id = 2")
        .await;
    assert!(!response.is_error, "{:?}", response.payload());
    assert_eq!(response.payload().unwrap(), json!({"success": true, "data": {}}));

    assert_eq!(user_count(&fixture, &registry).await, 1);
}

#[tokio::test]
async fn test_violation_message_is_bounded() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE]).await;
    let registry = fixture.gateway(&config_with(vec![source]), false).await;

    let sql = format!("DELETE FROM users WHERE name IN ({})", "'x',".repeat(500));
    let response = registry.execute_sql("execute_sql", &sql).await;
    let error = response.payload().unwrap()["error"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(error.chars().count() <= 256);
}
