//! Result staging: rows reach the staging area and never the response.

use pretty_assertions::assert_eq;
use serde_json::json;

use super::{code, config_with, Fixture, ALICE, BOB, CAROL};

#[tokio::test]
async fn test_select_rows_only_in_staged_file() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE, BOB, CAROL]).await;
    let registry = fixture.gateway(&config_with(vec![source]), false).await;

    let response = registry
        .execute_sql("execute_sql", "SELECT id, name, email FROM users ORDER BY id")
        .await;

    assert!(!response.is_error);
    assert_eq!(response.payload().unwrap(), json!({"success": true, "data": {}}));

    let wire = serde_json::to_string(&response).unwrap();
    for leaked in ["alice@example.com", "Alice", "file_path", "rows", "columns", "count"] {
        assert!(!wire.contains(leaked), "response leaked {leaked}: {wire}");
    }

    let staged = fixture.stager().latest_for("local").await.unwrap().unwrap();
    let rows: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(staged).unwrap()).unwrap();
    assert_eq!(
        rows,
        json!([
            {"id": 1, "name": "Alice", "email": "alice@example.com"},
            {"id": 2, "name": "Bob", "email": "bob@example.com"},
            {"id": 3, "name": "Carol", "email": "carol@example.com"},
        ])
    );
}

#[tokio::test]
async fn test_column_aliases_cannot_smuggle_values() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE]).await;
    let registry = fixture.gateway(&config_with(vec![source]), false).await;

    let response = registry
        .execute_sql(
            "execute_sql",
            "SELECT email AS \"alice@example.com\" FROM users",
        )
        .await;

    assert!(!response.is_error);
    let wire = serde_json::to_string(&response).unwrap();
    assert!(!wire.contains("alice@example.com"));
}

#[tokio::test]
async fn test_pragma_table_info_is_allowed() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE]).await;
    let registry = fixture.gateway(&config_with(vec![source]), false).await;

    let response = registry
        .execute_sql("execute_sql", "PRAGMA table_info(users)")
        .await;
    assert!(!response.is_error, "{:?}", response.payload());

    let staged = fixture.stager().latest_for("local").await.unwrap().unwrap();
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(staged).unwrap()).unwrap();
    let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("id"), json!("name"), json!("email")]);
}

#[tokio::test]
async fn test_max_rows_limits_staged_rows() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE, BOB, CAROL]).await;
    let mut config = config_with(vec![source]);
    let mut tool = safe_sql_gateway::config::ToolBindingConfig::execute_sql("local");
    tool.max_rows = Some(2);
    config.tools.push(tool);
    let registry = fixture.gateway(&config, false).await;

    let response = registry
        .execute_sql("execute_sql", "SELECT id FROM users ORDER BY id")
        .await;
    assert!(!response.is_error);

    let staged = fixture.stager().latest_for("local").await.unwrap().unwrap();
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(staged).unwrap()).unwrap();
    assert_eq!(rows, vec![json!({"id": 1}), json!({"id": 2})]);
}

#[tokio::test]
async fn test_query_error_is_execution_error_without_staging() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE]).await;
    let registry = fixture.gateway(&config_with(vec![source]), false).await;

    let response = registry
        .execute_sql("execute_sql", "SELECT * FROM no_such_table")
        .await;

    assert!(response.is_error);
    assert_eq!(code(&response).as_deref(), Some("EXECUTION_ERROR"));
    assert!(response.payload().unwrap()["error"]
        .as_str()
        .unwrap()
        .contains("no_such_table"));
    assert_eq!(fixture.stager().latest_for("local").await.unwrap(), None);
}

#[tokio::test]
async fn test_search_objects_stages_matching_columns() {
    use safe_sql_gateway::config::ToolBindingConfig;

    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE]).await;
    let mut config = config_with(vec![source]);
    config.tools = vec![
        ToolBindingConfig::execute_sql("local"),
        ToolBindingConfig::search_objects("local"),
    ];
    let registry = fixture.gateway(&config, false).await;

    let response = registry
        .call("search_objects", json!({"pattern": "mail", "object_type": "column"}))
        .await;

    assert!(!response.is_error);
    assert_eq!(response.payload().unwrap(), json!({"success": true, "data": {}}));

    let staged = fixture
        .stager()
        .latest_for_tool("search_objects", "local")
        .await
        .unwrap()
        .unwrap();
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(staged).unwrap()).unwrap();
    let columns: Vec<_> = rows.iter().map(|r| (&r["table"], &r["column"])).collect();
    assert_eq!(columns, vec![(&json!("users"), &json!("email"))]);
    assert!(fixture.stager().latest_for("local").await.unwrap().is_none());
}
