//! Concurrent calls against different tools stay isolated.

use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::{config_with, Fixture, ALICE, BOB, CAROL};

#[tokio::test]
async fn test_concurrent_tools_stage_separately() {
    let fixture = Fixture::new();
    let first = fixture.sqlite_source("first", &[ALICE]).await;
    let second = fixture.sqlite_source("second", &[BOB, CAROL]).await;
    let registry = fixture.gateway(&config_with(vec![first, second]), false).await;

    assert_eq!(registry.tool_names(), vec!["execute_sql", "execute_sql_second"]);

    let (a, b) = tokio::join!(
        registry.execute_sql("execute_sql", "SELECT name FROM users ORDER BY id"),
        registry.execute_sql("execute_sql_second", "SELECT name FROM users ORDER BY id"),
    );
    assert!(!a.is_error);
    assert!(!b.is_error);

    let read = |path: std::path::PathBuf| -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    };
    let stager = fixture.stager();
    let first_rows = read(stager.latest_for("first").await.unwrap().unwrap());
    let second_rows = read(stager.latest_for("second").await.unwrap().unwrap());

    assert_eq!(first_rows, json!([{"name": "Alice"}]));
    assert_eq!(second_rows, json!([{"name": "Bob"}, {"name": "Carol"}]));
}

#[tokio::test]
async fn test_many_concurrent_calls_get_unique_files() {
    let fixture = Fixture::new();
    let source = fixture.sqlite_source("local", &[ALICE, BOB]).await;
    let registry = fixture.gateway(&config_with(vec![source]), false).await;

    let calls = (0..20).map(|i| {
        let sql = format!("SELECT id, {i} AS seq FROM users WHERE id = 1");
        let registry = &registry;
        async move { registry.execute_sql("execute_sql", &sql).await }
    });
    let responses = join_all(calls).await;
    assert!(responses.iter().all(|r| !r.is_error));

    let mut staged: Vec<serde_json::Value> = std::fs::read_dir(fixture.staging_dir())
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
        })
        .collect();
    assert_eq!(staged.len(), 20);

    staged.sort_by_key(|rows| rows[0]["seq"].as_i64().unwrap());
    for (i, rows) in staged.iter().enumerate() {
        assert_eq!(rows, &json!([{"id": 1, "seq": i}]));
    }
}

#[tokio::test]
async fn test_violation_on_one_tool_does_not_affect_another() {
    let fixture = Fixture::new();
    let first = fixture.sqlite_source("first", &[ALICE]).await;
    let second = fixture.sqlite_source("second", &[BOB]).await;
    let registry = fixture.gateway(&config_with(vec![first, second]), false).await;

    let (rejected, accepted) = tokio::join!(
        registry.execute_sql("execute_sql", "DELETE FROM users"),
        registry.execute_sql("execute_sql_second", "SELECT * FROM users"),
    );
    assert!(rejected.is_error);
    assert!(!accepted.is_error);
    assert_eq!(fixture.stager().latest_for("first").await.unwrap(), None);
}
