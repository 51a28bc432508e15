//! Warehouse integration tests.
//!
//! The live tests need SNOWFLAKE_ACCOUNT_URL and SNOWFLAKE_TOKEN (plus the
//! optional SNOWFLAKE_DATABASE/SCHEMA/WAREHOUSE/ROLE) and skip otherwise.

use std::time::Duration;

use dash_query::config::WarehouseConfig;
use dash_query::db::Value;
use dash_query::query::QueryExecutor;
use dash_query::warehouse::{Statement, WarehouseClient};

/// Helper to build a client from the environment.
fn get_test_client() -> Option<WarehouseClient> {
    let mut config = WarehouseConfig::default();
    config.apply_env_defaults();
    config.account_url.as_ref()?;
    config.token.as_ref()?;
    WarehouseClient::new(config).ok()
}

#[tokio::test]
async fn test_select_literal() {
    let Some(client) = get_test_client() else {
        eprintln!("Skipping test: SNOWFLAKE_ACCOUNT_URL/SNOWFLAKE_TOKEN not set");
        return;
    };

    let rows = client
        .execute(&Statement::new("SELECT 1 AS ONE, 'x' AS LETTER"))
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["ONE"], Value::Int(1));
    assert_eq!(rows[0]["LETTER"], Value::from("x"));
}

#[tokio::test]
async fn test_bound_value_is_not_sql() {
    let Some(client) = get_test_client() else {
        eprintln!("Skipping test: SNOWFLAKE_ACCOUNT_URL/SNOWFLAKE_TOKEN not set");
        return;
    };

    let payload = "x'; DROP TABLE orders; --";
    let rows = client
        .execute(&Statement::new("SELECT ? AS V").bind(payload))
        .await
        .unwrap();

    assert_eq!(rows[0]["V"], Value::from(payload));
}

#[tokio::test]
async fn test_date_column_decodes_to_date() {
    let Some(client) = get_test_client() else {
        eprintln!("Skipping test: SNOWFLAKE_ACCOUNT_URL/SNOWFLAKE_TOKEN not set");
        return;
    };

    let rows = client
        .execute(&Statement::new("SELECT TO_DATE('2024-01-01') AS D"))
        .await
        .unwrap();

    assert_eq!(
        rows[0]["D"],
        Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    );
}

#[tokio::test]
async fn test_executor_over_warehouse() {
    let Some(client) = get_test_client() else {
        eprintln!("Skipping test: SNOWFLAKE_ACCOUNT_URL/SNOWFLAKE_TOKEN not set");
        return;
    };

    let executor = QueryExecutor::new(client);
    executor.observe(Some(Statement::new("SELECT 1 AS N")));

    let mut rx = executor.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|s| !s.loading))
        .await
        .expect("query did not settle")
        .unwrap()
        .clone();

    assert_eq!(state.error, None);
    assert_eq!(state.data[0]["N"], Value::Int(1));
}

#[tokio::test(flavor = "current_thread")]
async fn test_unknown_host_is_a_warehouse_error() {
    let config = WarehouseConfig {
        account_url: Some("https://invalid.host.that.does.not.exist.local".to_string()),
        token: Some("token".to_string()),
        timeout_secs: 5,
        ..WarehouseConfig::default()
    };
    let client = WarehouseClient::new(config).unwrap();

    let err = client
        .execute(&Statement::new("SELECT 1"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Warehouse Error");
}

#[tokio::test]
async fn test_mutation_is_refused_without_network() {
    // Points nowhere reachable: a refusal must come before any request.
    let config = WarehouseConfig {
        account_url: Some("https://invalid.host.that.does.not.exist.local".to_string()),
        token: Some("token".to_string()),
        ..WarehouseConfig::default()
    };
    let client = WarehouseClient::new(config).unwrap();

    let err = client
        .execute(&Statement::new("DROP TABLE orders"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Query Error");
}
