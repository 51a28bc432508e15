//! End-to-end dashboard scenarios: out-of-order results, failures, clearing
//! and refetching.

use std::time::Duration;

use dash_query::db::{row, FailingFetcher, ScriptedFetcher};
use dash_query::query::{ExecutionState, ExecutorOptions, QueryExecutor};
use pretty_assertions::assert_eq;

async fn wait_settled(executor: &QueryExecutor<String>) -> ExecutionState {
    let mut rx = executor.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| !s.loading))
        .await
        .expect("state did not settle")
        .expect("executor dropped")
        .clone();
    state
}

async fn drain() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn without_cancel() -> ExecutorOptions {
    ExecutorOptions::default().with_cancel_superseded(false)
}

#[tokio::test]
async fn test_scenario_a_late_result_loses() {
    let (fetcher, mut calls) = ScriptedFetcher::<String>::new();
    let executor = QueryExecutor::with_options(fetcher, without_cancel());

    executor.observe(Some("Q1".to_string()));
    let q1 = calls.next().await.unwrap();
    executor.observe(Some("Q2".to_string()));
    let q2 = calls.next().await.unwrap();
    assert_eq!(q1.query, "Q1");
    assert_eq!(q2.query, "Q2");

    q2.resolve(vec![row([("source", "Q2")])]);
    let state = wait_settled(&executor).await;
    assert_eq!(state.data, vec![row([("source", "Q2")])]);

    // Q1 answers last; nobody should see it.
    assert!(q1.resolve(vec![row([("source", "Q1")])]));
    drain().await;

    assert_eq!(
        executor.state(),
        ExecutionState {
            data: vec![row([("source", "Q2")])],
            loading: false,
            error: None,
        }
    );
    let stats = executor.stats();
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.discarded, 1);
}

#[tokio::test]
async fn test_scenario_a_with_cancellation() {
    let (fetcher, mut calls) = ScriptedFetcher::<String>::new();
    let executor = QueryExecutor::new(fetcher);

    executor.observe(Some("Q1".to_string()));
    let q1 = calls.next().await.unwrap();
    executor.observe(Some("Q2".to_string()));
    let q2 = calls.next().await.unwrap();
    drain().await;

    assert!(q1.is_abandoned());
    assert!(q2.resolve(vec![row([("source", "Q2")])]));

    let state = wait_settled(&executor).await;
    assert_eq!(state.data, vec![row([("source", "Q2")])]);
    assert_eq!(executor.stats().cancelled, 1);
}

#[tokio::test]
async fn test_scenario_b_failure_message() {
    let executor = QueryExecutor::new(FailingFetcher::new("timeout"));

    executor.observe(Some("X".to_string()));
    let state = wait_settled(&executor).await;

    assert_eq!(
        state,
        ExecutionState {
            data: vec![],
            loading: false,
            error: Some("timeout".to_string()),
        }
    );
}

#[tokio::test]
async fn test_scenario_c_clear_is_immediate_and_final() {
    let (fetcher, mut calls) = ScriptedFetcher::<String>::new();
    let executor = QueryExecutor::with_options(fetcher, without_cancel());

    executor.observe(Some("A".to_string()));
    let pending = calls.next().await.unwrap();

    let state = executor.observe(None);
    assert_eq!(state, ExecutionState::idle());

    pending.resolve(vec![row([("v", 1)])]);
    drain().await;

    assert_eq!(executor.state(), ExecutionState::idle());
    assert_eq!(executor.stats().discarded, 1);
}

#[tokio::test]
async fn test_scenario_d_refetch_shows_loading_between_results() {
    let (fetcher, mut calls) = ScriptedFetcher::<String>::new();
    let executor = QueryExecutor::new(fetcher);
    let mut rx = executor.subscribe();

    executor.observe(Some("A".to_string()));
    calls.next().await.unwrap().resolve(vec![row([("v", 1)])]);
    let state = rx.wait_for(|s| !s.loading).await.unwrap().clone();
    assert_eq!(state.data, vec![row([("v", 1)])]);

    executor.refetch();
    let loading = rx.borrow_and_update().clone();
    assert!(loading.loading);
    assert_eq!(loading.data, vec![row([("v", 1)])]);

    let second = calls.next().await.unwrap();
    assert_eq!(second.query, "A");
    second.resolve(vec![row([("v", 2)])]);

    let state = rx.wait_for(|s| !s.loading).await.unwrap().clone();
    assert_eq!(state.data, vec![row([("v", 2)])]);
    assert_eq!(state.error, None);
}
