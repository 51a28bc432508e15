//! Executor properties across resolution orders and fetcher kinds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dash_query::db::{row, MockFetcher, PendingFetch, ScriptedFetcher, Value};
use dash_query::error::DashError;
use dash_query::query::{ExecutionState, ExecutorOptions, FnFetcher, QueryExecutor};
use dash_query::warehouse::Statement;

async fn wait_settled<Q>(executor: &QueryExecutor<Q>) -> ExecutionState
where
    Q: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static,
{
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

/// Every order in which three pending fetches can be answered.
const ORDERS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

#[tokio::test]
async fn test_last_issued_wins_in_any_resolution_order() {
    for order in ORDERS {
        let (fetcher, mut calls) = ScriptedFetcher::<String>::new();
        let executor = QueryExecutor::with_options(
            fetcher,
            ExecutorOptions::default().with_cancel_superseded(false),
        );

        let mut pending: Vec<Option<PendingFetch<String>>> = Vec::new();
        for name in ["A", "B", "C"] {
            executor.observe(Some(name.to_string()));
            pending.push(calls.next().await);
        }

        for i in order {
            let call = pending[i].take().unwrap();
            let name = call.query.clone();
            call.resolve(vec![row([("from", name)])]);
            drain().await;
        }

        let state = wait_settled(&executor).await;
        assert_eq!(
            state.data,
            vec![row([("from", "C")])],
            "resolution order {:?}",
            order
        );
        assert_eq!(executor.stats().applied, 1, "resolution order {:?}", order);
        assert_eq!(executor.stats().discarded, 2, "resolution order {:?}", order);
    }
}

#[tokio::test]
async fn test_returning_to_an_earlier_query_ignores_its_old_fetch() {
    let (fetcher, mut calls) = ScriptedFetcher::<String>::new();
    let executor = QueryExecutor::with_options(
        fetcher,
        ExecutorOptions::default().with_cancel_superseded(false),
    );

    executor.observe(Some("A".to_string()));
    let first_a = calls.next().await.unwrap();
    executor.observe(Some("B".to_string()));
    let _b = calls.next().await.unwrap();
    executor.observe(Some("A".to_string()));
    let second_a = calls.next().await.unwrap();

    first_a.resolve(vec![row([("run", 1)])]);
    drain().await;
    assert!(executor.state().loading);

    second_a.resolve(vec![row([("run", 2)])]);
    let state = wait_settled(&executor).await;
    assert_eq!(state.data, vec![row([("run", 2)])]);
}

#[tokio::test]
async fn test_refetch_issues_exactly_one_fetch_while_in_flight() {
    let (fetcher, mut calls) = ScriptedFetcher::<String>::new();
    let executor = QueryExecutor::new(fetcher);

    executor.observe(Some("A".to_string()));
    let first = calls.next().await.unwrap();
    executor.refetch();
    let second = calls.next().await.unwrap();
    drain().await;

    assert!(calls.try_next().is_none());
    assert!(first.is_abandoned());
    assert_eq!(second.query, "A");
    assert_eq!(executor.stats().issued, 2);

    second.resolve(vec![row([("v", 2)])]);
    let state = wait_settled(&executor).await;
    assert_eq!(state.data, vec![row([("v", 2)])]);
}

#[tokio::test]
async fn test_refetch_after_failure_recovers() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let fetcher = FnFetcher::new(move |_query: String| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(DashError::fetch("warehouse busy"))
            } else {
                Ok(vec![row([("ok", true)])])
            }
        }
    });
    let executor = QueryExecutor::new(fetcher);

    executor.observe(Some("A".to_string()));
    let state = wait_settled(&executor).await;
    assert_eq!(state.error.as_deref(), Some("warehouse busy"));

    executor.refetch();
    let state = wait_settled(&executor).await;
    assert_eq!(state.error, None);
    assert_eq!(state.data, vec![row([("ok", true)])]);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_latency_mock_supersedes_slow_query() {
    let fetcher = MockFetcher::new()
        .with_rows("slow", vec![row([("v", "slow")])])
        .with_rows("fast", vec![row([("v", "fast")])])
        .with_delay("slow", Duration::from_millis(200));
    let executor = QueryExecutor::with_options(
        fetcher.clone(),
        ExecutorOptions::default().with_cancel_superseded(false),
    );

    executor.observe(Some("slow".to_string()));
    executor.observe(Some("fast".to_string()));
    let state = wait_settled(&executor).await;
    assert_eq!(state.data, vec![row([("v", "fast")])]);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(executor.state().data, vec![row([("v", "fast")])]);
    assert_eq!(fetcher.history(), vec!["slow".to_string(), "fast".to_string()]);
}

#[tokio::test]
async fn test_statements_with_different_bindings_are_different_queries() {
    let fetcher = MockFetcher::new();
    let executor = QueryExecutor::new(fetcher.clone());
    let query = |region: &str| Statement::new("SELECT * FROM sales WHERE region = ?").bind(region);

    executor.observe(Some(query("north")));
    wait_settled(&executor).await;
    executor.observe(Some(query("north")));
    drain().await;
    assert_eq!(fetcher.call_count(), 1);

    executor.observe(Some(query("south")));
    let state = wait_settled(&executor).await;
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(
        state.data[0]["query"],
        Value::from("SELECT * FROM sales WHERE region = ? ['south']")
    );
}

#[tokio::test]
async fn test_dropping_executor_cancels_in_flight_fetch() {
    let (fetcher, mut calls) = ScriptedFetcher::<String>::new();
    let executor = QueryExecutor::new(fetcher);

    executor.observe(Some("A".to_string()));
    let pending = calls.next().await.unwrap();

    drop(executor);
    drain().await;

    assert!(pending.is_abandoned());
}
