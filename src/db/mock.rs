//! Mock fetch capabilities for testing.
//!
//! `MockFetcher` returns canned rows, `FailingFetcher` always fails, and
//! `ScriptedFetcher` hands every call to the test so it can decide when and
//! how each one resolves.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{row, Row, Value};
use crate::error::{DashError, Result};
use crate::query::QueryFetcher;

/// Canned outcome for a single query.
#[derive(Debug, Clone)]
enum Canned {
    Rows(Vec<Row>),
    Failure(String),
}

/// A mock fetcher that returns predefined results keyed by the query's text.
///
/// Queries without a canned response produce one row echoing the query and
/// the call number. Cloning shares call counters and history.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    responses: HashMap<String, Canned>,
    delays: HashMap<String, Duration>,
    latency: Duration,
    calls: Arc<AtomicUsize>,
    history: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Creates a new mock fetcher with no canned responses and no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `rows` whenever the query text equals `query`.
    pub fn with_rows(mut self, query: impl Into<String>, rows: Vec<Row>) -> Self {
        self.responses.insert(query.into(), Canned::Rows(rows));
        self
    }

    /// Fails with `message` whenever the query text equals `query`.
    pub fn with_failure(mut self, query: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses
            .insert(query.into(), Canned::Failure(message.into()));
        self
    }

    /// Applies the same latency to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Overrides the latency for one query.
    pub fn with_delay(mut self, query: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(query.into(), delay);
        self
    }

    /// Number of fetches started so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query texts in the order they were fetched.
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<Q> QueryFetcher<Q> for MockFetcher
where
    Q: fmt::Display + Sync,
{
    async fn fetch(&self, query: &Q) -> Result<Vec<Row>> {
        let key = query.to_string();
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.clone());

        let delay = self.delays.get(&key).copied().unwrap_or(self.latency);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.responses.get(&key) {
            Some(Canned::Rows(rows)) => Ok(rows.clone()),
            Some(Canned::Failure(message)) => Err(DashError::fetch(message.clone())),
            None => Ok(vec![row([
                ("query", Value::from(key)),
                ("call", Value::from(call as i64)),
            ])]),
        }
    }
}

/// A fetcher that always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingFetcher {
    message: String,
}

impl FailingFetcher {
    /// Creates a fetcher that fails every call with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl<Q: Sync> QueryFetcher<Q> for FailingFetcher {
    async fn fetch(&self, _query: &Q) -> Result<Vec<Row>> {
        Err(DashError::fetch(self.message.clone()))
    }
}

/// A fetch call waiting for the test to resolve it.
#[derive(Debug)]
pub struct PendingFetch<Q> {
    /// The query the executor asked for.
    pub query: Q,
    reply: oneshot::Sender<Result<Vec<Row>>>,
}

impl<Q> PendingFetch<Q> {
    /// Completes the call with `rows`.
    ///
    /// Returns false if the caller stopped waiting (the request was cancelled).
    pub fn resolve(self, rows: Vec<Row>) -> bool {
        self.reply.send(Ok(rows)).is_ok()
    }

    /// Completes the call with a fetch failure carrying `message`.
    pub fn reject(self, message: impl Into<String>) -> bool {
        self.reply.send(Err(DashError::fetch(message))).is_ok()
    }

    /// Returns true once the caller has stopped waiting for this call.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

/// Receiving side of a [`ScriptedFetcher`].
#[derive(Debug)]
pub struct ScriptedCalls<Q> {
    rx: mpsc::UnboundedReceiver<PendingFetch<Q>>,
}

impl<Q> ScriptedCalls<Q> {
    /// Waits for the next fetch call.
    pub async fn next(&mut self) -> Option<PendingFetch<Q>> {
        self.rx.recv().await
    }

    /// Returns the next fetch call if one has already been made.
    pub fn try_next(&mut self) -> Option<PendingFetch<Q>> {
        self.rx.try_recv().ok()
    }
}

/// A fetcher whose calls are resolved by hand, in any order.
#[derive(Debug, Clone)]
pub struct ScriptedFetcher<Q> {
    tx: mpsc::UnboundedSender<PendingFetch<Q>>,
}

impl<Q> ScriptedFetcher<Q> {
    /// Creates the fetcher and the handle used to answer its calls.
    pub fn new() -> (Self, ScriptedCalls<Q>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ScriptedCalls { rx })
    }
}

#[async_trait]
impl<Q> QueryFetcher<Q> for ScriptedFetcher<Q>
where
    Q: Clone + Send + Sync,
{
    async fn fetch(&self, query: &Q) -> Result<Vec<Row>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PendingFetch {
                query: query.clone(),
                reply,
            })
            .map_err(|_| DashError::internal("scripted fetcher has no receiver"))?;

        rx.await
            .map_err(|_| DashError::internal("scripted fetch was dropped unanswered"))?
    }
}
