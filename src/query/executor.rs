//! Latest-wins query execution.
//!
//! A [`QueryExecutor`] runs the injected fetch capability for whatever query it
//! was most recently asked to observe, and publishes an [`ExecutionState`]
//! through a `watch` channel. Results that arrive for a superseded request are
//! dropped on arrival, whatever order the fetches complete in.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ExecutionState, QueryFetcher};
use crate::db::Row;
use crate::error::{DashError, Result};

/// Identifies one issued request within an executor.
///
/// Ids increase monotonically; the executor only applies the outcome of the
/// request whose id is still the latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(u64);

impl RequestId {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tuning knobs for a [`QueryExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Cancel the in-flight fetch when a newer request supersedes it.
    ///
    /// Stale results are discarded either way.
    pub cancel_superseded: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            cancel_superseded: true,
        }
    }
}

impl ExecutorOptions {
    /// Sets whether superseded fetches are cancelled.
    pub fn with_cancel_superseded(mut self, cancel: bool) -> Self {
        self.cancel_superseded = cancel;
        self
    }
}

/// Counters describing what happened to issued requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Fetches started.
    pub issued: u64,
    /// Outcomes written to the execution state.
    pub applied: u64,
    /// Outcomes dropped because a newer request had been issued.
    pub discarded: u64,
    /// Fetches abandoned through cancellation before they finished.
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    issued: AtomicU64,
    applied: AtomicU64,
    discarded: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            issued: self.issued.load(Ordering::SeqCst),
            applied: self.applied.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
        }
    }
}

/// Mutable bookkeeping guarded by one lock.
struct Tracker<Q> {
    /// Query currently held by the executor.
    current: Option<Q>,
    /// Latest request marker; bumped on every issue and on clear.
    latest: RequestId,
    /// Cancellation handle of the latest in-flight request.
    cancel: Option<CancellationToken>,
}

struct Shared<Q> {
    tracker: Mutex<Tracker<Q>>,
    state_tx: watch::Sender<ExecutionState>,
    counters: Counters,
}

impl<Q> Shared<Q> {
    fn lock(&self) -> MutexGuard<'_, Tracker<Q>> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a finished fetch if `id` is still the latest request.
    ///
    /// The marker check and the state write happen under the tracker lock, so
    /// a request issued concurrently either wins before the check or starts
    /// after the write.
    fn settle(&self, id: RequestId, outcome: Result<Vec<Row>>) -> bool {
        let mut tracker = self.lock();
        if tracker.latest != id {
            debug!(request = %id, latest = %tracker.latest, "discarding stale result");
            self.counters.discarded.fetch_add(1, Ordering::SeqCst);
            return false;
        }

        tracker.cancel = None;
        match outcome {
            Ok(rows) => {
                debug!(request = %id, rows = rows.len(), "request settled");
                self.state_tx.send_modify(|state| state.succeed(rows));
            }
            Err(e) => {
                warn!(request = %id, "fetch failed: {}", e);
                self.state_tx.send_modify(|state| state.fail(e.message()));
            }
        }
        self.counters.applied.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Executes queries with a latest-wins guarantee.
///
/// `observe` and `refetch` never block on the fetch: the state transition to
/// loading (or to idle for `None`) happens before they return, and the fetch
/// runs on a spawned tokio task. Both must be called from within a tokio
/// runtime.
pub struct QueryExecutor<Q> {
    fetcher: Arc<dyn QueryFetcher<Q>>,
    shared: Arc<Shared<Q>>,
    options: ExecutorOptions,
}

impl<Q> QueryExecutor<Q>
where
    Q: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    /// Creates an executor with default options.
    pub fn new(fetcher: impl QueryFetcher<Q> + 'static) -> Self {
        Self::with_options(fetcher, ExecutorOptions::default())
    }

    /// Creates an executor with the given options.
    pub fn with_options(fetcher: impl QueryFetcher<Q> + 'static, options: ExecutorOptions) -> Self {
        let fetcher: Arc<dyn QueryFetcher<Q>> = Arc::new(fetcher);
        Self::from_shared(fetcher, options)
    }

    /// Creates an executor around a fetcher that is shared with other code.
    pub fn from_shared(fetcher: Arc<dyn QueryFetcher<Q>>, options: ExecutorOptions) -> Self {
        let (state_tx, _) = watch::channel(ExecutionState::idle());
        Self {
            fetcher,
            shared: Arc::new(Shared {
                tracker: Mutex::new(Tracker {
                    current: None,
                    latest: RequestId::default(),
                    cancel: None,
                }),
                state_tx,
                counters: Counters::default(),
            }),
            options,
        }
    }

    /// Sets the query to observe and returns the state right after the
    /// synchronous transition.
    ///
    /// `None` clears the state to idle without fetching. An identifier equal
    /// to the one already held is a no-op; use [`refetch`](Self::refetch) to
    /// run it again.
    pub fn observe(&self, query: Option<Q>) -> ExecutionState {
        let mut tracker = self.shared.lock();
        if tracker.current == query {
            return self.state();
        }

        tracker.current = query.clone();
        match query {
            Some(query) => self.issue(&mut tracker, query),
            None => {
                tracker.latest = tracker.latest.next();
                self.cancel_outstanding(&mut tracker);
                debug!(latest = %tracker.latest, "query cleared");
                self.shared.state_tx.send_replace(ExecutionState::idle());
            }
        }

        self.state()
    }

    /// Runs the currently held query again, even if a fetch for it is in flight.
    ///
    /// Does nothing when no query is held.
    pub fn refetch(&self) {
        let mut tracker = self.shared.lock();
        match tracker.current.clone() {
            Some(query) => self.issue(&mut tracker, query),
            None => debug!("refetch ignored: no current query"),
        }
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> ExecutionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Subscribes to state changes.
    ///
    /// Holding a `Ref` from [`watch::Receiver::borrow`] blocks the writer, so
    /// never keep one alive across a call to [`observe`](Self::observe) or
    /// [`refetch`](Self::refetch) on the same thread: the call deadlocks.
    /// Clone the state out of the `Ref` first.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.shared.state_tx.subscribe()
    }

    /// Returns the query currently held, if any.
    pub fn current_query(&self) -> Option<Q> {
        self.shared.lock().current.clone()
    }

    /// Returns the options this executor was built with.
    pub fn options(&self) -> ExecutorOptions {
        self.options
    }

    /// Returns request counters.
    pub fn stats(&self) -> ExecutorStats {
        self.shared.counters.snapshot()
    }

    fn cancel_outstanding(&self, tracker: &mut Tracker<Q>) {
        let Some(previous) = tracker.cancel.take() else {
            return;
        };
        if self.options.cancel_superseded {
            previous.cancel();
        }
    }

    /// Marks a new latest request, flips the state to loading and spawns the fetch.
    fn issue(&self, tracker: &mut Tracker<Q>, query: Q) {
        let id = tracker.latest.next();
        tracker.latest = id;
        self.cancel_outstanding(tracker);

        let cancel = CancellationToken::new();
        tracker.cancel = Some(cancel.clone());

        self.shared.state_tx.send_modify(ExecutionState::begin_loading);
        self.shared.counters.issued.fetch_add(1, Ordering::SeqCst);
        debug!(request = %id, query = ?query, "issuing fetch");

        let fetcher = Arc::clone(&self.fetcher);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            // The fetch runs in its own task so a panic in it still settles the request.
            let mut fetch = tokio::spawn(async move { fetcher.fetch(&query).await });
            let outcome = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    fetch.abort();
                    debug!(request = %id, "fetch cancelled");
                    shared.counters.cancelled.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                joined = &mut fetch => joined.unwrap_or_else(|e| Err(join_failure(e))),
            };
            shared.settle(id, outcome);
        });
    }
}

/// Converts a fetch task that died into a fetch failure.
fn join_failure(error: JoinError) -> DashError {
    if !error.is_panic() {
        return DashError::internal(format!("fetch task failed: {error}"));
    }
    let payload = error.into_panic();
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    DashError::fetch(format!("fetch panicked: {reason}"))
}

impl<Q> Drop for QueryExecutor<Q> {
    fn drop(&mut self) {
        if let Some(cancel) = self.shared.lock().cancel.take() {
            cancel.cancel();
        }
    }
}

impl<Q: fmt::Debug> fmt::Debug for QueryExecutor<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracker = self.shared.lock();
        f.debug_struct("QueryExecutor")
            .field("current", &tracker.current)
            .field("latest", &tracker.latest)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
