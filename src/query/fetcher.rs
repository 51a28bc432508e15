//! The fetch capability injected into a `QueryExecutor`.
//!
//! The executor has no knowledge of any particular data source; hosts hand it
//! anything that implements [`QueryFetcher`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::db::Row;
use crate::error::Result;

/// An async capability that turns a query identifier into rows.
///
/// Failures are reported as `Err`; the executor converts them into
/// `ExecutionState::error` using [`DashError::message`](crate::error::DashError::message).
#[async_trait]
pub trait QueryFetcher<Q>: Send + Sync {
    /// Fetches the rows for `query`.
    async fn fetch(&self, query: &Q) -> Result<Vec<Row>>;
}

#[async_trait]
impl<Q, T> QueryFetcher<Q> for Arc<T>
where
    Q: Sync,
    T: QueryFetcher<Q> + ?Sized,
{
    async fn fetch(&self, query: &Q) -> Result<Vec<Row>> {
        (**self).fetch(query).await
    }
}

#[async_trait]
impl<Q, T> QueryFetcher<Q> for Box<T>
where
    Q: Sync,
    T: QueryFetcher<Q> + ?Sized,
{
    async fn fetch(&self, query: &Q) -> Result<Vec<Row>> {
        (**self).fetch(query).await
    }
}

/// Adapts an async closure into a [`QueryFetcher`].
///
/// The closure receives an owned copy of the identifier.
///
/// ```ignore
/// let fetcher = FnFetcher::new(|sql: String| async move {
///     Ok(vec![row([("sql", sql)])])
/// });
/// ```
#[derive(Clone)]
pub struct FnFetcher<F> {
    f: F,
}

impl<F> FnFetcher<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFetcher").finish_non_exhaustive()
    }
}

#[async_trait]
impl<Q, F, Fut> QueryFetcher<Q> for FnFetcher<F>
where
    Q: Clone + Send + Sync + 'static,
    F: Fn(Q) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Row>>> + Send,
{
    async fn fetch(&self, query: &Q) -> Result<Vec<Row>> {
        (self.f)(query.clone()).await
    }
}
