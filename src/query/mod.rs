//! Query execution for dash-query.
//!
//! This module holds the latest-wins executor, the state it publishes and the
//! fetch capability it is built around.

pub mod executor;
pub mod fetcher;
pub mod state;

pub use executor::{ExecutorOptions, ExecutorStats, QueryExecutor, RequestId};
pub use fetcher::{FnFetcher, QueryFetcher};
pub use state::ExecutionState;
