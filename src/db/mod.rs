//! Data model and test doubles for dash-query.
//!
//! Rows are keyed by column name; the mocks here implement `QueryFetcher` for
//! tests and the `--mock` mode of the binary.

mod mock;
mod types;

pub use mock::{FailingFetcher, MockFetcher, PendingFetch, ScriptedCalls, ScriptedFetcher};
pub use types::{row, Row, Value};
