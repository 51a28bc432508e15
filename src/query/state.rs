//! Observable execution state.

use serde::Serialize;

use crate::db::Row;

/// The state a `QueryExecutor` exposes to its observers.
///
/// `loading` and `error` are never both set once a request has settled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionState {
    /// Rows from the latest successful fetch.
    pub data: Vec<Row>,
    /// Whether a request for the current query is outstanding.
    pub loading: bool,
    /// Message from the latest failed fetch.
    pub error: Option<String>,
}

impl ExecutionState {
    /// The state for "no query": empty, idle, no error.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Returns true when no request is outstanding.
    pub fn is_settled(&self) -> bool {
        !self.loading
    }

    /// Returns true when the state carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn begin_loading(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub(crate) fn succeed(&mut self, rows: Vec<Row>) {
        self.data = rows;
        self.loading = false;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.data.clear();
        self.loading = false;
        self.error = Some(message.into());
    }
}
