//! Error types for dash-query.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for dash-query operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DashError {
    /// Failures reported by an injected fetch capability.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Warehouse API errors (auth, rate limits, transport, malformed responses).
    #[error("Warehouse error: {0}")]
    Warehouse(String),

    /// Query errors (SQL rejected by the read-only guard, statement failures).
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DashError {
    /// Creates a fetch error with the given message.
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Creates a warehouse error with the given message.
    pub fn warehouse(msg: impl Into<String>) -> Self {
        Self::Warehouse(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "Fetch Error",
            Self::Warehouse(_) => "Warehouse Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the bare message, without the category prefix.
    ///
    /// This is what ends up in `ExecutionState::error`.
    pub fn message(&self) -> &str {
        match self {
            Self::Fetch(msg)
            | Self::Warehouse(msg)
            | Self::Query(msg)
            | Self::Config(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

/// Result type alias using DashError.
pub type Result<T> = std::result::Result<T, DashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_fetch() {
        let err = DashError::fetch("timeout");
        assert_eq!(err.to_string(), "Fetch error: timeout");
        assert_eq!(err.category(), "Fetch Error");
    }

    #[test]
    fn test_error_display_warehouse() {
        let err = DashError::warehouse("Rate limited. Please wait.");
        assert_eq!(err.to_string(), "Warehouse error: Rate limited. Please wait.");
        assert_eq!(err.category(), "Warehouse Error");
    }

    #[test]
    fn test_error_display_query() {
        let err = DashError::query("refusing to run DELETE");
        assert_eq!(err.to_string(), "Query error: refusing to run DELETE");
        assert_eq!(err.category(), "Query Error");
    }

    #[test]
    fn test_error_display_config() {
        let err = DashError::config("missing field 'account_url' in warehouse");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing field 'account_url' in warehouse"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_error_display_internal() {
        let err = DashError::internal("unexpected state");
        assert_eq!(err.to_string(), "Internal error: unexpected state");
        assert_eq!(err.category(), "Internal Error");
    }

    #[test]
    fn test_message_strips_category() {
        assert_eq!(DashError::fetch("timeout").message(), "timeout");
        assert_eq!(DashError::warehouse("bad gateway").message(), "bad gateway");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DashError>();
    }
}
