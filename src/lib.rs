//! dash-query - latest-wins query execution for data dashboards.
//!
//! This library exposes the core modules for the `dashq` binary and the
//! integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod safety;
pub mod warehouse;
