//! Integration tests for dash-query.

pub mod executor_test;
pub mod scenario_test;
pub mod warehouse_test;
