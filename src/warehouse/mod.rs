//! Cloud warehouse access.
//!
//! [`Statement`] is the query identifier dashboards observe; [`WarehouseClient`]
//! runs it against the Snowflake SQL API and is the production
//! [`QueryFetcher`](crate::query::QueryFetcher).

mod client;
mod statement;

pub use client::WarehouseClient;
pub use statement::{BindType, Binding, Statement};
