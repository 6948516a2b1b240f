//! arbor-core library.
//!
//! Ordered category forests with content leaves, the pure planners that turn
//! drag-and-drop gestures into patch sets, and an optimistic store that
//! applies them against an async persistence collaborator.
//!
//! Data flow: persistence snapshot → [`tree::build_forest`] → drop gesture →
//! [`order::plan_move`] → [`store::CategoryStore`] applies, persists, then
//! confirms or rolls back.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums ([`error`]) for engine, store and
//!   persistence failures; `anyhow::Result` for config and database setup.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod order;
pub mod persist;
pub mod store;
pub mod tree;
