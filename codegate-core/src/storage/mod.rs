//! Storage layer for the gate
//!
//! Provides SQL-based persistence for content records, gating groups and
//! pending join requests.

pub mod error;
pub mod migrations;
pub mod sql_store;

pub use error::StoreError;
pub use migrations::{migrate, CURRENT_SCHEMA_VERSION};
pub use sql_store::SqlStore;
