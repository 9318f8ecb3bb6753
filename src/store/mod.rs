//! Store implementations
//!
//! - [`memory`] - DashMap-backed, for tests and single-process replay
//! - [`postgres`] - sqlx / PostgreSQL
//! - [`schema`] - DDL for the PostgreSQL tables

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::{InMemoryMainWallet, MemoryStore};
pub use postgres::{PgMainWallet, PgStore};
