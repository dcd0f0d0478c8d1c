//! # brewlink-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement [`PersistenceGateway`](brewlink_app::ports::PersistenceGateway)
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `brewlink-app` (for port traits) and `brewlink-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod gateway;
pub mod pool;

pub use gateway::SqliteGateway;
pub use pool::{Config, Database};
