//! # brewlink-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Accept brew commands (`POST /api/devices/{id}/brew`) and hand them to
//!   the brew processor
//! - Expose reconciled device state, pipeline metrics and the connection
//!   supervisor's state for operators
//! - Map application results into HTTP responses (JSON)
//!
//! ## Dependency rule
//! Depends on `brewlink-app` (for port traits and services) and `brewlink-domain`
//! (for domain types used in request/response mapping). Never leaks axum types
//! into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;
