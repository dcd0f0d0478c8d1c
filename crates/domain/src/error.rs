//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`BrewLinkError`] at port boundaries.

use std::time::Duration;

/// Base error for everything that crosses a port boundary.
#[derive(Debug, thiserror::Error)]
pub enum BrewLinkError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A persistence adapter failed; the source is adapter specific.
    #[error("persistence error")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Input that violates a domain invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown brew type {0:?}")]
    UnknownBrewType(String),

    #[error("unknown device status {0:?}")]
    UnknownStatus(String),

    #[error("unknown alert kind {0:?}")]
    UnknownAlertKind(String),
}

/// A lookup that found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
