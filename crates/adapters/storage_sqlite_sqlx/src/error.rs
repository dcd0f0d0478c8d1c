//! Storage-specific error type wrapping sqlx errors.

use brewlink_domain::error::BrewLinkError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value does not map back onto the domain.
    #[error("corrupt {column} value {value:?}")]
    Corrupt { column: &'static str, value: String },
}

impl StorageError {
    #[must_use]
    pub fn into_domain(self) -> BrewLinkError {
        BrewLinkError::Persistence(Box::new(self))
    }
}

impl From<StorageError> for BrewLinkError {
    fn from(err: StorageError) -> Self {
        err.into_domain()
    }
}
