//! Error types for the storage layer.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found.
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Unique key already taken.
    #[error("Duplicate {entity_type}: {field}={value} already exists")]
    Duplicate {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Value rejected before reaching the database.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub(crate) fn not_found(entity_type: &str, field: &str, value: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn duplicate(entity_type: &str, field: &str, value: impl ToString) -> Self {
        Self::Duplicate {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<StorageError> for taglink_core::Error {
    fn from(err: StorageError) -> Self {
        taglink_core::Error::Store(err.to_string())
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
