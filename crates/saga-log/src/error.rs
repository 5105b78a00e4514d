use thiserror::Error;

use crate::{SagaId, Sequence};

/// Errors that can occur when interacting with the saga log.
#[derive(Debug, Error)]
pub enum SagaLogError {
    /// A sequence conflict occurred when appending entries.
    /// The expected sequence did not match the actual sequence.
    #[error(
        "Sequence conflict for saga {saga_id}: expected sequence {expected}, found {actual}"
    )]
    SequenceConflict {
        saga_id: SagaId,
        expected: Sequence,
        actual: Sequence,
    },

    /// The entry batch failed validation before appending.
    #[error("Invalid entry batch: {0}")]
    InvalidEntry(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaLogError {
    /// Returns true if the append failed because another writer got there first.
    pub fn is_sequence_conflict(&self) -> bool {
        matches!(self, SagaLogError::SequenceConflict { .. })
    }
}

/// Result type for saga log operations.
pub type Result<T> = std::result::Result<T, SagaLogError>;
