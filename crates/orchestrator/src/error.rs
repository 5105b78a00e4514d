//! Orchestrator error types.

use common::{SagaId, SagaStatus};
use saga_log::SagaLogError;
use thiserror::Error;

/// Errors that can occur while orchestrating sagas.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No definition is registered under the given ID.
    #[error("Saga definition '{0}' is not registered")]
    DefinitionNotFound(String),

    /// A definition with the same ID is already registered.
    #[error("Saga definition '{0}' is already registered")]
    DuplicateDefinition(String),

    /// The definition failed validation.
    #[error("Invalid saga definition '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },

    /// The saga is already being driven by this process.
    #[error("Saga {0} is already being driven")]
    AlreadyRunning(SagaId),

    /// The requested status change is not a legal lifecycle transition.
    #[error("Invalid saga transition: {from} -> {to}")]
    InvalidTransition { from: SagaStatus, to: SagaStatus },

    /// A recorded outcome references a step the definition does not contain.
    #[error("Definition '{definition_id}' has no step named '{step}'")]
    UnknownStep { definition_id: String, step: String },

    /// Saga log error. Fatal to the current step attempt: the orchestrator
    /// never advances past an outcome it could not record durably.
    #[error("Saga log error: {0}")]
    Persistence(#[from] SagaLogError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for orchestrator results.
pub type Result<T> = std::result::Result<T, SagaError>;
