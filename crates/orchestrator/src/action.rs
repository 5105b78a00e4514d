//! Step action trait and failure classification.

use async_trait::async_trait;
use thiserror::Error;

use crate::context::SagaContext;

/// Failure of a forward or compensating action.
///
/// The classification drives retry behavior: transient failures are retried
/// per the step's retry policy, permanent failures trigger compensation
/// immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The call failed in a way that may succeed on retry (network blip,
    /// downstream overload, timeout).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The call was rejected for a business reason retrying cannot fix
    /// (out of stock, card declined).
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl ActionError {
    /// Creates a transient (retryable) failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        ActionError::Transient(reason.into())
    }

    /// Creates a permanent (non-retryable) failure.
    pub fn permanent(reason: impl Into<String>) -> Self {
        ActionError::Permanent(reason.into())
    }

    /// Returns true if the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, ActionError::Transient(_))
    }

    /// Returns the failure description.
    pub fn reason(&self) -> &str {
        match self {
            ActionError::Transient(reason) | ActionError::Permanent(reason) => reason,
        }
    }
}

/// One invocable unit of saga work, implemented by external service clients.
///
/// Because of retries and crash-recovery replay, implementations must be
/// safe to invoke more than once with the same context.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Runs the action. The returned JSON becomes the step's recorded
    /// output, visible to later steps and compensations via the context.
    async fn run(&self, ctx: &SagaContext) -> Result<serde_json::Value, ActionError>;
}

/// Action with no external effect, for steps whose forward action needs no
/// compensation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAction;

#[async_trait]
impl StepAction for NoopAction {
    async fn run(&self, _ctx: &SagaContext) -> Result<serde_json::Value, ActionError> {
        Ok(serde_json::Value::Null)
    }
}
