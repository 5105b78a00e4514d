//! Breaker error types.

use thiserror::Error;

/// Errors surfaced by a breaker-protected call.
///
/// Generic over the error type of the protected action so callers keep
/// their own error taxonomy for calls that actually executed.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open and the call was rejected without executing.
    #[error("Circuit breaker '{target}' is open, rejecting call")]
    Open { target: String },

    /// The protected call executed and returned an error.
    #[error("Protected call failed: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if the call was rejected by an open breaker.
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    /// Returns the underlying action error, if the call executed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Open { .. } => None,
            CircuitBreakerError::Inner(err) => Some(err),
        }
    }
}
