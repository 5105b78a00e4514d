//! Circuit breaker state machine.

use serde::{Deserialize, Serialize};

/// The state of a circuit breaker.
///
/// State transitions:
/// ```text
/// Closed ──► Open:     consecutive failures reach the threshold
/// Open ──► HalfOpen:   open timeout elapsed, next call becomes the trial
/// HalfOpen ──► Closed: trial call succeeds
/// HalfOpen ──► Open:   trial call fails
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    #[default]
    Closed,

    /// Calls are rejected without executing the protected action.
    Open,

    /// One trial call is allowed through to probe recovery.
    HalfOpen,
}

impl CircuitState {
    /// Returns true if calls are admitted in this state.
    pub fn admits_calls(&self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point-in-time view of one breaker, for monitoring surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Name of the protected target.
    pub target: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive executed-call failures observed since the last success.
    pub consecutive_failures: u32,
}
