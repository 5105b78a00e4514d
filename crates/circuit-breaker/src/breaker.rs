//! Three-state circuit breaker guarding a single target.

use std::future::Future;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::CircuitBreakerError;
use crate::state::{BreakerSnapshot, CircuitState};

/// Mutable breaker bookkeeping. Guarded by the breaker mutex; the lock is
/// never held across the protected call's await.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Admission token for one executed call. `trial` marks the half-open probe.
#[derive(Debug, Clone, Copy)]
struct CallPermit {
    trial: bool,
}

/// A circuit breaker for one named target.
///
/// All callers invoking the same target share one breaker, so a target that
/// trips open rejects every caller until the open timeout elapses. Rejected
/// calls never execute the protected action and never count as failures;
/// only failures of calls that actually ran move the failure counter.
///
/// The open timeout is checked lazily on the next call; there is no
/// background timer task.
#[derive(Debug)]
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the given target.
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            target: target.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Name of the protected target.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Runs `action` under breaker protection.
    ///
    /// Returns `CircuitBreakerError::Open` without invoking the action when
    /// the breaker rejects the call, and `CircuitBreakerError::Inner` when
    /// the action executed and failed.
    pub async fn execute<T, E, F, Fut>(&self, action: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.admit().await else {
            metrics::counter!("circuit_breaker_rejections_total", "target" => self.target.clone())
                .increment(1);
            tracing::debug!(target = %self.target, "circuit open, call rejected");
            return Err(CircuitBreakerError::Open {
                target: self.target.clone(),
            });
        };

        let result = action().await;
        match &result {
            Ok(_) => self.record_success(permit).await,
            Err(_) => self.record_failure(permit).await,
        }
        result.map_err(CircuitBreakerError::Inner)
    }

    /// Returns a point-in-time view of the breaker.
    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        BreakerSnapshot {
            target: self.target.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
        }
    }

    /// Forces the breaker back to closed with counters cleared.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let from = inner.state;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        if from != CircuitState::Closed {
            self.note_transition(from, CircuitState::Closed);
        }
    }

    /// Decides whether a call may proceed. Returns `None` on rejection.
    async fn admit(&self) -> Option<CallPermit> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => Some(CallPermit { trial: false }),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    self.note_transition(CircuitState::Open, CircuitState::HalfOpen);
                    Some(CallPermit { trial: true })
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(CallPermit { trial: true })
                }
            }
        }
    }

    async fn record_success(&self, permit: CallPermit) {
        let mut inner = self.inner.lock().await;
        if permit.trial {
            inner.trial_in_flight = false;
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.note_transition(CircuitState::HalfOpen, CircuitState::Closed);
            }
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
        // Non-trial results landing after the breaker tripped are ignored.
    }

    async fn record_failure(&self, permit: CallPermit) {
        let mut inner = self.inner.lock().await;
        if permit.trial {
            inner.trial_in_flight = false;
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                self.note_transition(CircuitState::HalfOpen, CircuitState::Open);
            }
            return;
        }

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            self.note_transition(CircuitState::Closed, CircuitState::Open);
        }
    }

    fn note_transition(&self, from: CircuitState, to: CircuitState) {
        metrics::counter!(
            "circuit_breaker_transitions_total",
            "target" => self.target.clone(),
            "to" => to.as_str()
        )
        .increment(1);
        tracing::warn!(
            target = %self.target,
            from = %from,
            to = %to,
            "circuit breaker state changed"
        );
    }
}
