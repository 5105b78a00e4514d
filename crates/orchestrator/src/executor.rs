//! Step execution: timeouts, retries, breaker admission, durable outcomes.

use std::sync::Arc;

use circuit_breaker::{CircuitBreakerError, CircuitBreakerRegistry};
use common::{SagaId, SagaStatus};
use saga_log::{AppendOptions, EntryKind, LogEntry, SagaLog, SagaLogExt, Sequence};
use tracing::{debug, instrument, warn};

use crate::action::ActionError;
use crate::context::SagaContext;
use crate::definition::StepSpec;
use crate::error::Result;
use crate::outcome::StepOutcome;

/// Runs individual saga steps and appends their outcomes to the log.
///
/// Forward executions are admitted through the per-target circuit breaker;
/// target name is the step name, so every saga invoking the same step shares
/// one breaker. Compensations skip breaker admission entirely because a
/// rollback has to be attempted even when the target looks unhealthy.
///
/// Every settled outcome is appended before the executor returns, so the log
/// never trails what the orchestrator believes happened.
pub struct StepExecutor<L> {
    log: L,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl<L: SagaLog> StepExecutor<L> {
    pub fn new(log: L, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self { log, breakers }
    }

    /// Executes a step's forward action until it settles, then records the
    /// outcome at `sequence + 1`.
    ///
    /// A breaker rejection is treated like a transient failure of the
    /// attempt: it burns one attempt and is retried on the step's policy,
    /// but the target itself is never invoked.
    #[instrument(skip_all, fields(saga_id = %saga_id, step = step.name()))]
    pub async fn run_forward(
        &self,
        saga_id: SagaId,
        status: SagaStatus,
        sequence: Sequence,
        step: &StepSpec,
        ctx: &SagaContext,
    ) -> Result<(StepOutcome, Sequence)> {
        let breaker = self.breakers.breaker_for(step.name()).await;
        let policy = step.retry_policy();
        let mut attempt = 0u32;

        let error = loop {
            attempt += 1;
            let call = breaker
                .execute(|| async {
                    match tokio::time::timeout(step.timeout(), step.forward().run(ctx)).await {
                        Ok(result) => result,
                        Err(_) => Err(ActionError::transient(format!(
                            "timed out after {:?}",
                            step.timeout()
                        ))),
                    }
                })
                .await;

            let error = match call {
                Ok(output) => {
                    let outcome = StepOutcome::forward_success(step.name(), attempt, output);
                    let sequence = self
                        .append_outcome(saga_id, status, sequence, &outcome)
                        .await?;
                    return Ok((outcome, sequence));
                }
                Err(CircuitBreakerError::Open { target }) => {
                    ActionError::transient(format!("circuit breaker '{}' is open", target))
                }
                Err(CircuitBreakerError::Inner(error)) => error,
            };

            if !error.is_transient() || attempt >= policy.max_attempts() {
                break error;
            }

            metrics::counter!("saga_step_retries_total", "step" => step.name().to_string())
                .increment(1);
            debug!(attempt, error = %error, "step attempt failed, retrying");
            tokio::time::sleep(policy.delay_for(attempt)).await;
        };

        warn!(attempts = attempt, error = %error, "step failed");
        let outcome = StepOutcome::forward_failure(step.name(), attempt, error.reason());
        let sequence = self
            .append_outcome(saga_id, status, sequence, &outcome)
            .await?;
        Ok((outcome, sequence))
    }

    /// Executes a step's compensating action until it settles, then records
    /// the outcome at `sequence + 1`.
    #[instrument(skip_all, fields(saga_id = %saga_id, step = step.name()))]
    pub async fn run_compensation(
        &self,
        saga_id: SagaId,
        status: SagaStatus,
        sequence: Sequence,
        step: &StepSpec,
        ctx: &SagaContext,
    ) -> Result<(StepOutcome, Sequence)> {
        let policy = step.retry_policy();
        let mut attempt = 0u32;

        let error = loop {
            attempt += 1;
            let call = match tokio::time::timeout(step.timeout(), step.compensate().run(ctx)).await
            {
                Ok(result) => result,
                Err(_) => Err(ActionError::transient(format!(
                    "timed out after {:?}",
                    step.timeout()
                ))),
            };

            let error = match call {
                Ok(_) => {
                    let outcome = StepOutcome::compensation_success(step.name(), attempt);
                    let sequence = self
                        .append_outcome(saga_id, status, sequence, &outcome)
                        .await?;
                    return Ok((outcome, sequence));
                }
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= policy.max_attempts() {
                break error;
            }

            metrics::counter!("saga_step_retries_total", "step" => step.name().to_string())
                .increment(1);
            debug!(attempt, error = %error, "compensation attempt failed, retrying");
            tokio::time::sleep(policy.delay_for(attempt)).await;
        };

        warn!(attempts = attempt, error = %error, "compensation failed");
        let outcome = StepOutcome::compensation_failure(step.name(), attempt, error.reason());
        let sequence = self
            .append_outcome(saga_id, status, sequence, &outcome)
            .await?;
        Ok((outcome, sequence))
    }

    async fn append_outcome(
        &self,
        saga_id: SagaId,
        status: SagaStatus,
        sequence: Sequence,
        outcome: &StepOutcome,
    ) -> Result<Sequence> {
        let entry = LogEntry::builder()
            .saga_id(saga_id)
            .sequence(sequence.next())
            .kind(EntryKind::StepOutcome)
            .status(status)
            .payload(outcome)?
            .build();
        let sequence = self
            .log
            .append_entry(entry, AppendOptions::expect_sequence(sequence))
            .await?;
        Ok(sequence)
    }
}
