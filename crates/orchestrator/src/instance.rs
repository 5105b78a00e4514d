//! A running saga and its reconstruction from the log.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{SagaId, SagaStatus};
use saga_log::{EntryKind, LogEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::SagaContext;
use crate::error::{Result, SagaError};
use crate::outcome::{StepOutcome, StepPhase, StepResult};

/// One execution of a saga definition.
///
/// The instance is the unit of persistence: a full serialized copy is
/// appended to the log at every status transition, and step outcomes are
/// appended as they settle. `from_log` folds the trailing outcomes back
/// over the latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    id: SagaId,
    definition_id: String,
    status: SagaStatus,
    current_step_index: usize,
    step_outcomes: Vec<StepOutcome>,
    input: Value,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SagaInstance {
    pub fn new(id: SagaId, definition_id: impl Into<String>, input: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            definition_id: definition_id.into(),
            status: SagaStatus::Pending,
            current_step_index: 0,
            step_outcomes: Vec::new(),
            input,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds an instance from its latest snapshot entry plus the step
    /// outcome entries recorded after it.
    ///
    /// Snapshot entries in the tail are ignored by construction (the caller
    /// passes entries after the latest snapshot, which contains the full
    /// state already).
    pub fn from_log(snapshot: &LogEntry, tail: &[LogEntry]) -> Result<Self> {
        let mut instance: SagaInstance = snapshot.payload_as()?;
        for entry in tail {
            if entry.kind != EntryKind::StepOutcome {
                continue;
            }
            let outcome: StepOutcome = entry.payload_as()?;
            instance.record_outcome(outcome);
        }
        Ok(instance)
    }

    /// Moves the saga to a new status, enforcing the lifecycle graph.
    pub fn transition_to(&mut self, status: SagaStatus) -> Result<()> {
        use SagaStatus::*;
        let allowed = matches!(
            (self.status, status),
            (Pending, Running)
                | (Pending, Compensated)
                | (Running, Completed)
                | (Running, Compensating)
                | (Compensating, Compensated)
                | (Compensating, Failed)
        );
        if !allowed {
            return Err(SagaError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a settled step execution. A successful forward step advances
    /// the cursor to the next step.
    pub fn record_outcome(&mut self, outcome: StepOutcome) {
        if outcome.phase == StepPhase::Forward && outcome.is_success() {
            self.current_step_index += 1;
        }
        self.updated_at = outcome.recorded_at;
        self.step_outcomes.push(outcome);
    }

    pub fn set_failure_reason(&mut self, reason: impl Into<String>) {
        self.failure_reason = Some(reason.into());
    }

    /// Forward steps that completed successfully, in execution order.
    pub fn forward_successes(&self) -> impl Iterator<Item = &StepOutcome> {
        self.step_outcomes.iter().filter(|outcome| {
            outcome.phase == StepPhase::Forward && outcome.result == StepResult::Success
        })
    }

    /// Names of steps whose compensation already succeeded.
    pub fn compensated_steps(&self) -> HashSet<String> {
        self.step_outcomes
            .iter()
            .filter(|outcome| {
                outcome.phase == StepPhase::Compensation
                    && outcome.result == StepResult::Success
            })
            .map(|outcome| outcome.step_name.clone())
            .collect()
    }

    /// Builds the context the next action invocation will see.
    pub fn to_context(&self) -> SagaContext {
        let mut ctx = SagaContext::new(self.id, self.input.clone());
        for outcome in self.forward_successes() {
            let output = outcome.output.clone().unwrap_or(Value::Null);
            ctx.record_output(outcome.step_name.clone(), output);
        }
        ctx
    }

    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn step_outcomes(&self) -> &[StepOutcome] {
        &self.step_outcomes
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
