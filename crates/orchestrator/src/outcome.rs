//! Recorded results of individual step attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction a step ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Forward,
    Compensation,
}

impl StepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepPhase::Forward => "forward",
            StepPhase::Compensation => "compensation",
        }
    }
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal result of a step execution, after retries were exhausted or the
/// step succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Success,
    Failure,
}

impl StepResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepResult::Success => "success",
            StepResult::Failure => "failure",
        }
    }
}

impl std::fmt::Display for StepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One settled step execution, forward or compensating.
///
/// `attempt` counts how many invocations it took to settle, so a step that
/// failed twice and then succeeded records `attempt: 3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_name: String,
    pub phase: StepPhase,
    pub attempt: u32,
    pub result: StepResult,
    pub output: Option<Value>,
    pub error_detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl StepOutcome {
    pub fn forward_success(step_name: impl Into<String>, attempt: u32, output: Value) -> Self {
        Self {
            step_name: step_name.into(),
            phase: StepPhase::Forward,
            attempt,
            result: StepResult::Success,
            output: Some(output),
            error_detail: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn forward_failure(
        step_name: impl Into<String>,
        attempt: u32,
        error_detail: impl Into<String>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            phase: StepPhase::Forward,
            attempt,
            result: StepResult::Failure,
            output: None,
            error_detail: Some(error_detail.into()),
            recorded_at: Utc::now(),
        }
    }

    pub fn compensation_success(step_name: impl Into<String>, attempt: u32) -> Self {
        Self {
            step_name: step_name.into(),
            phase: StepPhase::Compensation,
            attempt,
            result: StepResult::Success,
            output: None,
            error_detail: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn compensation_failure(
        step_name: impl Into<String>,
        attempt: u32,
        error_detail: impl Into<String>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            phase: StepPhase::Compensation,
            attempt,
            result: StepResult::Failure,
            output: None,
            error_detail: Some(error_detail.into()),
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == StepResult::Success
    }
}
