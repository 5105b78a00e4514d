//! Lifecycle events emitted as a saga progresses.

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaEventType {
    Started,
    StepCompleted,
    Compensating,
    Completed,
    Compensated,
    Failed,
}

impl SagaEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaEventType::Started => "Started",
            SagaEventType::StepCompleted => "StepCompleted",
            SagaEventType::Compensating => "Compensating",
            SagaEventType::Completed => "Completed",
            SagaEventType::Compensated => "Compensated",
            SagaEventType::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A notification published for observers of saga progress.
///
/// Events are advisory. The log is the source of truth, and delivery is
/// fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaEvent {
    pub saga_id: SagaId,
    pub definition_id: String,
    pub event_type: SagaEventType,
    pub recorded_at: DateTime<Utc>,
    pub payload: Value,
}

impl SagaEvent {
    fn new(
        saga_id: SagaId,
        definition_id: impl Into<String>,
        event_type: SagaEventType,
        payload: Value,
    ) -> Self {
        Self {
            saga_id,
            definition_id: definition_id.into(),
            event_type,
            recorded_at: Utc::now(),
            payload,
        }
    }

    pub fn started(saga_id: SagaId, definition_id: impl Into<String>) -> Self {
        Self::new(saga_id, definition_id, SagaEventType::Started, Value::Null)
    }

    pub fn step_completed(
        saga_id: SagaId,
        definition_id: impl Into<String>,
        step_name: &str,
    ) -> Self {
        Self::new(
            saga_id,
            definition_id,
            SagaEventType::StepCompleted,
            json!({ "step_name": step_name }),
        )
    }

    pub fn compensating(
        saga_id: SagaId,
        definition_id: impl Into<String>,
        from_step: &str,
    ) -> Self {
        Self::new(
            saga_id,
            definition_id,
            SagaEventType::Compensating,
            json!({ "from_step": from_step }),
        )
    }

    pub fn completed(saga_id: SagaId, definition_id: impl Into<String>) -> Self {
        Self::new(saga_id, definition_id, SagaEventType::Completed, Value::Null)
    }

    pub fn compensated(saga_id: SagaId, definition_id: impl Into<String>) -> Self {
        Self::new(
            saga_id,
            definition_id,
            SagaEventType::Compensated,
            Value::Null,
        )
    }

    pub fn failed(saga_id: SagaId, definition_id: impl Into<String>, reason: &str) -> Self {
        Self::new(
            saga_id,
            definition_id,
            SagaEventType::Failed,
            json!({ "reason": reason }),
        )
    }
}
