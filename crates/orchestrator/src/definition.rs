//! Saga definitions: named, ordered step sequences.

use std::sync::Arc;
use std::time::Duration;

use crate::action::StepAction;
use crate::error::{Result, SagaError};
use crate::retry::RetryPolicy;

/// Default wall-clock bound on a single action invocation.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// One step of a saga: a forward action, its compensation, and the execution
/// policy both run under.
#[derive(Clone)]
pub struct StepSpec {
    name: String,
    forward: Arc<dyn StepAction>,
    compensate: Arc<dyn StepAction>,
    retry_policy: RetryPolicy,
    timeout: Duration,
}

impl StepSpec {
    pub fn new(
        name: impl Into<String>,
        forward: Arc<dyn StepAction>,
        compensate: Arc<dyn StepAction>,
    ) -> Self {
        Self {
            name: name.into(),
            forward,
            compensate,
            retry_policy: RetryPolicy::default(),
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn forward(&self) -> &dyn StepAction {
        self.forward.as_ref()
    }

    pub fn compensate(&self) -> &dyn StepAction {
        self.compensate.as_ref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("retry_policy", &self.retry_policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// An ordered saga template, registered once and instantiated per run.
///
/// Step order is execution order; compensation walks the same steps in
/// reverse.
#[derive(Debug, Clone)]
pub struct SagaDefinition {
    id: String,
    steps: Vec<StepSpec>,
}

impl SagaDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    pub fn add_step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    /// Checks the definition is runnable: a non-empty id and at least one
    /// step, with non-empty, unique step names.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SagaError::InvalidDefinition {
                id: self.id.clone(),
                reason: "definition id must not be empty".to_string(),
            });
        }
        if self.steps.is_empty() {
            return Err(SagaError::InvalidDefinition {
                id: self.id.clone(),
                reason: "definition must declare at least one step".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.name().trim().is_empty() {
                return Err(SagaError::InvalidDefinition {
                    id: self.id.clone(),
                    reason: "step names must not be empty".to_string(),
                });
            }
            if !seen.insert(step.name()) {
                return Err(SagaError::InvalidDefinition {
                    id: self.id.clone(),
                    reason: format!("duplicate step name '{}'", step.name()),
                });
            }
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&StepSpec> {
        self.steps.get(index)
    }

    pub fn step_named(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|step| step.name() == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
