//! The saga orchestrator: accepts sagas, drives them to a terminal status,
//! and resumes incomplete ones after a restart.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use circuit_breaker::{BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerRegistry};
use common::{SagaId, SagaStatus};
use saga_log::{AppendOptions, EntryKind, LogEntry, SagaLog, SagaLogExt, Sequence};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::executor::StepExecutor;
use crate::instance::SagaInstance;
use crate::publisher::EventPublisher;

/// Orchestrator construction options.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Breaker settings applied to every step target.
    pub breaker: CircuitBreakerConfig,
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}

/// In-process bookkeeping of sagas this orchestrator is driving.
///
/// `pending` holds sagas that have not run their first step yet, which is
/// the only window where `cancelled` can claim them.
#[derive(Debug, Default)]
struct ControlState {
    active: HashSet<SagaId>,
    pending: HashSet<SagaId>,
    cancelled: HashSet<SagaId>,
}

struct OrchestratorInner<L, P> {
    log: L,
    publisher: P,
    executor: StepExecutor<L>,
    breakers: Arc<CircuitBreakerRegistry>,
    definitions: RwLock<HashMap<String, Arc<SagaDefinition>>>,
    control: Mutex<ControlState>,
}

/// Drives sagas through their lifecycle.
///
/// Each accepted saga is persisted to the log before anything runs, then
/// executed step by step: forward actions through the circuit breaker,
/// and on failure the compensations of completed steps in reverse order.
/// A compensation failure stops the rollback and parks the saga as
/// `Failed` for manual reconciliation.
///
/// The orchestrator is cheap to clone; clones share definitions, breakers,
/// and in-flight bookkeeping.
pub struct SagaOrchestrator<L, P> {
    inner: Arc<OrchestratorInner<L, P>>,
}

impl<L, P> Clone for SagaOrchestrator<L, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L, P> SagaOrchestrator<L, P>
where
    L: SagaLog + Clone + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(log: L, publisher: P) -> Self {
        Self::with_config(log, publisher, OrchestratorConfig::default())
    }

    pub fn with_config(log: L, publisher: P, config: OrchestratorConfig) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker));
        let executor = StepExecutor::new(log.clone(), Arc::clone(&breakers));
        Self {
            inner: Arc::new(OrchestratorInner {
                log,
                publisher,
                executor,
                breakers,
                definitions: RwLock::new(HashMap::new()),
                control: Mutex::new(ControlState::default()),
            }),
        }
    }

    /// Registers a saga definition. The definition is validated and its id
    /// must not already be registered.
    pub fn register_definition(&self, definition: SagaDefinition) -> Result<()> {
        definition.validate()?;
        let mut definitions = self.inner.definitions.write().unwrap();
        if definitions.contains_key(definition.id()) {
            return Err(SagaError::DuplicateDefinition(definition.id().to_string()));
        }
        info!(
            definition_id = definition.id(),
            steps = definition.len(),
            "registered saga definition"
        );
        definitions.insert(definition.id().to_string(), Arc::new(definition));
        Ok(())
    }

    /// Accepts a new saga and drives it in a background task.
    ///
    /// Returns once the saga is durably accepted; progress is observable
    /// through [`SagaOrchestrator::saga`] and the event publisher.
    pub async fn start(&self, definition_id: &str, input: Value) -> Result<SagaId> {
        let (instance, definition, sequence) = self.prepare(definition_id, input).await?;
        let saga_id = instance.id();
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(error) = engine.drive_claimed(instance, definition, sequence).await {
                error!(saga_id = %saga_id, error = %error, "saga engine halted");
            }
        });
        Ok(saga_id)
    }

    /// Accepts a new saga and drives it to a terminal status inline.
    pub async fn start_and_wait(&self, definition_id: &str, input: Value) -> Result<SagaInstance> {
        let (instance, definition, sequence) = self.prepare(definition_id, input).await?;
        self.drive_claimed(instance, definition, sequence).await
    }

    /// Requests cancellation of a saga that has not started its first step.
    ///
    /// Returns true when the request was accepted. Once the first step has
    /// begun the saga can no longer be cancelled, only compensated by a
    /// step failure.
    pub fn cancel(&self, saga_id: SagaId) -> bool {
        let mut control = self.inner.control.lock().unwrap();
        if control.pending.contains(&saga_id) {
            control.cancelled.insert(saga_id);
            info!(saga_id = %saga_id, "cancellation requested");
            true
        } else {
            false
        }
    }

    /// Loads a saga's current state from the log.
    pub async fn saga(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        let (snapshot, tail) = self.inner.log.load_saga(saga_id).await?;
        match snapshot {
            Some(snapshot) => Ok(Some(SagaInstance::from_log(&snapshot, &tail)?)),
            None => Ok(None),
        }
    }

    /// Resumes every incomplete saga found in the log, each in a background
    /// task. Returns the ids that were claimed for resumption.
    pub async fn recover(&self) -> Result<Vec<SagaId>> {
        let incomplete = self.inner.log.load_incomplete().await?;
        let mut resumed = Vec::new();
        for saga_id in incomplete {
            let Some((instance, definition, sequence)) =
                self.claim_for_recovery(saga_id).await?
            else {
                continue;
            };
            resumed.push(saga_id);
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(error) = engine.drive_claimed(instance, definition, sequence).await {
                    error!(saga_id = %saga_id, error = %error, "saga engine halted");
                }
            });
        }
        info!(count = resumed.len(), "recovery scan finished");
        Ok(resumed)
    }

    /// Resumes every incomplete saga inline and returns each one's terminal
    /// state.
    pub async fn recover_and_wait(&self) -> Result<Vec<SagaInstance>> {
        let incomplete = self.inner.log.load_incomplete().await?;
        let mut finished = Vec::new();
        for saga_id in incomplete {
            let Some((instance, definition, sequence)) =
                self.claim_for_recovery(saga_id).await?
            else {
                continue;
            };
            finished.push(self.drive_claimed(instance, definition, sequence).await?);
        }
        Ok(finished)
    }

    /// Current breaker state for one step target, if that target has been
    /// invoked at least once.
    pub async fn breaker_snapshot(&self, target: &str) -> Option<BreakerSnapshot> {
        self.inner.breakers.snapshot(target).await
    }

    /// Breaker states for every known target, sorted by target name.
    pub async fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.inner.breakers.snapshots().await
    }

    /// Forces a target's breaker back to closed. Returns false if the
    /// target has no breaker yet.
    pub async fn reset_breaker(&self, target: &str) -> bool {
        self.inner.breakers.reset(target).await
    }

    async fn prepare(
        &self,
        definition_id: &str,
        input: Value,
    ) -> Result<(SagaInstance, Arc<SagaDefinition>, Sequence)> {
        let definition = self.definition(definition_id)?;
        let instance = SagaInstance::new(SagaId::new(), definition_id, input);
        let sequence = self.append_snapshot(&instance, Sequence::initial()).await?;
        self.claim(&instance)?;
        metrics::counter!("sagas_started_total", "definition" => definition_id.to_string())
            .increment(1);
        info!(saga_id = %instance.id(), definition_id, "saga accepted");
        Ok((instance, definition, sequence))
    }

    fn definition(&self, definition_id: &str) -> Result<Arc<SagaDefinition>> {
        let definitions = self.inner.definitions.read().unwrap();
        definitions
            .get(definition_id)
            .cloned()
            .ok_or_else(|| SagaError::DefinitionNotFound(definition_id.to_string()))
    }

    fn claim(&self, instance: &SagaInstance) -> Result<()> {
        let mut control = self.inner.control.lock().unwrap();
        if !control.active.insert(instance.id()) {
            return Err(SagaError::AlreadyRunning(instance.id()));
        }
        if instance.status() == SagaStatus::Pending {
            control.pending.insert(instance.id());
        }
        Ok(())
    }

    /// Closes the cancellation window. Returns true when the saga was
    /// cancelled while still pending.
    fn begin_first_step(&self, saga_id: SagaId) -> bool {
        let mut control = self.inner.control.lock().unwrap();
        control.pending.remove(&saga_id);
        control.cancelled.remove(&saga_id)
    }

    fn release(&self, saga_id: SagaId) {
        let mut control = self.inner.control.lock().unwrap();
        control.active.remove(&saga_id);
        control.pending.remove(&saga_id);
        control.cancelled.remove(&saga_id);
    }

    async fn drive_claimed(
        &self,
        instance: SagaInstance,
        definition: Arc<SagaDefinition>,
        sequence: Sequence,
    ) -> Result<SagaInstance> {
        let saga_id = instance.id();
        let result = self.drive(instance, definition, sequence).await;
        self.release(saga_id);
        result
    }

    #[instrument(skip_all, fields(saga_id = %instance.id(), definition_id = instance.definition_id()))]
    async fn drive(
        &self,
        mut instance: SagaInstance,
        definition: Arc<SagaDefinition>,
        mut sequence: Sequence,
    ) -> Result<SagaInstance> {
        let started = std::time::Instant::now();

        if instance.status() == SagaStatus::Pending {
            if self.begin_first_step(instance.id()) {
                instance.transition_to(SagaStatus::Compensated)?;
                self.append_snapshot(&instance, sequence).await?;
                self.publish(SagaEvent::compensated(
                    instance.id(),
                    instance.definition_id(),
                ));
                metrics::counter!("sagas_compensated_total").increment(1);
                info!("saga cancelled before first step");
                return Ok(instance);
            }
            instance.transition_to(SagaStatus::Running)?;
            sequence = self.append_snapshot(&instance, sequence).await?;
            self.publish(SagaEvent::started(instance.id(), instance.definition_id()));
        }

        if instance.status() == SagaStatus::Running {
            (instance, sequence) = self
                .run_forward_phase(instance, &definition, sequence)
                .await?;
        }

        if instance.status() == SagaStatus::Compensating {
            instance = self
                .run_compensation_phase(instance, &definition, sequence)
                .await?;
        }

        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(instance)
    }

    /// Runs forward steps from the current cursor until the definition is
    /// exhausted or a step fails.
    async fn run_forward_phase(
        &self,
        mut instance: SagaInstance,
        definition: &SagaDefinition,
        mut sequence: Sequence,
    ) -> Result<(SagaInstance, Sequence)> {
        while let Some(step) = definition.step(instance.current_step_index()) {
            info!(
                step = step.name(),
                index = instance.current_step_index(),
                "running step"
            );
            let ctx = instance.to_context();
            let (outcome, next_sequence) = self
                .inner
                .executor
                .run_forward(instance.id(), instance.status(), sequence, step, &ctx)
                .await?;
            sequence = next_sequence;

            let succeeded = outcome.is_success();
            let step_name = outcome.step_name.clone();
            let failure = outcome.error_detail.clone();
            instance.record_outcome(outcome);

            if succeeded {
                sequence = self.append_snapshot(&instance, sequence).await?;
                self.publish(SagaEvent::step_completed(
                    instance.id(),
                    instance.definition_id(),
                    &step_name,
                ));
                continue;
            }

            let reason = failure.unwrap_or_else(|| "step failed".to_string());
            instance.set_failure_reason(reason);
            instance.transition_to(SagaStatus::Compensating)?;
            sequence = self.append_snapshot(&instance, sequence).await?;
            self.publish(SagaEvent::compensating(
                instance.id(),
                instance.definition_id(),
                &step_name,
            ));
            warn!(step = %step_name, "step failed, compensating saga");
            return Ok((instance, sequence));
        }

        instance.transition_to(SagaStatus::Completed)?;
        sequence = self.append_snapshot(&instance, sequence).await?;
        self.publish(SagaEvent::completed(instance.id(), instance.definition_id()));
        metrics::counter!("sagas_completed_total").increment(1);
        info!("saga completed");
        Ok((instance, sequence))
    }

    /// Compensates completed forward steps in reverse order. Stops at the
    /// first compensation failure, leaving the saga failed.
    async fn run_compensation_phase(
        &self,
        mut instance: SagaInstance,
        definition: &SagaDefinition,
        mut sequence: Sequence,
    ) -> Result<SagaInstance> {
        let targets: Vec<String> = instance
            .forward_successes()
            .map(|outcome| outcome.step_name.clone())
            .collect();
        let already_compensated = instance.compensated_steps();

        for step_name in targets.into_iter().rev() {
            if already_compensated.contains(&step_name) {
                continue;
            }
            let step =
                definition
                    .step_named(&step_name)
                    .ok_or_else(|| SagaError::UnknownStep {
                        definition_id: instance.definition_id().to_string(),
                        step: step_name.clone(),
                    })?;
            info!(step = %step_name, "compensating step");
            let ctx = instance.to_context();
            let (outcome, next_sequence) = self
                .inner
                .executor
                .run_compensation(instance.id(), instance.status(), sequence, step, &ctx)
                .await?;
            sequence = next_sequence;

            let succeeded = outcome.is_success();
            let failure = outcome.error_detail.clone();
            instance.record_outcome(outcome);

            if !succeeded {
                let reason = failure.unwrap_or_else(|| "compensation failed".to_string());
                instance.set_failure_reason(reason.clone());
                instance.transition_to(SagaStatus::Failed)?;
                self.append_snapshot(&instance, sequence).await?;
                self.publish(SagaEvent::failed(
                    instance.id(),
                    instance.definition_id(),
                    &reason,
                ));
                metrics::counter!("sagas_failed_total").increment(1);
                error!(
                    step = %step_name,
                    "compensation failed, saga needs manual reconciliation"
                );
                return Ok(instance);
            }

            sequence = self.append_snapshot(&instance, sequence).await?;
        }

        instance.transition_to(SagaStatus::Compensated)?;
        self.append_snapshot(&instance, sequence).await?;
        self.publish(SagaEvent::compensated(
            instance.id(),
            instance.definition_id(),
        ));
        metrics::counter!("sagas_compensated_total").increment(1);
        warn!("saga compensated");
        Ok(instance)
    }

    /// Loads and claims one incomplete saga for resumption. Returns None
    /// when the saga needs no work or cannot be resumed here.
    async fn claim_for_recovery(
        &self,
        saga_id: SagaId,
    ) -> Result<Option<(SagaInstance, Arc<SagaDefinition>, Sequence)>> {
        let Some(instance) = self.saga(saga_id).await? else {
            warn!(saga_id = %saga_id, "incomplete saga has no snapshot, skipping");
            return Ok(None);
        };
        if instance.status().is_terminal() {
            return Ok(None);
        }
        let definition = match self.definition(instance.definition_id()) {
            Ok(definition) => definition,
            Err(_) => {
                warn!(
                    saga_id = %saga_id,
                    definition_id = instance.definition_id(),
                    "definition not registered, cannot resume saga"
                );
                return Ok(None);
            }
        };
        if self.claim(&instance).is_err() {
            return Ok(None);
        }
        let sequence = match self.inner.log.current_sequence(saga_id).await {
            Ok(sequence) => sequence.unwrap_or_else(Sequence::initial),
            Err(error) => {
                self.release(saga_id);
                return Err(error.into());
            }
        };
        metrics::counter!("sagas_recovered_total").increment(1);
        info!(saga_id = %saga_id, status = %instance.status(), "resuming saga");
        Ok(Some((instance, definition, sequence)))
    }

    async fn append_snapshot(&self, instance: &SagaInstance, sequence: Sequence) -> Result<Sequence> {
        let entry = LogEntry::builder()
            .saga_id(instance.id())
            .sequence(sequence.next())
            .kind(EntryKind::InstanceSnapshot)
            .status(instance.status())
            .payload(instance)?
            .build();
        let sequence = self
            .inner
            .log
            .append_entry(entry, AppendOptions::expect_sequence(sequence))
            .await?;
        Ok(sequence)
    }

    fn publish(&self, event: SagaEvent) {
        self.inner.publisher.publish(event);
    }
}
