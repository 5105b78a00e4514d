//! Saga orchestration with circuit-breaker-protected step invocation.
//!
//! A saga is an ordered sequence of steps, each pairing a forward action
//! with a compensating action. The orchestrator runs forward steps in
//! order; when one fails it runs the compensations of every completed step
//! in reverse. Step invocations go through a per-target circuit breaker,
//! and every transition and outcome is appended to the saga log before the
//! orchestrator acts on it, so a restarted process can resume any saga
//! where it left off.

pub mod action;
pub mod context;
pub mod definition;
pub mod error;
pub mod events;
pub mod executor;
pub mod instance;
pub mod orchestrator;
pub mod outcome;
pub mod publisher;
pub mod retry;

pub use action::{ActionError, NoopAction, StepAction};
pub use common::{SagaId, SagaStatus};
pub use context::SagaContext;
pub use definition::{DEFAULT_STEP_TIMEOUT, SagaDefinition, StepSpec};
pub use error::{Result, SagaError};
pub use events::{SagaEvent, SagaEventType};
pub use executor::StepExecutor;
pub use instance::SagaInstance;
pub use orchestrator::{OrchestratorConfig, SagaOrchestrator};
pub use outcome::{StepOutcome, StepPhase, StepResult};
pub use publisher::{
    ChannelEventPublisher, EventPublisher, InMemoryEventPublisher, NoopEventPublisher,
};
pub use retry::RetryPolicy;
