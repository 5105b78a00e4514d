//! Append-only saga log.
//!
//! Every saga state transition and step outcome is written here before the
//! orchestrator acts on it, so a crashed orchestrator can resume any saga
//! from its last durable entry.

pub mod entry;
pub mod error;
pub mod log;
pub mod memory;
pub mod postgres;

pub use common::{SagaId, SagaStatus};
pub use entry::{EntryId, EntryKind, LogEntry, LogEntryBuilder, Sequence};
pub use error::{Result, SagaLogError};
pub use log::{AppendOptions, EntryStream, SagaLog, SagaLogExt};
pub use memory::InMemorySagaLog;
pub use postgres::PostgresSagaLog;
