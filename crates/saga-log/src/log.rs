use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{LogEntry, Result, SagaId, Sequence};

/// Options for appending entries to the log.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected current sequence of the saga for optimistic concurrency
    /// control. If None, no sequence check is performed (use with caution).
    pub expected_sequence: Option<Sequence>,
}

impl AppendOptions {
    /// Creates options with no sequence check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the saga to be at a specific sequence.
    pub fn expect_sequence(sequence: Sequence) -> Self {
        Self {
            expected_sequence: Some(sequence),
        }
    }

    /// Creates options expecting the saga to have no entries yet.
    pub fn expect_new() -> Self {
        Self {
            expected_sequence: Some(Sequence::initial()),
        }
    }
}

/// A stream of log entries.
pub type EntryStream = Pin<Box<dyn Stream<Item = Result<LogEntry>> + Send>>;

/// Core trait for saga log implementations.
///
/// The log is append-only: entries are written before the orchestrator acts
/// on their effect and are never modified. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait SagaLog: Send + Sync {
    /// Appends entries to the log.
    ///
    /// Entries are appended atomically. If `options.expected_sequence` is
    /// set, the operation fails with `SequenceConflict` when the saga's
    /// current sequence doesn't match.
    ///
    /// Returns the saga's sequence after appending.
    async fn append(&self, entries: Vec<LogEntry>, options: AppendOptions) -> Result<Sequence>;

    /// Retrieves all entries for a saga, in sequence order.
    async fn entries_for_saga(&self, saga_id: SagaId) -> Result<Vec<LogEntry>>;

    /// Retrieves entries for a saga starting from a specific sequence.
    ///
    /// Useful when replaying from a snapshot entry.
    async fn entries_for_saga_from(
        &self,
        saga_id: SagaId,
        from_sequence: Sequence,
    ) -> Result<Vec<LogEntry>>;

    /// Retrieves the most recent instance snapshot entry for a saga.
    ///
    /// Returns None if the saga has no snapshot entry.
    async fn latest_snapshot(&self, saga_id: SagaId) -> Result<Option<LogEntry>>;

    /// Gets the current sequence of a saga.
    ///
    /// Returns None if the saga has no entries.
    async fn current_sequence(&self, saga_id: SagaId) -> Result<Option<Sequence>>;

    /// Returns the IDs of sagas whose latest entry carries a non-terminal
    /// status. These are the sagas a restarted orchestrator must resume.
    async fn load_incomplete(&self) -> Result<Vec<SagaId>>;

    /// Streams every entry in the log, for audit replay.
    async fn stream_all_entries(&self) -> Result<EntryStream>;
}

/// Extension trait providing convenience methods for saga logs.
#[async_trait]
pub trait SagaLogExt: SagaLog {
    /// Appends a single entry to the log.
    async fn append_entry(&self, entry: LogEntry, options: AppendOptions) -> Result<Sequence> {
        self.append(vec![entry], options).await
    }

    /// Checks if a saga has any entries.
    async fn saga_exists(&self, saga_id: SagaId) -> Result<bool> {
        Ok(self.current_sequence(saga_id).await?.is_some())
    }

    /// Loads a saga's latest snapshot entry and the entries recorded after it.
    ///
    /// If no snapshot exists, returns None and all entries for the saga.
    async fn load_saga(&self, saga_id: SagaId) -> Result<(Option<LogEntry>, Vec<LogEntry>)> {
        if let Some(snapshot) = self.latest_snapshot(saga_id).await? {
            let entries = self
                .entries_for_saga_from(saga_id, snapshot.sequence.next())
                .await?;
            Ok((Some(snapshot), entries))
        } else {
            let entries = self.entries_for_saga(saga_id).await?;
            Ok((None, entries))
        }
    }
}

// Blanket implementation for all SagaLog implementations
impl<T: SagaLog + ?Sized> SagaLogExt for T {}

/// Error returned when building an invalid entry batch for appending.
#[derive(Debug, Clone)]
pub struct EntryValidationError {
    pub message: String,
}

impl std::fmt::Display for EntryValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entry validation error: {}", self.message)
    }
}

impl std::error::Error for EntryValidationError {}

/// Validates entries before appending.
pub fn validate_entries_for_append(
    entries: &[LogEntry],
) -> std::result::Result<(), EntryValidationError> {
    if entries.is_empty() {
        return Err(EntryValidationError {
            message: "Cannot append empty entry list".to_string(),
        });
    }

    // All entries must be for the same saga
    let first = &entries[0];
    for entry in entries.iter().skip(1) {
        if entry.saga_id != first.saga_id {
            return Err(EntryValidationError {
                message: "All entries must be for the same saga".to_string(),
            });
        }
    }

    // Sequences must start at 1 or later and be sequential
    if first.sequence < Sequence::first() {
        return Err(EntryValidationError {
            message: format!("Entry sequences start at 1, got {}", first.sequence),
        });
    }
    let mut expected_sequence = first.sequence;
    for entry in entries.iter().skip(1) {
        expected_sequence = expected_sequence.next();
        if entry.sequence != expected_sequence {
            return Err(EntryValidationError {
                message: format!(
                    "Entry sequences must be sequential. Expected {}, got {}",
                    expected_sequence, entry.sequence
                ),
            });
        }
    }

    Ok(())
}
