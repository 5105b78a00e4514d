use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{SagaId, SagaStatus};

/// Unique identifier for a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new random entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entry ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntryId> for Uuid {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

/// Position of an entry within one saga's log, used for optimistic
/// concurrency control.
///
/// Sequences start at 1 for the first entry and increment by 1 for each
/// subsequent entry on a saga.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Creates a new sequence from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial sequence (0) for a saga with no entries.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first sequence (1) for the first entry.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next sequence.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw sequence value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Sequence {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Sequence> for i64 {
    fn from(sequence: Sequence) -> Self {
        sequence.0
    }
}

/// What a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Full serialized saga instance at a transition point.
    InstanceSnapshot,

    /// Result of one forward or compensating step execution.
    StepOutcome,
}

impl EntryKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::InstanceSnapshot => "InstanceSnapshot",
            EntryKind::StepOutcome => "StepOutcome",
        }
    }

    /// Parses a kind from its string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "InstanceSnapshot" => Some(EntryKind::InstanceSnapshot),
            "StepOutcome" => Some(EntryKind::StepOutcome),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record in the append-only saga log.
///
/// Every entry carries the saga status in effect when it was written, so
/// the latest entry alone tells whether a saga still needs recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier for this entry.
    pub entry_id: EntryId,

    /// The saga this entry belongs to.
    pub saga_id: SagaId,

    /// Position of this entry within the saga's log.
    pub sequence: Sequence,

    /// Whether this entry is an instance snapshot or a step outcome.
    pub kind: EntryKind,

    /// Saga status at the time the entry was written.
    pub status: SagaStatus,

    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,

    /// The entry payload as JSON.
    pub payload: serde_json::Value,
}

impl LogEntry {
    /// Creates a new log entry builder.
    pub fn builder() -> LogEntryBuilder {
        LogEntryBuilder::default()
    }

    /// Deserializes the payload into a concrete type.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Builder for constructing log entries.
#[derive(Debug, Default)]
pub struct LogEntryBuilder {
    entry_id: Option<EntryId>,
    saga_id: Option<SagaId>,
    sequence: Option<Sequence>,
    kind: Option<EntryKind>,
    status: Option<SagaStatus>,
    recorded_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
}

impl LogEntryBuilder {
    /// Sets the entry ID. If not set, a new ID will be generated.
    pub fn entry_id(mut self, id: EntryId) -> Self {
        self.entry_id = Some(id);
        self
    }

    /// Sets the saga ID.
    pub fn saga_id(mut self, id: SagaId) -> Self {
        self.saga_id = Some(id);
        self
    }

    /// Sets the sequence.
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Sets the entry kind.
    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the saga status recorded with this entry.
    pub fn status(mut self, status: SagaStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the log entry.
    ///
    /// # Panics
    ///
    /// Panics if required fields (saga_id, sequence, kind, status, payload)
    /// are not set.
    pub fn build(self) -> LogEntry {
        LogEntry {
            entry_id: self.entry_id.unwrap_or_default(),
            saga_id: self.saga_id.expect("saga_id is required"),
            sequence: self.sequence.expect("sequence is required"),
            kind: self.kind.expect("kind is required"),
            status: self.status.expect("status is required"),
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
            payload: self.payload.expect("payload is required"),
        }
    }

    /// Tries to build the log entry, returning None if required fields are missing.
    pub fn try_build(self) -> Option<LogEntry> {
        Some(LogEntry {
            entry_id: self.entry_id.unwrap_or_default(),
            saga_id: self.saga_id?,
            sequence: self.sequence?,
            kind: self.kind?,
            status: self.status?,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
            payload: self.payload?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_new_creates_unique_ids() {
        let id1 = EntryId::new();
        let id2 = EntryId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn sequence_ordering() {
        let s1 = Sequence::new(1);
        let s2 = Sequence::new(2);
        assert!(s1 < s2);
        assert_eq!(s1.next(), s2);
    }

    #[test]
    fn sequence_initial_and_first() {
        assert_eq!(Sequence::initial().as_i64(), 0);
        assert_eq!(Sequence::first().as_i64(), 1);
        assert_eq!(Sequence::initial().next(), Sequence::first());
    }

    #[test]
    fn entry_kind_parse_roundtrip() {
        for kind in [EntryKind::InstanceSnapshot, EntryKind::StepOutcome] {
            assert_eq!(EntryKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntryKind::parse("Unknown"), None);
    }

    #[test]
    fn log_entry_builder() {
        let saga_id = SagaId::new();
        let payload = serde_json::json!({"step": "reserve-inventory"});

        let entry = LogEntry::builder()
            .saga_id(saga_id)
            .sequence(Sequence::first())
            .kind(EntryKind::StepOutcome)
            .status(SagaStatus::Running)
            .payload_raw(payload.clone())
            .build();

        assert_eq!(entry.saga_id, saga_id);
        assert_eq!(entry.sequence, Sequence::first());
        assert_eq!(entry.kind, EntryKind::StepOutcome);
        assert_eq!(entry.status, SagaStatus::Running);
        assert_eq!(entry.payload, payload);
    }

    #[test]
    fn log_entry_try_build_returns_none_on_missing_fields() {
        let result = LogEntry::builder().try_build();
        assert!(result.is_none());
    }

    #[test]
    fn log_entry_payload_as() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Outcome {
            step_name: String,
            attempt: u32,
        }

        let outcome = Outcome {
            step_name: "charge-payment".to_string(),
            attempt: 2,
        };
        let entry = LogEntry::builder()
            .saga_id(SagaId::new())
            .sequence(Sequence::first())
            .kind(EntryKind::StepOutcome)
            .status(SagaStatus::Running)
            .payload(&outcome)
            .unwrap()
            .build();

        let restored: Outcome = entry.payload_as().unwrap();
        assert_eq!(restored, outcome);
    }
}
