use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EntryKind, LogEntry, Result, SagaId, SagaLogError, Sequence,
    log::{AppendOptions, EntryStream, SagaLog, validate_entries_for_append},
};

/// In-memory saga log implementation for testing.
///
/// Stores all entries in memory behind the same interface as the
/// PostgreSQL implementation. `set_fail_appends` turns every append into a
/// database error, for exercising persistence-failure handling.
#[derive(Clone, Default)]
pub struct InMemorySagaLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
    fail_appends: Arc<RwLock<bool>>,
}

impl InMemorySagaLog {
    /// Creates a new empty in-memory saga log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries stored.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Clears all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// When set, every append fails with a database error.
    pub async fn set_fail_appends(&self, fail: bool) {
        *self.fail_appends.write().await = fail;
    }
}

#[async_trait]
impl SagaLog for InMemorySagaLog {
    async fn append(&self, entries: Vec<LogEntry>, options: AppendOptions) -> Result<Sequence> {
        if *self.fail_appends.read().await {
            return Err(SagaLogError::Database(sqlx::Error::PoolClosed));
        }

        validate_entries_for_append(&entries)
            .map_err(|e| SagaLogError::InvalidEntry(e.message))?;

        let first_entry = &entries[0];
        let saga_id = first_entry.saga_id;

        let mut log = self.entries.write().await;

        // Get current sequence for this saga
        let current_sequence = log
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .map(|e| e.sequence)
            .max()
            .unwrap_or(Sequence::initial());

        // Check expected sequence if specified
        if let Some(expected) = options.expected_sequence
            && current_sequence != expected
        {
            metrics::counter!("saga_log_append_conflicts_total").increment(1);
            tracing::warn!(
                saga_id = %saga_id,
                expected = %expected,
                actual = %current_sequence,
                "sequence conflict on append"
            );
            return Err(SagaLogError::SequenceConflict {
                saga_id,
                expected,
                actual: current_sequence,
            });
        }

        // Check for sequence collisions (unique constraint simulation)
        let first_new_sequence = first_entry.sequence;
        if first_new_sequence <= current_sequence && current_sequence != Sequence::initial() {
            metrics::counter!("saga_log_append_conflicts_total").increment(1);
            return Err(SagaLogError::SequenceConflict {
                saga_id,
                expected: options.expected_sequence.unwrap_or(current_sequence),
                actual: current_sequence,
            });
        }

        // Store all entries
        let last_sequence = entries
            .last()
            .map(|e| e.sequence)
            .unwrap_or(Sequence::initial());
        log.extend(entries);

        tracing::debug!(saga_id = %saga_id, sequence = %last_sequence, "appended saga log entries");
        Ok(last_sequence)
    }

    async fn entries_for_saga(&self, saga_id: SagaId) -> Result<Vec<LogEntry>> {
        let log = self.entries.read().await;
        let mut entries: Vec<_> = log
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    async fn entries_for_saga_from(
        &self,
        saga_id: SagaId,
        from_sequence: Sequence,
    ) -> Result<Vec<LogEntry>> {
        let log = self.entries.read().await;
        let mut entries: Vec<_> = log
            .iter()
            .filter(|e| e.saga_id == saga_id && e.sequence >= from_sequence)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    async fn latest_snapshot(&self, saga_id: SagaId) -> Result<Option<LogEntry>> {
        let log = self.entries.read().await;
        let snapshot = log
            .iter()
            .filter(|e| e.saga_id == saga_id && e.kind == EntryKind::InstanceSnapshot)
            .max_by_key(|e| e.sequence)
            .cloned();
        Ok(snapshot)
    }

    async fn current_sequence(&self, saga_id: SagaId) -> Result<Option<Sequence>> {
        let log = self.entries.read().await;
        let sequence = log
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .map(|e| e.sequence)
            .max();
        Ok(sequence)
    }

    async fn load_incomplete(&self) -> Result<Vec<SagaId>> {
        let log = self.entries.read().await;

        // Latest entry per saga decides whether the saga is still in flight
        let mut latest: HashMap<SagaId, &LogEntry> = HashMap::new();
        for entry in log.iter() {
            match latest.get(&entry.saga_id) {
                Some(existing) if existing.sequence >= entry.sequence => {}
                _ => {
                    latest.insert(entry.saga_id, entry);
                }
            }
        }

        let mut incomplete: Vec<SagaId> = latest
            .into_iter()
            .filter(|(_, entry)| !entry.status.is_terminal())
            .map(|(saga_id, _)| saga_id)
            .collect();
        incomplete.sort_by_key(|id| id.as_uuid());
        Ok(incomplete)
    }

    async fn stream_all_entries(&self) -> Result<EntryStream> {
        use futures_util::stream;

        let log = self.entries.read().await;
        let mut entries = log.clone();
        entries.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.entry_id.as_uuid().cmp(&b.entry_id.as_uuid()))
        });

        let stream = stream::iter(entries.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SagaStatus;

    fn create_test_entry(
        saga_id: SagaId,
        sequence: Sequence,
        kind: EntryKind,
        status: SagaStatus,
    ) -> LogEntry {
        LogEntry::builder()
            .saga_id(saga_id)
            .sequence(sequence)
            .kind(kind)
            .status(status)
            .payload_raw(serde_json::json!({"test": true}))
            .build()
    }

    fn snapshot_entry(saga_id: SagaId, sequence: Sequence, status: SagaStatus) -> LogEntry {
        create_test_entry(saga_id, sequence, EntryKind::InstanceSnapshot, status)
    }

    fn outcome_entry(saga_id: SagaId, sequence: Sequence) -> LogEntry {
        create_test_entry(saga_id, sequence, EntryKind::StepOutcome, SagaStatus::Running)
    }

    #[tokio::test]
    async fn append_single_entry() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();
        let entry = snapshot_entry(saga_id, Sequence::first(), SagaStatus::Pending);

        let result = log.append(vec![entry], AppendOptions::expect_new()).await;
        assert_eq!(result.unwrap(), Sequence::first());

        let entries = log.entries_for_saga(saga_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::InstanceSnapshot);
    }

    #[tokio::test]
    async fn append_multiple_entries() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        let entries = vec![
            snapshot_entry(saga_id, Sequence::new(1), SagaStatus::Pending),
            outcome_entry(saga_id, Sequence::new(2)),
            outcome_entry(saga_id, Sequence::new(3)),
        ];

        let result = log.append(entries, AppendOptions::expect_new()).await;
        assert_eq!(result.unwrap(), Sequence::new(3));

        let stored = log.entries_for_saga(saga_id).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn sequence_conflict_on_wrong_expected() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        let first = snapshot_entry(saga_id, Sequence::first(), SagaStatus::Pending);
        log.append(vec![first], AppendOptions::expect_new())
            .await
            .unwrap();

        // Another writer expecting an empty saga loses the race
        let second = outcome_entry(saga_id, Sequence::new(2));
        let result = log
            .append(vec![second], AppendOptions::expect_sequence(Sequence::initial()))
            .await;

        assert!(matches!(
            result,
            Err(SagaLogError::SequenceConflict { .. })
        ));
    }

    #[tokio::test]
    async fn append_with_matching_expected_sequence() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        let first = snapshot_entry(saga_id, Sequence::first(), SagaStatus::Pending);
        log.append(vec![first], AppendOptions::expect_new())
            .await
            .unwrap();

        let second = outcome_entry(saga_id, Sequence::new(2));
        let result = log
            .append(vec![second], AppendOptions::expect_sequence(Sequence::first()))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn duplicate_sequence_rejected_without_expected() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        let first = snapshot_entry(saga_id, Sequence::first(), SagaStatus::Pending);
        log.append(vec![first], AppendOptions::new()).await.unwrap();

        let duplicate = outcome_entry(saga_id, Sequence::first());
        let result = log.append(vec![duplicate], AppendOptions::new()).await;
        assert!(matches!(
            result,
            Err(SagaLogError::SequenceConflict { .. })
        ));
    }

    #[tokio::test]
    async fn entries_from_sequence() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        let entries = vec![
            snapshot_entry(saga_id, Sequence::new(1), SagaStatus::Pending),
            outcome_entry(saga_id, Sequence::new(2)),
            outcome_entry(saga_id, Sequence::new(3)),
        ];
        log.append(entries, AppendOptions::new()).await.unwrap();

        let from_2 = log
            .entries_for_saga_from(saga_id, Sequence::new(2))
            .await
            .unwrap();
        assert_eq!(from_2.len(), 2);
        assert_eq!(from_2[0].sequence, Sequence::new(2));
        assert_eq!(from_2[1].sequence, Sequence::new(3));
    }

    #[tokio::test]
    async fn latest_snapshot_picks_newest() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        let entries = vec![
            snapshot_entry(saga_id, Sequence::new(1), SagaStatus::Pending),
            outcome_entry(saga_id, Sequence::new(2)),
            snapshot_entry(saga_id, Sequence::new(3), SagaStatus::Running),
            outcome_entry(saga_id, Sequence::new(4)),
        ];
        log.append(entries, AppendOptions::new()).await.unwrap();

        let snapshot = log.latest_snapshot(saga_id).await.unwrap().unwrap();
        assert_eq!(snapshot.sequence, Sequence::new(3));
        assert_eq!(snapshot.status, SagaStatus::Running);
    }

    #[tokio::test]
    async fn load_saga_returns_snapshot_and_tail() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        let entries = vec![
            snapshot_entry(saga_id, Sequence::new(1), SagaStatus::Pending),
            snapshot_entry(saga_id, Sequence::new(2), SagaStatus::Running),
            outcome_entry(saga_id, Sequence::new(3)),
            outcome_entry(saga_id, Sequence::new(4)),
        ];
        log.append(entries, AppendOptions::new()).await.unwrap();

        use crate::log::SagaLogExt;
        let (snapshot, tail) = log.load_saga(saga_id).await.unwrap();
        assert_eq!(snapshot.unwrap().sequence, Sequence::new(2));
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, Sequence::new(3));
    }

    #[tokio::test]
    async fn load_incomplete_filters_terminal_sagas() {
        let log = InMemorySagaLog::new();
        let running = SagaId::new();
        let finished = SagaId::new();
        let compensating = SagaId::new();

        log.append(
            vec![snapshot_entry(running, Sequence::new(1), SagaStatus::Running)],
            AppendOptions::new(),
        )
        .await
        .unwrap();
        log.append(
            vec![
                snapshot_entry(finished, Sequence::new(1), SagaStatus::Running),
                snapshot_entry(finished, Sequence::new(2), SagaStatus::Completed),
            ],
            AppendOptions::new(),
        )
        .await
        .unwrap();
        log.append(
            vec![snapshot_entry(
                compensating,
                Sequence::new(1),
                SagaStatus::Compensating,
            )],
            AppendOptions::new(),
        )
        .await
        .unwrap();

        let incomplete = log.load_incomplete().await.unwrap();
        assert_eq!(incomplete.len(), 2);
        assert!(incomplete.contains(&running));
        assert!(incomplete.contains(&compensating));
        assert!(!incomplete.contains(&finished));
    }

    #[tokio::test]
    async fn stream_all_entries() {
        use futures_util::StreamExt;

        let log = InMemorySagaLog::new();
        let id1 = SagaId::new();
        let id2 = SagaId::new();

        log.append(
            vec![snapshot_entry(id1, Sequence::first(), SagaStatus::Pending)],
            AppendOptions::new(),
        )
        .await
        .unwrap();
        log.append(
            vec![snapshot_entry(id2, Sequence::first(), SagaStatus::Pending)],
            AppendOptions::new(),
        )
        .await
        .unwrap();

        let stream = log.stream_all_entries().await.unwrap();
        let entries: Vec<_> = stream.collect().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.is_ok()));
    }

    #[tokio::test]
    async fn current_sequence_tracks_latest() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        assert!(log.current_sequence(saga_id).await.unwrap().is_none());

        let entries = vec![
            snapshot_entry(saga_id, Sequence::new(1), SagaStatus::Pending),
            outcome_entry(saga_id, Sequence::new(2)),
        ];
        log.append(entries, AppendOptions::new()).await.unwrap();

        let sequence = log.current_sequence(saga_id).await.unwrap();
        assert_eq!(sequence, Some(Sequence::new(2)));
    }

    #[tokio::test]
    async fn fail_appends_simulates_outage() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();

        log.set_fail_appends(true).await;
        let entry = snapshot_entry(saga_id, Sequence::first(), SagaStatus::Pending);
        let result = log.append(vec![entry], AppendOptions::new()).await;
        assert!(matches!(result, Err(SagaLogError::Database(_))));
        assert_eq!(log.entry_count().await, 0);

        log.set_fail_appends(false).await;
        let entry = snapshot_entry(saga_id, Sequence::first(), SagaStatus::Pending);
        assert!(log.append(vec![entry], AppendOptions::new()).await.is_ok());
    }
}
