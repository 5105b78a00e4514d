use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EntryId, EntryKind, LogEntry, Result, SagaId, SagaLogError, SagaStatus, Sequence,
    log::{AppendOptions, EntryStream, SagaLog, validate_entries_for_append},
};

/// PostgreSQL-backed saga log implementation.
#[derive(Clone)]
pub struct PostgresSagaLog {
    pool: PgPool,
}

impl PostgresSagaLog {
    /// Creates a new PostgreSQL saga log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_entry(row: PgRow) -> Result<LogEntry> {
        let kind_str: String = row.try_get("kind")?;
        let kind = EntryKind::parse(&kind_str)
            .ok_or_else(|| SagaLogError::InvalidEntry(format!("Unknown entry kind: {kind_str}")))?;
        let status_str: String = row.try_get("status")?;
        let status = SagaStatus::parse(&status_str).ok_or_else(|| {
            SagaLogError::InvalidEntry(format!("Unknown saga status: {status_str}"))
        })?;

        Ok(LogEntry {
            entry_id: EntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            sequence: Sequence::new(row.try_get("sequence")?),
            kind,
            status,
            recorded_at: row.try_get("recorded_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

#[async_trait]
impl SagaLog for PostgresSagaLog {
    async fn append(&self, entries: Vec<LogEntry>, options: AppendOptions) -> Result<Sequence> {
        validate_entries_for_append(&entries)
            .map_err(|e| SagaLogError::InvalidEntry(e.message))?;

        let first_entry = &entries[0];
        let saga_id = first_entry.saga_id;

        // Start a transaction
        let mut tx = self.pool.begin().await?;

        // Check expected sequence if specified
        if let Some(expected) = options.expected_sequence {
            let current_sequence: Option<i64> =
                sqlx::query_scalar("SELECT MAX(sequence) FROM saga_log WHERE saga_id = $1")
                    .bind(saga_id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;

            let actual = Sequence::new(current_sequence.unwrap_or(0));

            if actual != expected {
                metrics::counter!("saga_log_append_conflicts_total").increment(1);
                tracing::warn!(
                    saga_id = %saga_id,
                    expected = %expected,
                    actual = %actual,
                    "sequence conflict on append"
                );
                return Err(SagaLogError::SequenceConflict {
                    saga_id,
                    expected,
                    actual,
                });
            }
        }

        // Insert all entries
        let mut last_sequence = Sequence::initial();
        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO saga_log (id, saga_id, sequence, kind, status, recorded_at, payload)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(entry.entry_id.as_uuid())
            .bind(entry.saga_id.as_uuid())
            .bind(entry.sequence.as_i64())
            .bind(entry.kind.as_str())
            .bind(entry.status.as_str())
            .bind(entry.recorded_at)
            .bind(&entry.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // Check if this is a unique constraint violation (sequence conflict)
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_saga_sequence")
                {
                    metrics::counter!("saga_log_append_conflicts_total").increment(1);
                    return SagaLogError::SequenceConflict {
                        saga_id,
                        expected: options.expected_sequence.unwrap_or(Sequence::initial()),
                        actual: entry.sequence,
                    };
                }
                SagaLogError::Database(e)
            })?;

            last_sequence = entry.sequence;
        }

        tx.commit().await?;
        tracing::debug!(saga_id = %saga_id, sequence = %last_sequence, "appended saga log entries");
        Ok(last_sequence)
    }

    async fn entries_for_saga(&self, saga_id: SagaId) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, saga_id, sequence, kind, status, recorded_at, payload
            FROM saga_log
            WHERE saga_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn entries_for_saga_from(
        &self,
        saga_id: SagaId,
        from_sequence: Sequence,
    ) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, saga_id, sequence, kind, status, recorded_at, payload
            FROM saga_log
            WHERE saga_id = $1 AND sequence >= $2
            ORDER BY sequence ASC
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(from_sequence.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn latest_snapshot(&self, saga_id: SagaId) -> Result<Option<LogEntry>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, saga_id, sequence, kind, status, recorded_at, payload
            FROM saga_log
            WHERE saga_id = $1 AND kind = $2
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(EntryKind::InstanceSnapshot.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn current_sequence(&self, saga_id: SagaId) -> Result<Option<Sequence>> {
        let sequence: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM saga_log WHERE saga_id = $1")
                .bind(saga_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(sequence.map(Sequence::new))
    }

    async fn load_incomplete(&self) -> Result<Vec<SagaId>> {
        // Latest entry per saga decides whether the saga is still in flight
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (saga_id) saga_id, status
            FROM saga_log
            ORDER BY saga_id ASC, sequence DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut incomplete = Vec::new();
        for row in rows {
            let status_str: String = row.try_get("status")?;
            let status = SagaStatus::parse(&status_str).ok_or_else(|| {
                SagaLogError::InvalidEntry(format!("Unknown saga status: {status_str}"))
            })?;
            if !status.is_terminal() {
                incomplete.push(SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?));
            }
        }
        Ok(incomplete)
    }

    async fn stream_all_entries(&self) -> Result<EntryStream> {
        use futures_util::StreamExt;

        // Rows are forwarded through a bounded channel so the returned
        // stream owns no borrow of the pool.
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let mut rows = sqlx::query(
                r#"
                SELECT id, saga_id, sequence, kind, status, recorded_at, payload
                FROM saga_log
                ORDER BY recorded_at ASC, id ASC
                "#,
            )
            .fetch(&pool);

            while let Some(row) = rows.next().await {
                let item = match row {
                    Ok(row) => Self::row_to_entry(row),
                    Err(e) => Err(SagaLogError::Database(e)),
                };
                // Receiver dropped means the consumer stopped reading
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}
