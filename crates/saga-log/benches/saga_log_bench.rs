use common::{SagaId, SagaStatus};
use criterion::{Criterion, criterion_group, criterion_main};
use saga_log::{
    AppendOptions, EntryKind, InMemorySagaLog, LogEntry, SagaLogExt, Sequence, log::SagaLog,
};

fn make_entry(saga_id: SagaId, sequence: i64, kind: EntryKind) -> LogEntry {
    LogEntry::builder()
        .saga_id(saga_id)
        .sequence(Sequence::new(sequence))
        .kind(kind)
        .status(SagaStatus::Running)
        .payload_raw(serde_json::json!({
            "step_name": "reserve-inventory",
            "attempt": 1,
            "output": {
                "reservation_id": "00000000-0000-0000-0000-000000000001"
            }
        }))
        .build()
}

fn bench_append_single_entry(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("saga_log/append_single_entry", |b| {
        b.iter(|| {
            rt.block_on(async {
                let log = InMemorySagaLog::new();
                let saga_id = SagaId::new();
                let entry = make_entry(saga_id, 1, EntryKind::InstanceSnapshot);
                log.append(vec![entry], AppendOptions::new()).await.unwrap();
            });
        });
    });
}

fn bench_append_with_sequence_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("saga_log/append_with_sequence_check", |b| {
        b.iter(|| {
            rt.block_on(async {
                let log = InMemorySagaLog::new();
                let saga_id = SagaId::new();
                let entry = make_entry(saga_id, 1, EntryKind::InstanceSnapshot);
                log.append(vec![entry], AppendOptions::expect_new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_entries_for_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemorySagaLog::new();
    let saga_id = SagaId::new();

    // Pre-populate with 100 entries
    rt.block_on(async {
        let entries: Vec<LogEntry> = (1..=100)
            .map(|s| make_entry(saga_id, s, EntryKind::StepOutcome))
            .collect();
        log.append(entries, AppendOptions::new()).await.unwrap();
    });

    c.bench_function("saga_log/entries_for_saga_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                log.entries_for_saga(saga_id).await.unwrap();
            });
        });
    });
}

fn bench_load_saga_with_snapshots(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemorySagaLog::new();
    let saga_id = SagaId::new();

    // Snapshot every tenth entry, outcomes in between
    rt.block_on(async {
        let entries: Vec<LogEntry> = (1..=100)
            .map(|s| {
                let kind = if s % 10 == 1 {
                    EntryKind::InstanceSnapshot
                } else {
                    EntryKind::StepOutcome
                };
                make_entry(saga_id, s, kind)
            })
            .collect();
        log.append(entries, AppendOptions::new()).await.unwrap();
    });

    c.bench_function("saga_log/load_saga_snapshot_tail", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (snapshot, tail) = log.load_saga(saga_id).await.unwrap();
                assert!(snapshot.is_some());
                assert_eq!(tail.len(), 9);
            });
        });
    });
}

fn bench_load_incomplete(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemorySagaLog::new();

    // 50 finished sagas, 50 in flight
    rt.block_on(async {
        for i in 0..100 {
            let saga_id = SagaId::new();
            let status = if i % 2 == 0 {
                SagaStatus::Completed
            } else {
                SagaStatus::Running
            };
            let entry = LogEntry::builder()
                .saga_id(saga_id)
                .sequence(Sequence::first())
                .kind(EntryKind::InstanceSnapshot)
                .status(status)
                .payload_raw(serde_json::json!({}))
                .build();
            log.append(vec![entry], AppendOptions::new()).await.unwrap();
        }
    });

    c.bench_function("saga_log/load_incomplete_100_sagas", |b| {
        b.iter(|| {
            rt.block_on(async {
                let incomplete = log.load_incomplete().await.unwrap();
                assert_eq!(incomplete.len(), 50);
            });
        });
    });
}

fn bench_stream_all_entries(c: &mut Criterion) {
    use futures_util::StreamExt;

    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemorySagaLog::new();

    // Pre-populate with 1000 entries across 10 sagas
    rt.block_on(async {
        for _ in 0..10 {
            let saga_id = SagaId::new();
            let entries: Vec<LogEntry> = (1..=100)
                .map(|s| make_entry(saga_id, s, EntryKind::StepOutcome))
                .collect();
            log.append(entries, AppendOptions::new()).await.unwrap();
        }
    });

    c.bench_function("saga_log/stream_1000_entries", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut stream = log.stream_all_entries().await.unwrap();
                let mut count = 0;
                while let Some(result) = stream.next().await {
                    result.unwrap();
                    count += 1;
                }
                assert_eq!(count, 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_entry,
    bench_append_with_sequence_check,
    bench_entries_for_saga,
    bench_load_saga_with_snapshots,
    bench_load_incomplete,
    bench_stream_all_entries,
);
criterion_main!(benches);
