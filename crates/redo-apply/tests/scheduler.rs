mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use checkpoint::{CheckpointKey, CheckpointStore, FilesystemStore, MemoryStore};
use common::{context, malformed, statement, stored_marker, RecordingGateway};
use redo_apply::{apply_log_unit, group_by_table, ApplyConfig, ApplyError};
use sync_core::{OperationKind, ReplicationMarker};

fn log_unit(entries: Vec<(&str, Vec<u64>)>) -> BTreeMap<String, Vec<sync_core::ChangeRecord>> {
    entries
        .into_iter()
        .map(|(table, scns)| {
            let records = scns.into_iter().map(|scn| statement(table, scn)).collect();
            (table.to_string(), records)
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cycle_applies_tables_and_skips_idle_ones() {
    let gateway = Arc::new(RecordingGateway::new().with_delay(Duration::from_millis(20)));
    let store = Arc::new(MemoryStore::new());
    let config = ApplyConfig {
        apply_threads: 2,
        ..Default::default()
    };
    let ctx = context(gateway.clone(), store.clone(), config);

    let tables = log_unit(vec![
        ("A", vec![10]),
        ("B", vec![]),
        ("C", vec![11, 12]),
        ("D", vec![13]),
        ("E", vec![14]),
    ]);
    let report = apply_log_unit(&ctx, tables).await.unwrap();

    assert_eq!(report.idle_tables, vec!["B"]);
    let applied: Vec<(&str, usize)> = report
        .tables
        .iter()
        .map(|t| (t.table.as_str(), t.applied))
        .collect();
    assert_eq!(applied, vec![("A", 1), ("C", 2), ("D", 1), ("E", 1)]);
    assert_eq!(report.applied(), 5);
    // One worker per table and exactly two tables at once
    assert_eq!(gateway.max_in_flight(), 2);

    assert_eq!(
        stored_marker(store.as_ref(), "C").await,
        Some(ReplicationMarker::new(12, 12))
    );
    assert_eq!(stored_marker(store.as_ref(), "B").await, None);
}

#[tokio::test]
async fn test_cycle_error_names_failed_tables() {
    let gateway = Arc::new(RecordingGateway::new().failing_on("B-21"));
    let store = Arc::new(MemoryStore::new());
    let ctx = context(gateway.clone(), store.clone(), ApplyConfig::default());

    let tables = log_unit(vec![("A", vec![20]), ("B", vec![21, 22]), ("C", vec![23])]);
    let err = apply_log_unit(&ctx, tables).await.unwrap_err();

    let ApplyError::Cycle { total, failures } = &err else {
        panic!("expected cycle error, got {err:?}");
    };
    assert_eq!(*total, 3);
    assert_eq!(err.failed_tables(), vec!["B"]);
    assert!(matches!(failures[0].error, ApplyError::Apply { .. }));
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("[B]"));

    // The healthy tables still committed
    assert_eq!(
        stored_marker(store.as_ref(), "A").await,
        Some(ReplicationMarker::new(20, 20))
    );
    assert_eq!(
        stored_marker(store.as_ref(), "C").await,
        Some(ReplicationMarker::new(23, 23))
    );
}

#[tokio::test]
async fn test_cycle_with_translation_failure_is_fatal() {
    let gateway = Arc::new(RecordingGateway::new());
    let store = Arc::new(MemoryStore::new());
    let ctx = context(gateway.clone(), store.clone(), ApplyConfig::default());

    let mut tables = log_unit(vec![("A", vec![30])]);
    tables.insert("B".to_string(), vec![malformed("B", 31)]);

    let err = apply_log_unit(&ctx, tables).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.failed_tables(), vec!["B"]);
}

#[tokio::test]
async fn test_all_idle_cycle_succeeds() {
    let gateway = Arc::new(RecordingGateway::new());
    let store = Arc::new(MemoryStore::new());
    let ctx = context(gateway.clone(), store, ApplyConfig::default());

    let report = apply_log_unit(&ctx, log_unit(vec![("A", vec![]), ("B", vec![])]))
        .await
        .unwrap();
    assert!(report.tables.is_empty());
    assert_eq!(report.idle_tables, vec!["A", "B"]);
    assert_eq!(gateway.attempted(), 0);
}

// =============================================================================
// Restart
// =============================================================================

#[tokio::test]
async fn test_replayed_log_unit_does_not_regress_checkpoints() {
    let dir = tempfile::TempDir::new().unwrap();
    let gateway = Arc::new(RecordingGateway::new());

    let unit = vec![
        statement("orders", 103),
        statement("items", 104),
        statement("orders", 105),
    ];
    let tables = vec!["orders".to_string(), "items".to_string()];

    {
        let store = Arc::new(FilesystemStore::new(dir.path()));
        let ctx = context(gateway.clone(), store, ApplyConfig::default());
        let report = apply_log_unit(&ctx, group_by_table(unit.clone(), "MARVIN", &tables))
            .await
            .unwrap();
        assert_eq!(report.applied(), 3);
    }

    // Restart on the same checkpoint directory and replay the same unit
    let store = Arc::new(FilesystemStore::new(dir.path()));
    let ctx = context(gateway.clone(), store.clone(), ApplyConfig::default());
    let report = apply_log_unit(&ctx, group_by_table(unit, "MARVIN", &tables))
        .await
        .unwrap();

    assert_eq!(report.applied(), 0);
    let skipped: usize = report.tables.iter().map(|t| t.skipped_by_checkpoint).sum();
    assert_eq!(skipped, 3);
    assert_eq!(gateway.statements().len(), 3);

    let key = CheckpointKey::new("MARVIN", "ORDERS");
    assert!(!store
        .advance(&key, OperationKind::Insert, ReplicationMarker::new(103, 103))
        .await
        .unwrap());
    assert_eq!(
        stored_marker(store.as_ref(), "ORDERS").await,
        Some(ReplicationMarker::new(105, 105))
    );
}
