//! End-to-end incremental apply from JSONL log units into a recording
//! gateway, with filesystem checkpoints surviving a restart.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::{CheckpointKey, CheckpointStore, FilesystemStore};
use redo_apply::{ApplyConfig, ApplyContext, JsonlChangeSource};
use sync_core::{ExecutionGateway, QueryOutput, ReplicationMarker};
use transfer_sync::incremental::run_incremental;

#[derive(Default)]
struct RecordingGateway {
    batches: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ExecutionGateway for RecordingGateway {
    async fn execute(&self, statement: &str) -> Result<QueryOutput> {
        self.batches.lock().unwrap().push(vec![statement.to_string()]);
        Ok(QueryOutput::default())
    }

    async fn execute_batch(&self, statements: &[String]) -> Result<u64> {
        self.batches.lock().unwrap().push(statements.to_vec());
        Ok(statements.len() as u64)
    }
}

fn change(table: &str, scn: u64, op: &str, content: &str) -> String {
    change_in("MARVIN", table, scn, op, content)
}

fn change_in(schema: &str, table: &str, scn: u64, op: &str, content: &str) -> String {
    format!(
        r#"{{"source_schema":"{schema}","source_table":"{table}","operation":"{op}","marker":{{"global_scn":{scn},"table_scn":{scn}}},"content":{content}}}"#
    )
}

fn write_unit(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

fn context(gateway: Arc<RecordingGateway>, store: Arc<FilesystemStore>) -> ApplyContext {
    let config = ApplyConfig {
        lowercase_table_names: true,
        ..Default::default()
    };
    ApplyContext::new("steven", gateway, store, config)
}

#[tokio::test]
async fn test_log_units_apply_and_resume() {
    let dir = tempfile::TempDir::new().unwrap();
    let checkpoints = dir.path().join("checkpoints");

    let unit1 = write_unit(
        dir.path(),
        "unit-1.jsonl",
        &[
            change("ORDERS", 100, "INSERT", r#"{"type":"row","after":{"ID":"1","NOTE":null}}"#),
            change("ITEMS", 101, "INSERT", r#"{"type":"statement","sql":"INSERT INTO `steven`.`items` VALUES (7);"}"#),
            change("ORDERS", 102, "UPDATE", r#"{"type":"row","before":{"ID":"1","NOTE":null},"after":{"ID":"1","NOTE":"x"}}"#),
        ],
    );
    let unit2 = write_unit(
        dir.path(),
        "unit-2.jsonl",
        &[change("ORDERS", 103, "DELETE", r#"{"type":"row","before":{"ID":"1","NOTE":"x"}}"#)],
    );

    let gateway = Arc::new(RecordingGateway::default());
    let store = Arc::new(FilesystemStore::new(&checkpoints));
    let ctx = context(gateway.clone(), store.clone());
    let tables = vec!["orders".to_string(), "items".to_string()];

    let mut source = JsonlChangeSource::new(vec![unit1.clone(), unit2.clone()]);
    let summary = run_incremental(&ctx, &mut source, "MARVIN", &tables).await.unwrap();
    assert_eq!(summary.log_units, 2);
    assert_eq!(summary.payloads, 4);

    let statements: Vec<String> = gateway.batches.lock().unwrap().iter().flatten().cloned().collect();
    assert!(statements.contains(&"INSERT INTO `steven`.`orders` (`ID`,`NOTE`) VALUES ('1',NULL)".to_string()));
    assert!(statements.contains(&"DELETE FROM `steven`.`orders` WHERE `ID` = '1' AND `NOTE` IS NULL LIMIT 1".to_string()));
    assert!(statements.contains(&"DELETE FROM `steven`.`orders` WHERE `ID` = '1' AND `NOTE` = 'x' LIMIT 1".to_string()));
    assert!(statements.contains(&"INSERT INTO `steven`.`items` VALUES (7)".to_string()));

    let orders = store
        .read_checkpoint(&CheckpointKey::new("MARVIN", "ORDERS"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(orders.marker, ReplicationMarker::new(103, 103));

    // Restart from the same checkpoint directory and replay both units
    let replay_gateway = Arc::new(RecordingGateway::default());
    let ctx = context(replay_gateway.clone(), Arc::new(FilesystemStore::new(&checkpoints)));
    let mut source = JsonlChangeSource::new(vec![unit1, unit2]);
    let summary = run_incremental(&ctx, &mut source, "MARVIN", &tables).await.unwrap();

    assert_eq!(summary.payloads, 0);
    assert!(replay_gateway.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_record_stops_replication() {
    let dir = tempfile::TempDir::new().unwrap();
    let unit = write_unit(
        dir.path(),
        "unit-1.jsonl",
        &[
            change("ORDERS", 100, "INSERT", r#"{"type":"statement","sql":"  "}"#),
        ],
    );
    let never_reached = write_unit(
        dir.path(),
        "unit-2.jsonl",
        &[change("ORDERS", 101, "INSERT", r#"{"type":"statement","sql":"INSERT INTO o VALUES (1)"}"#)],
    );

    let gateway = Arc::new(RecordingGateway::default());
    let ctx = context(
        gateway.clone(),
        Arc::new(FilesystemStore::new(dir.path().join("checkpoints"))),
    );
    let mut source = JsonlChangeSource::new(vec![unit, never_reached]);

    let err = run_incremental(&ctx, &mut source, "MARVIN", &[]).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Log unit 1 failed"));
    assert!(message.contains("empty redo statement"));
    assert!(gateway.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_same_table_in_other_schema_is_ignored() {
    let dir = tempfile::TempDir::new().unwrap();
    let unit = write_unit(
        dir.path(),
        "unit-1.jsonl",
        &[
            change("ORDERS", 1, "INSERT", r#"{"type":"statement","sql":"INSERT INTO `steven`.`orders` VALUES (1)"}"#),
            change_in("HR", "ORDERS", 2, "INSERT", r#"{"type":"statement","sql":"INSERT INTO `steven`.`orders` VALUES (2)"}"#),
        ],
    );

    let gateway = Arc::new(RecordingGateway::default());
    let store = Arc::new(FilesystemStore::new(dir.path().join("checkpoints")));
    let ctx = context(gateway.clone(), store.clone());
    let mut source = JsonlChangeSource::new(vec![unit]);

    let summary = run_incremental(&ctx, &mut source, "MARVIN", &["orders".to_string()])
        .await
        .unwrap();
    assert_eq!(summary.payloads, 1);

    let statements: Vec<String> = gateway.batches.lock().unwrap().iter().flatten().cloned().collect();
    assert_eq!(statements, vec!["INSERT INTO `steven`.`orders` VALUES (1)"]);
    assert!(store
        .read_checkpoint(&CheckpointKey::new("HR", "ORDERS"))
        .await
        .unwrap()
        .is_none());
}
