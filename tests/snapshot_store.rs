use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;

use hiring_pipeline::workflows::pipeline::{
    ApplicationId, ApplicationStageLedger, MemoryPipelineStore, PipelineSnapshot,
    RepositoryError, StageId,
};
use serde_json::json;

fn snapshot() -> PipelineSnapshot {
    serde_json::from_value(json!({
        "jobs": [{ "id": "job-data", "title": "Data Engineer" }],
        "stages": [
            { "id": "stage-screen", "job_id": "job-data", "name": "Screen", "order_index": 1 },
            { "id": "stage-onsite", "job_id": "job-data", "name": "Onsite", "order_index": 2 }
        ],
        "candidates": [{ "id": "cand-9", "name": "Edgar Codd" }],
        "applications": [{ "id": "app-9", "job_id": "job-data", "candidate_id": "cand-9" }]
    }))
    .expect("snapshot fixture parses")
}

#[test]
fn snapshot_survives_a_file_round_trip() {
    let store = Arc::new(MemoryPipelineStore::from_snapshot(snapshot()).expect("store"));
    let ledger = ApplicationStageLedger::new(store.clone());
    let application = ApplicationId("app-9".to_string());
    let screen = ledger.enroll(&application).expect("enroll");
    ledger
        .move_bulk(&[screen], &StageId("stage-onsite".to_string()))
        .expect("move");
    let before = store.snapshot().expect("snapshot");

    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, &before).expect("write snapshot");
        writer.flush().expect("flush snapshot");
    }
    let reader = BufReader::new(File::open(file.path()).expect("reopen snapshot"));
    let restored: PipelineSnapshot = serde_json::from_reader(reader).expect("read snapshot");
    assert_eq!(restored, before);

    // The reloaded ledger sees the onsite row as the open one.
    let reloaded = Arc::new(MemoryPipelineStore::from_snapshot(restored).expect("reload"));
    let ledger = ApplicationStageLedger::new(reloaded);
    let onsite = ledger
        .ensure_open(&application, &StageId("stage-onsite".to_string()))
        .expect("onsite is open");
    let history = ledger.history(&application).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].id, onsite);
    assert!(!history[0].is_open());

    let raw = serde_json::to_value(&before).expect("to json");
    assert_eq!(raw["application_stages"][0]["occupancy"]["state"], "closed");
    assert_eq!(raw["application_stages"][1]["occupancy"]["state"], "open");
}

#[test]
fn snapshot_with_two_open_rows_for_a_pair_is_rejected() {
    let mut image = snapshot();
    let rows = json!([
        { "id": 1, "application_id": "app-9", "stage_id": "stage-screen", "status": "pending", "occupancy": { "state": "open" } },
        { "id": 2, "application_id": "app-9", "stage_id": "stage-screen", "status": "running", "occupancy": { "state": "open" } }
    ]);
    image.application_stages = serde_json::from_value(rows).expect("rows parse");

    match MemoryPipelineStore::from_snapshot(image) {
        Err(RepositoryError::Conflict) => {}
        Ok(_) => panic!("expected conflict, store was built"),
        Err(other) => panic!("expected conflict, got {other:?}"),
    }
}
