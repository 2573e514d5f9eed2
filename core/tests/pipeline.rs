use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;

use inspiral_core::{
    AnalysisParams, AnyTable, CoincInspiralTable, Ifo, JsonTableReader, MetaDataTable,
    SnglInspiral, TableError, TableType,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "inspiral-core-it-{}-{}",
        std::process::id(),
        name
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Two detector files from one coincidence stage, plus an unrelated bank.
fn write_documents(dir: &PathBuf) {
    fs::write(
        dir.join("H1-COIRE-1000-100.json"),
        json!({
            "process": [ { "program": "lalapps_coire", "process_id": "process:process_id:0" } ],
            "sngl_inspiral": [
                { "ifo": "H1", "snr": 5.0, "end_time": 1000, "end_time_ns": 0, "event_id": 100000500000_i64 },
                { "ifo": "H1", "snr": 10.0, "end_time": 2000, "end_time_ns": 0, "event_id": 200000600000_i64 },
                { "ifo": "H1", "snr": 6.0, "end_time": 1002, "end_time_ns": 0, "event_id": 300000500000_i64 },
            ],
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("L1-COIRE-1000-100.json"),
        json!({
            "sngl_inspiral": [
                // Fractional seconds, as some writers emit them.
                { "ifo": "L1", "snr": 4.0, "end_time": 1000.01, "event_id": 100000500000_i64 },
                { "ifo": "L1", "snr": 2.0, "end_time": 1002, "end_time_ns": 5_000_000, "event_id": 300000500000_i64 },
            ],
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("H1-TMPLTBANK-1000-100.json"),
        json!({ "sngl_inspiral": [ { "ifo": "H1", "snr": 0.0, "end_time": 0, "event_id": 0 } ] })
            .to_string(),
    )
    .unwrap();
}

#[test]
fn coincidences_from_files_cluster_to_the_loudest() {
    let dir = scratch_dir("pipeline");
    write_documents(&dir);
    let pattern = dir.join(".*-COIRE-.*\\.json");

    let sngls: MetaDataTable<SnglInspiral> =
        MetaDataTable::read(&JsonTableReader, pattern.to_str()).unwrap();
    assert_eq!(sngls.row_count(), 5);

    let coincs = CoincInspiralTable::build(&sngls).unwrap();
    assert_eq!(coincs.row_count(), 3);
    let numifos: Vec<usize> = coincs.iter().map(|c| c.numifos()).collect();
    assert_eq!(numifos, vec![2, 1, 2]);

    let doubles = coincs.filter_by_ifo_set(&[Ifo::H1, Ifo::L1]);
    assert_eq!(doubles.row_count(), 2);

    // 100000500000 (snrsq 41) and 300000500000 (snrsq 40) share the
    // 1000 s window.
    let clustered = doubles.cluster(Duration::from_secs(5)).unwrap();
    assert_eq!(clustered.row_count(), 1);
    assert_eq!(clustered.coincs()[0].event_id, 100000500000);

    let l1 = clustered.extract_singles(Ifo::L1);
    assert_eq!(l1.rows()[0].end_time_ns, 10_000_000);

    let slide5 = coincs.filter_by_slide(5);
    assert_eq!(slide5.row_count(), 2);
}

#[test]
fn runtime_table_selection() {
    let dir = scratch_dir("runtime");
    write_documents(&dir);
    let file = dir.join("H1-COIRE-1000-100.json");

    let procs = AnyTable::load(&JsonTableReader, file.to_str(), "process").unwrap();
    assert_eq!(procs.table_type(), TableType::Process);
    assert_eq!(procs.row_count(), 1);

    assert_matches!(
        AnyTable::load(&JsonTableReader, file.to_str(), "coinc_ringdown"),
        Err(TableError::UnknownTableType(_))
    );

    let empty = AnyTable::load(&JsonTableReader, None, "sngl_inspiral").unwrap();
    assert_eq!(empty.row_count(), 0);
}

#[test]
fn analysis_params_load_from_disk() {
    let dir = scratch_dir("params");
    let file = dir.join("params.json");
    fs::write(
        &file,
        json!({ "ifo_pattern": "H", "coinc_ifos": ["H1", "L1"], "cluster_window_s": 10.0 })
            .to_string(),
    )
    .unwrap();

    let params = AnalysisParams::from_json_file(&file).unwrap();
    assert_eq!(params.table, "sngl_inspiral");
    assert_eq!(params.ifo_pattern.as_deref(), Some("H"));
    assert_eq!(params.cluster_window_s, Some(10.0));
    assert!(params.wants_coincidences());
}
