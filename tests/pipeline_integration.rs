//! Integration tests for the registry maintenance pipeline
//!
//! Runs the library entry points in the order the nightly job does:
//! build the canonical index, repair registry pointers against it, then
//! measure pack coverage. Every run works inside a scratch repo root.

use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use universe_registry::universe::ndjson::{read_gzip_json, read_json};
use universe_registry::universe::publish::gzip_bytes;
use universe_registry::universe::{
    run_index_build, run_pack_coverage, run_parity_gate, run_pointer_repair, CanonicalIndex,
    GateMode, GateStatus, UniverseConfig,
};

fn write_gz(path: &Path, raw: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, gzip_bytes(raw.as_bytes()).unwrap()).unwrap();
}

fn write_plain(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn stock(canonical_id: &str, symbol: &str, pack: Option<&str>) -> Value {
    let mut row = json!({
        "canonical_id": canonical_id,
        "symbol": symbol,
        "type_norm": "STOCK",
        "bars_count": 300,
        "_quality_basis": "backfill_real",
    });
    if let Some(pack) = pack {
        row["pointers"] = json!({"history_pack": pack});
    }
    row
}

fn seed_repo(config: &UniverseConfig) {
    let history = config.path(&config.paths.history_root);
    write_gz(
        &history.join("pack_1.ndjson.gz"),
        "{\"canonical_id\":\"US:AAA\",\"bars\":[]}\n",
    );
    write_gz(
        &history.join("pack_2.ndjson.gz"),
        "{\"canonical_id\":\"US:BBB\",\"bars\":[]}\nnot json\n",
    );

    let rows = vec![
        // Drifted: AAA lives in pack_1.
        stock("US:AAA", "AAA", Some("history/pack_2.ndjson.gz")),
        // Missing pointer.
        stock("US:BBB", "BBB", None),
        // Phantom: no pack holds GONE.
        stock("US:GONE", "GONE", Some("history/pack_1.ndjson.gz")),
    ];
    let ndjson: String = rows.iter().map(|r| format!("{}\n", r)).collect();
    write_gz(&config.path(&config.paths.registry_ndjson), &ndjson);
    write_gz(
        &config.path(&config.paths.registry_snapshot),
        &json!({"schema": "rv_v7_registry_snapshot_v1", "records": rows}).to_string(),
    );
    write_plain(
        &config.path(&config.paths.ssot_symbols),
        &json!({"symbols": ["AAA", "BBB", "GONE"]}),
    );
}

#[test]
fn test_index_repair_coverage_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = UniverseConfig::default_for_root(dir.path());
    seed_repo(&config);

    let index_report = run_index_build(&config).unwrap();
    assert_eq!(index_report.counts.packs_scanned, 2);
    assert_eq!(index_report.counts.canonical_ids, 2);
    assert_eq!(index_report.counts.rows_malformed, 1);

    let index = CanonicalIndex::load(&config.path(&config.paths.pack_index)).unwrap();
    assert_eq!(index.candidates("US:AAA"), ["history/pack_1.ndjson.gz".to_string()]);

    let repair = run_pointer_repair(&config).unwrap();
    assert_eq!(repair.ndjson.total_touched, 3);
    assert_eq!(repair.snapshot.total_touched, 3);
    assert_eq!(repair.total_touched, 6);

    let rerun = run_pointer_repair(&config).unwrap();
    assert_eq!(rerun.total_touched, 0);

    let snapshot: Value = read_gzip_json(config.path(&config.paths.registry_snapshot)).unwrap();
    assert_eq!(snapshot["record_count"], json!(3));
    assert_eq!(
        snapshot["records"][0]["pointers"]["history_pack"],
        json!("history/pack_1.ndjson.gz")
    );
    assert_eq!(snapshot["records"][2]["pointers"], json!({}));

    // GONE lost its pointer, so only AAA and BBB are coverage candidates.
    let coverage = run_pack_coverage(&config).unwrap();
    assert_eq!(coverage.pack_match.total_candidates, 2);
    assert_eq!(coverage.pack_match.found_in_pack, 2);
    assert_eq!(coverage.pack_match.found_ratio_pct, 100.0);

    let missing: Value = read_json(config.path(&config.paths.pack_missing_ids)).unwrap();
    assert_eq!(missing["canonical_ids"], json!([]));
}

#[test]
fn test_parity_gate_enforce_blocks_on_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = UniverseConfig::default_for_root(dir.path());
    config.parity.tracked_features = vec!["forecast".to_string()];
    seed_repo(&config);
    write_plain(
        &config.path(&config.paths.by_feature),
        &json!({"symbols": {"forecast": ["AAA", "BBB"]}}),
    );

    let report = run_parity_gate(&config, GateMode::Enforce).unwrap();
    assert_eq!(report.status, GateStatus::Fail);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        report.set_parity["forecast"].missing_from_feature,
        vec!["GONE".to_string()]
    );

    let relaxed = run_parity_gate(&config, GateMode::Report).unwrap();
    assert_eq!(relaxed.status, GateStatus::Warn);
    assert_eq!(relaxed.exit_code(), 0);
}
