//! Pack Coverage Tests

use crate::universe::config::UniverseConfig;
use crate::universe::pack_coverage::{
    best_candidates, match_packs, run_pack_coverage, Candidate, MissReason,
};
use crate::universe::test_support::{pack_row, read_json, stock_row, write_gz_json, write_gz_lines, write_json};
use serde_json::json;
use std::collections::BTreeSet;

fn seed(config: &UniverseConfig) {
    let base = config.path(&config.paths.history_base);
    write_gz_lines(
        &base.join("history/pack_1.ndjson.gz"),
        &[pack_row("US:AAA"), pack_row("US:OTHER")],
    );
    write_gz_lines(&base.join("history/pack_2.ndjson.gz"), &[pack_row("US:ZZZ")]);
    write_gz_lines(&base.join("history/pack_3.ndjson.gz"), &[pack_row("US:BBB")]);

    let mut weaker_aaa = stock_row("US:AAA.OLD", "AAA", Some("history/pack_2.ndjson.gz"));
    weaker_aaa["_quality_basis"] = json!("estimated");
    weaker_aaa["bars_count"] = json!(5000);
    let mut etf = stock_row("US:DDD", "DDD", Some("history/pack_1.ndjson.gz"));
    etf["type_norm"] = json!("ETF");

    let rows = vec![
        weaker_aaa.to_string(),
        stock_row("US:AAA", "AAA", Some("history/pack_1.ndjson.gz")).to_string(),
        // BBB points at pack_2, but its rows live in pack_3.
        stock_row("US:BBB", "BBB", Some("history/pack_2.ndjson.gz")).to_string(),
        stock_row("US:CCC", "CCC", Some("history/pack_gone.ndjson.gz")).to_string(),
        stock_row("US:EEE", "EEE", None).to_string(),
        stock_row("US:NOTSSOT", "NOTSSOT", Some("history/pack_1.ndjson.gz")).to_string(),
        etf.to_string(),
        "{broken".to_string(),
    ];
    write_gz_lines(&config.path(&config.paths.registry_ndjson), &rows);
    write_json(
        &config.path(&config.paths.ssot_symbols),
        &json!({"symbols": ["AAA", "BBB", "CCC", "DDD", "EEE"]}),
    );
}

#[test]
fn test_best_candidates_pick_ranked_row_per_ticker() {
    let dir = tempfile::tempdir().unwrap();
    let config = UniverseConfig::default_for_root(dir.path());
    seed(&config);

    let universe: BTreeSet<String> = ["AAA", "BBB", "CCC", "DDD", "EEE"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let candidates = best_candidates(&config.path(&config.paths.registry_ndjson), &universe).unwrap();
    let tickers: Vec<&str> = candidates.iter().map(|c| c.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["AAA", "BBB", "CCC"]);
    assert_eq!(candidates[0].canonical_id, "US:AAA");
    assert_eq!(candidates[0].history_pack, "history/pack_1.ndjson.gz");
}

#[test]
fn test_match_packs_classifies_misses() {
    let dir = tempfile::tempdir().unwrap();
    let config = UniverseConfig::default_for_root(dir.path());
    seed(&config);
    let candidates = vec![
        Candidate {
            ticker: "AAA".into(),
            canonical_id: "US:AAA".into(),
            history_pack: "history/pack_1.ndjson.gz".into(),
        },
        Candidate {
            ticker: "BBB".into(),
            canonical_id: "US:BBB".into(),
            history_pack: "history/pack_2.ndjson.gz".into(),
        },
        Candidate {
            ticker: "CCC".into(),
            canonical_id: "US:CCC".into(),
            history_pack: "history/pack_gone.ndjson.gz".into(),
        },
    ];

    let (result, missing) = match_packs(&candidates, &config.path(&config.paths.history_base), 1);
    assert_eq!(result.scanned_packs, 3);
    assert_eq!(result.total_candidates, 3);
    assert_eq!(result.found_in_pack, 1);
    assert_eq!(result.missing_in_pack, 2);
    assert_eq!(result.missing_pack_file, 1);
    assert_eq!(result.found_ratio_pct, 33.33);
    assert_eq!(result.missing_ratio_pct, 66.67);
    assert_eq!(missing, vec!["US:BBB".to_string(), "US:CCC".to_string()]);
    // Sample is capped, the missing list is not.
    assert_eq!(result.missing_sample.len(), 1);
    assert_eq!(result.missing_sample[0].reason, MissReason::CanonicalMissingInPack);
}

#[test]
fn test_run_resolves_misses_through_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = UniverseConfig::default_for_root(dir.path());
    seed(&config);
    write_gz_json(
        &config.path(&config.paths.pack_index),
        &json!({"by_canonical_id": {
            "US:AAA": ["history/pack_1.ndjson.gz"],
            "US:BBB": ["history/pack_3.ndjson.gz"]
        }}),
    );

    let report = run_pack_coverage(&config).unwrap();
    let m = &report.pack_match;
    assert_eq!(report.universe.symbols_total, 5);
    assert_eq!(report.universe.registry_best_rows, 3);
    assert_eq!(m.found_in_pack, 1);
    assert_eq!(m.resolved_in_any_pack, 1);
    assert_eq!(m.resolved_found_in_pack, 2);
    assert_eq!(m.resolved_missing_in_pack, 1);
    assert_eq!(m.resolved_ratio_pct, 66.67);
    assert!(report.sources.history_pack_index.is_some());

    let list = read_json(&config.path(&config.paths.pack_missing_ids));
    assert_eq!(list["canonical_ids"], json!(["US:BBB", "US:CCC"]));
    let on_disk = read_json(&config.path(&config.paths.pack_coverage_report));
    assert_eq!(on_disk["pack_match"]["missing_sample"][1]["reason"], json!("pack_file_missing"));
}

#[test]
fn test_run_without_index_mirrors_raw_counts() {
    let dir = tempfile::tempdir().unwrap();
    let config = UniverseConfig::default_for_root(dir.path());
    seed(&config);

    let report = run_pack_coverage(&config).unwrap();
    let m = &report.pack_match;
    assert!(report.sources.history_pack_index.is_none());
    assert_eq!(m.resolved_in_any_pack, 0);
    assert_eq!(m.resolved_found_in_pack, m.found_in_pack);
    assert_eq!(m.resolved_ratio_pct, m.found_ratio_pct);
}
