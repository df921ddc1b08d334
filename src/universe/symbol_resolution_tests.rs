//! Symbol Resolution Tests

use crate::universe::config::{UniverseConfig, UniverseList};
use crate::universe::error::UniverseError;
use crate::universe::parity_gate::GateStatus;
use crate::universe::registry::RegistryRow;
use crate::universe::symbol_resolution::{
    check_set, run_symbol_resolution, universe_symbols, ExactIndex, SelectedEntry,
};
use crate::universe::test_support::{read_json, write_gz_json, write_gz_lines, write_json};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;

fn entry(canonical_id: &str, layer: Option<&str>) -> SelectedEntry {
    SelectedEntry {
        canonical_id: Some(canonical_id.into()),
        layer: layer.map(String::from),
    }
}

fn registry_row(canonical_id: &str, symbol: &str, layer: &str) -> RegistryRow {
    serde_json::from_value(json!({
        "canonical_id": canonical_id,
        "symbol": symbol,
        "computed": {"layer": layer}
    }))
    .unwrap()
}

#[test]
fn test_universe_symbols_shapes_and_dedup() {
    assert_eq!(
        universe_symbols(&json!(["aapl", {"ticker": "msft"}, "AAPL", {"symbol": "nvda"}])),
        vec!["AAPL", "MSFT", "NVDA"]
    );
    assert_eq!(universe_symbols(&json!({"symbols": ["ko"]})), vec!["KO"]);
    assert!(universe_symbols(&json!({"tickers": ["ko"]})).is_empty());
}

#[test]
fn test_check_set_flags_missing_and_false_dead() {
    let mut by_symbol = HashMap::new();
    by_symbol.insert("AAPL".to_string(), entry("US:AAPL", Some("L1_CORE")));
    by_symbol.insert("GE".to_string(), entry("US:GE.OLD", Some("l4_dead")));
    by_symbol.insert("XOM".to_string(), entry("US:XOM", None));
    let exact = ExactIndex { by_symbol };

    let mut variants = HashMap::new();
    variants.insert(
        "GE".to_string(),
        vec![
            registry_row("US:GE.OLD", "GE", "L4_DEAD"),
            registry_row("US:GE", "GE", "L2_ACTIVE"),
        ],
    );
    variants.insert("XOM".to_string(), vec![registry_row("US:XOM", "XOM", "L4_DEAD")]);

    let symbols: Vec<String> = ["AAPL", "GE", "XOM", "ZZZ"].iter().map(|s| s.to_string()).collect();
    let report = check_set("sp500", &symbols, &exact, &variants, 25);

    assert_eq!(report.total, 4);
    assert_eq!(report.resolved_count, 3);
    assert_eq!(report.missing_examples, vec!["ZZZ".to_string()]);
    assert_eq!(report.false_dead_count, 1);
    let ge = &report.false_dead_examples[0];
    assert_eq!(ge.symbol, "GE");
    assert_eq!(ge.selected.layer, "L4_DEAD");
    assert_eq!(ge.better_variant.canonical_id.as_deref(), Some("US:GE"));
    assert_eq!(ge.better_variant.layer, "L2_ACTIVE");
}

#[test]
fn test_examples_are_capped() {
    let exact = ExactIndex::default();
    let symbols: Vec<String> = (0..40).map(|i| format!("T{}", i)).collect();
    let report = check_set("nasdaq100", &symbols, &exact, &HashMap::new(), 25);
    assert_eq!(report.missing_count, 40);
    assert_eq!(report.missing_examples.len(), 25);
}

#[test]
fn test_run_aggregates_sets() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = UniverseConfig::default_for_root(dir.path());
    config.resolution.universes = vec![
        UniverseList {
            name: "sp500".into(),
            path: PathBuf::from("lists/sp500.json"),
        },
        UniverseList {
            name: "dowjones".into(),
            path: PathBuf::from("lists/dowjones.json"),
        },
    ];
    write_json(&dir.path().join("lists/sp500.json"), &json!(["AAPL", "GE"]));
    write_json(&dir.path().join("lists/dowjones.json"), &json!({"symbols": [{"ticker": "aapl"}]}));
    write_gz_json(
        &config.path(&config.paths.search_exact_index),
        &json!({"by_symbol": {
            "aapl": {"canonical_id": "US:AAPL", "layer": "L1_CORE"},
            "GE": {"canonical_id": "US:GE.OLD", "layer": "L4_DEAD"}
        }}),
    );
    write_gz_lines(
        &config.path(&config.paths.registry_ndjson),
        &[
            json!({"canonical_id": "US:GE", "symbol": "GE", "layer": "L2_ACTIVE"}).to_string(),
            json!({"canonical_id": "US:IBM", "symbol": "IBM", "layer": "L1_CORE"}).to_string(),
        ],
    );

    let report = run_symbol_resolution(&config).unwrap();
    assert_eq!(report.status, GateStatus::Warn);
    assert_eq!(report.totals.total, 3);
    assert_eq!(report.totals.missing, 0);
    assert_eq!(report.totals.false_dead, 1);
    assert_eq!(report.sets[1].set, "dowjones");

    let on_disk = read_json(&config.path(&config.paths.symbol_resolution_report));
    assert_eq!(on_disk["status"], json!("WARN"));
    assert_eq!(on_disk["sets"][0]["false_dead_examples"][0]["symbol"], json!("GE"));
}

#[test]
fn test_run_requires_universe_lists() {
    let dir = tempfile::tempdir().unwrap();
    let config = UniverseConfig::default_for_root(dir.path());
    let err = run_symbol_resolution(&config).unwrap_err();
    assert!(matches!(err, UniverseError::MissingInput { kind: "universe_list", .. }));
}
