//! Index symbol resolution check
//!
//! Resolves each ticker of the configured index universes (S&P 500,
//! Nasdaq-100, Dow) through the exact-symbol search index and flags two
//! problems: tickers the search index cannot resolve at all, and "false dead"
//! selections where the index picked an `L4_DEAD` row although the registry
//! holds a live variant of the same ticker.

use crate::universe::canonical::{normalize_opt, ticker_from_value};
use crate::universe::clock;
use crate::universe::config::{display_path, UniverseConfig};
use crate::universe::error::{Result, UniverseError};
use crate::universe::ndjson::{read_gzip_json, read_json};
use crate::universe::parity_gate::GateStatus;
use crate::universe::publish::publish_json_pretty;
use crate::universe::registry::{for_each_row, prefer_alive, RegistryRow, DEAD_LAYER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, warn};

pub const RESOLUTION_SCHEMA: &str = "rv_v7_index_symbol_resolution_report_v1";

/// One exact-index entry: the row the search index selected for a ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedEntry {
    #[serde(default)]
    pub canonical_id: Option<String>,
    #[serde(default)]
    pub layer: Option<String>,
}

impl SelectedEntry {
    pub fn layer(&self) -> String {
        normalize_opt(self.layer.as_deref()).unwrap_or_else(|| DEAD_LAYER.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExactIndex {
    #[serde(default)]
    pub by_symbol: HashMap<String, SelectedEntry>,
}

impl ExactIndex {
    pub fn lookup(&self, ticker: &str) -> Option<&SelectedEntry> {
        self.by_symbol.get(ticker)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub canonical_id: Option<String>,
    pub layer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalseDead {
    pub symbol: String,
    pub selected: Variant,
    pub better_variant: Variant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetReport {
    pub set: String,
    pub total: usize,
    pub resolved_count: usize,
    pub missing_count: usize,
    pub false_dead_count: usize,
    pub missing_examples: Vec<String>,
    pub false_dead_examples: Vec<FalseDead>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionTotals {
    pub total: usize,
    pub missing: usize,
    pub false_dead: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub schema: String,
    pub generated_at: String,
    /// `PASS` when every ticker resolves to a live row, else `WARN`.
    pub status: GateStatus,
    pub exact_index: String,
    pub totals: ResolutionTotals,
    pub sets: Vec<SetReport>,
}

/// Tickers from a universe list: a bare array or `{symbols: [...]}`, each
/// entry a string or a `{ticker|symbol}` object. Order is kept, duplicates
/// dropped.
pub fn universe_symbols(doc: &Value) -> Vec<String> {
    let items = match doc {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("symbols") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(ticker_from_value)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Check one universe list against the exact index and registry variants.
pub fn check_set(
    name: &str,
    symbols: &[String],
    exact: &ExactIndex,
    variants: &HashMap<String, Vec<RegistryRow>>,
    example_limit: usize,
) -> SetReport {
    let mut missing = Vec::new();
    let mut false_dead = Vec::new();

    for symbol in symbols {
        let Some(selected) = exact.lookup(symbol) else {
            missing.push(symbol.clone());
            continue;
        };
        let selected_layer = selected.layer();
        if selected_layer != DEAD_LAYER {
            continue;
        }
        let rows = variants.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        let Some(alive) = prefer_alive(rows).filter(|r| !r.is_dead()) else {
            continue;
        };
        false_dead.push(FalseDead {
            symbol: symbol.clone(),
            selected: Variant {
                canonical_id: selected.canonical_id.clone(),
                layer: selected_layer,
            },
            better_variant: Variant {
                canonical_id: alive.canonical_id.clone(),
                layer: alive.layer(),
            },
        });
    }

    SetReport {
        set: name.to_string(),
        total: symbols.len(),
        resolved_count: symbols.len() - missing.len(),
        missing_count: missing.len(),
        false_dead_count: false_dead.len(),
        missing_examples: missing.into_iter().take(example_limit).collect(),
        false_dead_examples: false_dead.into_iter().take(example_limit).collect(),
    }
}

pub fn run_symbol_resolution(config: &UniverseConfig) -> Result<ResolutionReport> {
    let mut lists = Vec::new();
    for list in &config.resolution.universes {
        let path = config.path(&list.path);
        if !path.exists() {
            return Err(UniverseError::missing("universe_list", &path));
        }
        let doc: Value = read_json(&path)?;
        lists.push((list.name.clone(), universe_symbols(&doc)));
    }

    let exact_path = config.path(&config.paths.search_exact_index);
    if !exact_path.exists() {
        return Err(UniverseError::missing("search_exact_index", &exact_path));
    }
    let exact: ExactIndex = read_gzip_json(&exact_path)?;
    let exact = ExactIndex {
        by_symbol: exact
            .by_symbol
            .into_iter()
            .filter_map(|(k, v)| normalize_opt(Some(&k)).map(|k| (k, v)))
            .collect(),
    };

    // Only tickers that appear in some list need their registry variants.
    let wanted: BTreeSet<&String> = lists.iter().flat_map(|(_, symbols)| symbols).collect();
    let mut variants: HashMap<String, Vec<RegistryRow>> = HashMap::new();
    let invalid = for_each_row(&config.path(&config.paths.registry_ndjson), |row| {
        if let Some(ticker) = row.ticker().filter(|t| wanted.contains(t)) {
            variants.entry(ticker).or_default().push(row);
        }
    })?;
    if invalid > 0 {
        warn!(invalid, "skipped unparsable registry lines");
    }

    let sets: Vec<SetReport> = lists
        .iter()
        .map(|(name, symbols)| {
            check_set(name, symbols, &exact, &variants, config.resolution.example_limit)
        })
        .collect();
    let totals = sets.iter().fold(ResolutionTotals::default(), |mut acc, s| {
        acc.total += s.total;
        acc.missing += s.missing_count;
        acc.false_dead += s.false_dead_count;
        acc
    });
    let status = if totals.missing == 0 && totals.false_dead == 0 {
        GateStatus::Pass
    } else {
        GateStatus::Warn
    };

    let report = ResolutionReport {
        schema: RESOLUTION_SCHEMA.to_string(),
        generated_at: clock::now_iso(),
        status,
        exact_index: display_path(&config.paths.search_exact_index),
        totals,
        sets,
    };
    publish_json_pretty(config.path(&config.paths.symbol_resolution_report), &report)?;
    info!(
        status = ?report.status,
        missing = report.totals.missing,
        false_dead = report.totals.false_dead,
        "symbol resolution report published"
    );
    Ok(report)
}
