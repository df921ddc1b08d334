//! Coverage / Parity Gate
//!
//! Every tracked feature's claimed symbol universe must equal the SSOT set.
//! The gate computes both set differences per feature plus live-coverage
//! ratios from the published feature artifacts, which separates "claims
//! coverage" from "actually produced data".
//!
//! # Modes
//!
//! - **Report**: violations yield `WARN`, the process always exits 0.
//! - **Enforce**: violations yield `FAIL` and exit code 1.
//!
//! The detection logic is identical in both modes.

use crate::universe::canonical::{normalize_opt, round_to, ticker_from_value};
use crate::universe::clock;
use crate::universe::config::{display_path, UniverseConfig};
use crate::universe::error::Result;
use crate::universe::ndjson::read_json_lenient;
use crate::universe::publish::publish_json_pretty;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

pub const PARITY_SCHEMA: &str = "rv_v7_feature_universe_parity_report_v1";
pub const SSOT_EMPTY_VIOLATION: &str = "SSOT_EMPTY_OR_MISSING";
const DATA_UNAVAILABLE: &str = "DATA_UNAVAILABLE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    Report,
    Enforce,
}

impl Default for GateMode {
    fn default() -> Self {
        Self::Report
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Pass,
    Warn,
    Fail,
}

/// Set comparison of one feature against the SSOT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureParity {
    pub ok: bool,
    pub count: usize,
    pub ssot_count: usize,
    pub missing_from_feature_count: usize,
    pub extra_in_feature_count: usize,
    pub missing_from_feature: Vec<String>,
    pub extra_in_feature: Vec<String>,
}

/// Symbols with real output, measured against the SSOT size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveCoverage {
    pub scientific_count: usize,
    pub forecast_count: usize,
    pub marketphase_count: usize,
    pub scientific_ratio_to_ssot: Option<f64>,
    pub forecast_ratio_to_ssot: Option<f64>,
    pub marketphase_ratio_to_ssot: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsotInfo {
    pub symbols_count: usize,
    pub symbols_path: String,
    pub by_feature_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParityReport {
    pub schema: String,
    pub generated_at: String,
    pub enforce: bool,
    pub ssot: SsotInfo,
    pub set_parity: BTreeMap<String, FeatureParity>,
    pub live_coverage: LiveCoverage,
    pub violations: Vec<String>,
    pub status: GateStatus,
}

impl ParityReport {
    pub fn exit_code(&self) -> i32 {
        match self.status {
            GateStatus::Fail => 1,
            GateStatus::Pass | GateStatus::Warn => 0,
        }
    }
}

/// Everything the gate reads, already loaded.
#[derive(Debug, Clone, Default)]
pub struct ParityInputs {
    pub ssot: BTreeSet<String>,
    /// Feature id → claimed coverage (array or ticker-keyed object).
    pub by_feature: BTreeMap<String, Value>,
    pub scientific: Option<Value>,
    pub forecast: Option<Value>,
    pub marketphase: Option<Value>,
}

// =============================================================================
// SET EXTRACTION
// =============================================================================

/// Symbol set from a flat array (strings or `{ticker|symbol}` objects) or an
/// object keyed by ticker. Keys starting with `_` are metadata.
pub fn symbol_set(value: &Value) -> BTreeSet<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(ticker_from_value).collect(),
        Value::Object(map) => map
            .keys()
            .filter(|k| !k.starts_with('_'))
            .filter_map(|k| normalize_opt(Some(k)))
            .collect(),
        _ => BTreeSet::new(),
    }
}

/// SSOT symbols from `{symbols: [...]}` or a bare array.
pub fn ssot_symbols(doc: &Value) -> BTreeSet<String> {
    match doc {
        Value::Array(_) => symbol_set(doc),
        Value::Object(map) => match map.get("symbols") {
            Some(symbols @ Value::Array(_)) => symbol_set(symbols),
            _ => BTreeSet::new(),
        },
        _ => BTreeSet::new(),
    }
}

pub fn set_parity(ssot: &BTreeSet<String>, feature: &BTreeSet<String>) -> FeatureParity {
    let missing: Vec<String> = ssot.difference(feature).cloned().collect();
    let extra: Vec<String> = feature.difference(ssot).cloned().collect();
    FeatureParity {
        ok: missing.is_empty() && extra.is_empty(),
        count: feature.len(),
        ssot_count: ssot.len(),
        missing_from_feature_count: missing.len(),
        extra_in_feature_count: extra.len(),
        missing_from_feature: missing,
        extra_in_feature: extra,
    }
}

/// Scientific snapshot entries with real output; `DATA_UNAVAILABLE` entries
/// are placeholders.
fn scientific_live(doc: &Value) -> usize {
    let Value::Object(map) = doc else {
        return 0;
    };
    map.iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .filter(|(_, entry)| {
            entry
                .get("status")
                .and_then(Value::as_str)
                .map(|s| !s.trim().eq_ignore_ascii_case(DATA_UNAVAILABLE))
                .unwrap_or(true)
        })
        .count()
}

fn nested_array<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |node, key| node.get(*key))
        .filter(|v| v.is_array())
}

fn ratio(count: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| round_to(count as f64 / total as f64, 6))
}

pub fn live_coverage(inputs: &ParityInputs) -> LiveCoverage {
    let ssot = inputs.ssot.len();
    let scientific_count = inputs.scientific.as_ref().map(scientific_live).unwrap_or(0);
    let forecast_count = inputs
        .forecast
        .as_ref()
        .and_then(|doc| nested_array(doc, &["data", "forecasts"]))
        .map(|rows| symbol_set(rows).len())
        .unwrap_or(0);
    let marketphase_count = inputs
        .marketphase
        .as_ref()
        .and_then(|doc| nested_array(doc, &["data", "symbols"]))
        .map(|rows| symbol_set(rows).len())
        .unwrap_or(0);

    LiveCoverage {
        scientific_count,
        forecast_count,
        marketphase_count,
        scientific_ratio_to_ssot: ratio(scientific_count, ssot),
        forecast_ratio_to_ssot: ratio(forecast_count, ssot),
        marketphase_ratio_to_ssot: ratio(marketphase_count, ssot),
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

pub fn evaluate(
    inputs: &ParityInputs,
    features: &[String],
    mode: GateMode,
    ssot_info: SsotInfo,
) -> ParityReport {
    let mut violations = Vec::new();
    if inputs.ssot.is_empty() {
        violations.push(SSOT_EMPTY_VIOLATION.to_string());
    }

    let mut set_checks = BTreeMap::new();
    for feature in features {
        let claimed = inputs
            .by_feature
            .get(feature)
            .map(symbol_set)
            .unwrap_or_default();
        let parity = set_parity(&inputs.ssot, &claimed);
        if !parity.ok {
            violations.push(format!("SET_MISMATCH:{}", feature));
        }
        set_checks.insert(feature.clone(), parity);
    }

    let status = match (violations.is_empty(), mode) {
        (true, _) => GateStatus::Pass,
        (false, GateMode::Report) => GateStatus::Warn,
        (false, GateMode::Enforce) => GateStatus::Fail,
    };

    ParityReport {
        schema: PARITY_SCHEMA.to_string(),
        generated_at: clock::now_iso(),
        enforce: mode == GateMode::Enforce,
        ssot: ssot_info,
        set_parity: set_checks,
        live_coverage: live_coverage(inputs),
        violations,
        status,
    }
}

/// Load inputs from the configured paths. Every input is optional here: an
/// absent SSOT surfaces as a violation, absent feature artifacts as zero
/// coverage.
pub fn load_inputs(config: &UniverseConfig) -> ParityInputs {
    let paths = &config.paths;
    let ssot = read_json_lenient(config.path(&paths.ssot_symbols))
        .map(|doc| ssot_symbols(&doc))
        .unwrap_or_default();
    let by_feature = read_json_lenient(config.path(&paths.by_feature))
        .and_then(|doc| match doc.get("symbols") {
            Some(Value::Object(map)) => Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    ParityInputs {
        ssot,
        by_feature,
        scientific: read_json_lenient(config.path(&paths.scientific_snapshot)),
        forecast: read_json_lenient(config.path(&paths.forecast_latest)),
        marketphase: read_json_lenient(config.path(&paths.marketphase_index)),
    }
}

pub fn run_parity_gate(config: &UniverseConfig, mode: GateMode) -> Result<ParityReport> {
    let inputs = load_inputs(config);
    let info = SsotInfo {
        symbols_count: inputs.ssot.len(),
        symbols_path: display_path(&config.paths.ssot_symbols),
        by_feature_path: display_path(&config.paths.by_feature),
    };
    let report = evaluate(&inputs, &config.parity.tracked_features, mode, info);

    publish_json_pretty(config.path(&config.paths.parity_report), &report)?;

    if report.violations.is_empty() {
        info!(ssot_symbols = report.ssot.symbols_count, "feature universe parity: PASS");
    } else {
        warn!(
            status = ?report.status,
            violations = ?report.violations,
            "feature universe parity violations"
        );
    }
    Ok(report)
}
