//! Dropout Ledger
//!
//! Append-only audit log of symbols dropped from a feature, one JSON record
//! per line. Upstream gap reports and the scientific snapshot are normalized
//! into [`DropoutRecord`]s and appended through the atomic publish path, so the
//! previous ledger bytes are always a prefix of the new file. Only an explicit
//! reset empties the ledger.
//!
//! After every append the summary artifact is rebuilt by streaming the whole
//! ledger.

use crate::universe::canonical::{normalize_opt, normalize_value, reason_code};
use crate::universe::clock;
use crate::universe::config::{display_path, GapSource, UniverseConfig};
use crate::universe::error::{Result, UniverseError};
use crate::universe::ndjson::{is_blank, parse_json_line, read_json};
use crate::universe::publish::{publish_appended_lines, publish_bytes, publish_json_pretty};
use crate::universe::registry::count_from_value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DROP_STATUS: &str = "DROP";
pub const UNKNOWN_REASON: &str = "UNKNOWN";
pub const SCIENTIFIC_FEATURE: &str = "scientific";
pub const SCIENTIFIC_DEFAULT_REASON: &str = "SCIENTIFIC_DATA_UNAVAILABLE";
pub const SUMMARY_SCHEMA: &str = "rv_v7_dropout_summary_v1";
const RUN_ID_PREFIX: &str = "dropout_emit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVersions {
    pub source: String,
}

/// Numeric counters of the dropped row, lifted out of its free-form details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    /// Bars the registry claims; `details.registry_bars_count` when the row
    /// has no top-level count.
    pub bars_count: u64,
    /// Closes the feature actually saw, when the gap report measured it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_closes_count: Option<u64>,
}

impl RecordCounts {
    fn from_row(row: &Map<String, Value>) -> Self {
        let details = row.get("details").and_then(Value::as_object);
        let from_details =
            |key: &str| details.and_then(|d| d.get(key)).and_then(count_from_value);
        Self {
            bars_count: row
                .get("bars_count")
                .and_then(count_from_value)
                .or_else(|| from_details("registry_bars_count"))
                .unwrap_or(0),
            actual_closes_count: from_details("actual_closes_count"),
        }
    }
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropoutRecord {
    pub ts: String,
    pub run_id: String,
    pub feature: String,
    pub canonical_id: Option<String>,
    pub symbol_display: Option<String>,
    pub status: String,
    pub reason: String,
    pub details: Map<String, Value>,
    pub policy_versions: PolicyVersions,
    /// Absent on lines written before counts were recorded.
    #[serde(default)]
    pub counts: RecordCounts,
}

/// Timestamp, run id and policy shared by every record of one emit run.
#[derive(Debug, Clone)]
pub struct RunStamp {
    pub ts: String,
    pub run_id: String,
    pub policy_source: String,
}

impl RunStamp {
    pub fn at(now: DateTime<Utc>, policy_source: &str) -> Self {
        Self {
            ts: clock::iso(now),
            run_id: clock::run_id(RUN_ID_PREFIX, now),
            policy_source: policy_source.to_string(),
        }
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

fn field_str(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .find_map(normalize_value)
}

fn text_field(row: &Map<String, Value>, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Normalize one gap-report row into a record for `feature`.
///
/// The symbol may arrive as `symbol`, `ticker` or `code`. Rows that are not
/// objects, or carry neither a symbol nor a canonical id, are rejected.
pub fn normalize_gap_row(
    feature: &str,
    row: &Value,
    stamp: &RunStamp,
    merge_details: bool,
) -> Option<DropoutRecord> {
    let row = row.as_object()?;
    let symbol = field_str(row, &["symbol", "ticker", "code"]);
    let canonical_id = row
        .get("canonical_id")
        .and_then(Value::as_str)
        .and_then(|s| normalize_opt(Some(s)));
    if symbol.is_none() && canonical_id.is_none() {
        return None;
    }

    let counts = RecordCounts::from_row(row);
    let mut details = Map::new();
    let bars = row.get("bars_count").and_then(count_from_value).unwrap_or(0);
    details.insert("bars_count".to_string(), json!(bars));
    if merge_details {
        if let Some(Value::Object(extra)) = row.get("details") {
            for (k, v) in extra {
                details.insert(k.clone(), v.clone());
            }
        }
    }

    Some(DropoutRecord {
        ts: stamp.ts.clone(),
        run_id: stamp.run_id.clone(),
        feature: feature.to_string(),
        canonical_id,
        symbol_display: symbol,
        status: DROP_STATUS.to_string(),
        reason: text_field(row, "reason").unwrap_or_else(|| UNKNOWN_REASON.to_string()),
        details,
        policy_versions: PolicyVersions {
            source: stamp.policy_source.clone(),
        },
        counts,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectStats {
    pub records: u64,
    pub rows_rejected: u64,
    pub by_feature: BTreeMap<String, u64>,
}

impl CollectStats {
    fn push(&mut self, out: &mut Vec<DropoutRecord>, record: DropoutRecord) {
        self.records += 1;
        *self.by_feature.entry(record.feature.clone()).or_default() += 1;
        out.push(record);
    }
}

/// Records for one configured gap section. An absent section yields nothing.
pub fn records_from_gap_report(
    doc: &Value,
    source: &GapSource,
    stamp: &RunStamp,
    stats: &mut CollectStats,
) -> Vec<DropoutRecord> {
    let mut out = Vec::new();
    let Some(rows) = doc
        .get(&source.section)
        .and_then(|s| s.get("missing"))
        .and_then(Value::as_array)
    else {
        return out;
    };

    for row in rows {
        let mut accepted = false;
        for feature in &source.features {
            if let Some(record) = normalize_gap_row(feature, row, stamp, source.merge_details) {
                stats.push(&mut out, record);
                accepted = true;
            }
        }
        if !accepted {
            stats.rows_rejected += 1;
        }
    }
    out
}

/// `scientific` drops from `DATA_UNAVAILABLE` snapshot entries. Canonical id
/// and bars count come from the SSOT rows (`items[]`) matched by symbol.
pub fn records_from_scientific(
    snapshot: &Value,
    ssot_rows: &Value,
    stamp: &RunStamp,
    stats: &mut CollectStats,
) -> Vec<DropoutRecord> {
    let mut out = Vec::new();
    let Some(entries) = snapshot.as_object() else {
        return out;
    };

    let by_symbol: HashMap<String, &Value> = ssot_rows
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|r| r.get("symbol").and_then(normalize_value).map(|s| (s, r)))
                .collect()
        })
        .unwrap_or_default();

    for (key, entry) in entries {
        if key.starts_with('_') {
            continue;
        }
        let unavailable = entry
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.trim().eq_ignore_ascii_case("DATA_UNAVAILABLE"))
            .unwrap_or(false);
        if !unavailable {
            continue;
        }

        let Some(symbol) = entry
            .get("ticker")
            .and_then(normalize_value)
            .or_else(|| normalize_opt(Some(key)))
        else {
            stats.rows_rejected += 1;
            continue;
        };
        let ssot = by_symbol.get(&symbol);
        let reason = entry
            .get("reason")
            .and_then(Value::as_str)
            .map(reason_code)
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| SCIENTIFIC_DEFAULT_REASON.to_string());

        let gap_row = json!({
            "symbol": symbol,
            "canonical_id": ssot.and_then(|r| r.get("canonical_id")).cloned(),
            "bars_count": ssot.and_then(|r| r.get("bars_count")).cloned(),
            "reason": reason,
        });
        match normalize_gap_row(SCIENTIFIC_FEATURE, &gap_row, stamp, false) {
            Some(record) => stats.push(&mut out, record),
            None => stats.rows_rejected += 1,
        }
    }
    out
}

/// Gather every record the configured sources produce for one run.
pub fn collect_records(
    config: &UniverseConfig,
    stamp: &RunStamp,
) -> Result<(Vec<DropoutRecord>, CollectStats)> {
    let mut stats = CollectStats::default();
    let mut records = Vec::new();
    let mut docs: HashMap<PathBuf, Value> = HashMap::new();

    for source in &config.dropout.sources {
        let path = config.path(&source.path);
        if !docs.contains_key(&path) {
            if !path.exists() {
                return Err(UniverseError::missing("gap_report", &path));
            }
            let doc: Value = read_json(&path)?;
            docs.insert(path.clone(), doc);
        }
        if let Some(doc) = docs.get(&path) {
            records.extend(records_from_gap_report(doc, source, stamp, &mut stats));
        }
    }

    if config.dropout.scientific_from_snapshot {
        let snapshot_path = config.path(&config.paths.scientific_snapshot);
        let rows_path = config.path(&config.paths.ssot_rows);
        if !snapshot_path.exists() {
            return Err(UniverseError::missing("scientific_snapshot", &snapshot_path));
        }
        if !rows_path.exists() {
            return Err(UniverseError::missing("ssot_rows", &rows_path));
        }
        let snapshot: Value = read_json(&snapshot_path)?;
        let ssot_rows: Value = read_json(&rows_path)?;
        records.extend(records_from_scientific(&snapshot, &ssot_rows, stamp, &mut stats));
    }

    Ok((records, stats))
}

// =============================================================================
// LEDGER
// =============================================================================

/// Truncate the ledger. This is the only operation that removes history.
pub fn reset_ledger(path: &Path) -> Result<()> {
    warn!(ledger = %path.display(), "resetting dropout ledger");
    publish_bytes(path, b"")
}

pub fn append_records(path: &Path, records: &[DropoutRecord]) -> Result<()> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| UniverseError::json(path, e))?;
    publish_appended_lines(path, &lines)
}

// =============================================================================
// SUMMARY
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestRun {
    pub run_id: String,
    pub ts: String,
    pub records: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropoutSummary {
    pub schema: String,
    pub generated_at: String,
    pub ledger_path: String,
    pub total_records: u64,
    pub lines_invalid: u64,
    pub distinct_canonical_ids: usize,
    pub runs: usize,
    pub latest_run: Option<LatestRun>,
    pub by_feature: BTreeMap<String, u64>,
    pub by_reason: BTreeMap<String, u64>,
    pub by_feature_reason: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Stream the ledger and aggregate it. A missing ledger summarizes as empty.
pub fn summarize_ledger(path: &Path) -> Result<DropoutSummary> {
    let mut summary = DropoutSummary {
        schema: SUMMARY_SCHEMA.to_string(),
        generated_at: clock::now_iso(),
        ..Default::default()
    };
    if !path.exists() {
        return Ok(summary);
    }

    let file = File::open(path).map_err(|e| UniverseError::io(path, e))?;
    let mut canonical_ids = BTreeSet::new();
    let mut runs: HashMap<String, (String, u64)> = HashMap::new();

    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|e| UniverseError::io(path, e))?;
        if is_blank(&line) {
            continue;
        }
        let Some(record) = parse_json_line::<DropoutRecord>(&line) else {
            summary.lines_invalid += 1;
            continue;
        };

        summary.total_records += 1;
        *summary.by_feature.entry(record.feature.clone()).or_default() += 1;
        *summary.by_reason.entry(record.reason.clone()).or_default() += 1;
        *summary
            .by_feature_reason
            .entry(record.feature)
            .or_default()
            .entry(record.reason)
            .or_default() += 1;
        if let Some(id) = record.canonical_id {
            canonical_ids.insert(id);
        }
        let run = runs.entry(record.run_id).or_insert_with(|| (record.ts.clone(), 0));
        if record.ts > run.0 {
            run.0 = record.ts;
        }
        run.1 += 1;
    }

    summary.distinct_canonical_ids = canonical_ids.len();
    summary.runs = runs.len();
    summary.latest_run = runs
        .into_iter()
        .max_by(|(a_id, (a_ts, _)), (b_id, (b_ts, _))| a_ts.cmp(b_ts).then_with(|| a_id.cmp(b_id)))
        .map(|(run_id, (ts, records))| LatestRun { run_id, ts, records });
    Ok(summary)
}

pub fn write_summary(config: &UniverseConfig) -> Result<DropoutSummary> {
    let ledger = config.path(&config.paths.dropout_ledger);
    let mut summary = summarize_ledger(&ledger)?;
    summary.ledger_path = display_path(&config.paths.dropout_ledger);
    publish_json_pretty(config.path(&config.paths.dropout_summary), &summary)?;
    Ok(summary)
}

// =============================================================================
// RUN
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EmitReport {
    pub ok: bool,
    pub run_id: String,
    pub reset: bool,
    pub appended_records: u64,
    pub rows_rejected: u64,
    pub by_feature: BTreeMap<String, u64>,
    pub ledger_path: String,
    pub summary_path: String,
    pub ledger_total_records: u64,
}

/// Collect, optionally reset, append, then regenerate the summary.
pub fn run_dropout_emit(config: &UniverseConfig, reset: bool) -> Result<EmitReport> {
    let stamp = RunStamp::at(Utc::now(), &config.dropout.policy_source);
    let ledger = config.path(&config.paths.dropout_ledger);

    // All sources are read before the ledger is touched.
    let (records, stats) = collect_records(config, &stamp)?;

    if reset {
        reset_ledger(&ledger)?;
    }
    append_records(&ledger, &records)?;
    info!(
        run_id = %stamp.run_id,
        appended = stats.records,
        rejected = stats.rows_rejected,
        "dropout records appended"
    );

    let summary = write_summary(config)?;

    Ok(EmitReport {
        ok: true,
        run_id: stamp.run_id,
        reset,
        appended_records: stats.records,
        rows_rejected: stats.rows_rejected,
        by_feature: stats.by_feature,
        ledger_path: display_path(&config.paths.dropout_ledger),
        summary_path: display_path(&config.paths.dropout_summary),
        ledger_total_records: summary.total_records,
    })
}
