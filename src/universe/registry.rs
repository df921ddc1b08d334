//! Instrument Registry
//!
//! One row per (symbol, ingestion-run) observation. Rows are typed for the
//! fields readers rank and filter on; everything else rides along in
//! `extra`. Rewriters edit the raw JSON object instead, so values the typed
//! view would normalize (numeric strings, explicit nulls) survive untouched.
//!
//! # Row Selection
//!
//! Several rows may share a ticker or canonical id. Readers select a winner
//! with a total order: `(quality_basis == "backfill_real", bars_count)`, then
//! the lexicographically smallest canonical id. Selection is a `max` over that
//! key, so the winner does not depend on input order.

use crate::universe::canonical::{normalize_id, normalize_opt};
use crate::universe::error::{Result, UniverseError};
use crate::universe::ndjson::{is_blank, parse_json_line, read_gzip_json, GzLines};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

pub const STOCK_TYPE: &str = "STOCK";
pub const DEAD_LAYER: &str = "L4_DEAD";
pub const BACKFILL_REAL: &str = "backfill_real";
pub const PHANTOM_FIX_BASIS: &str = "missing_phantom_fix";

/// Pack pointers carried by a registry row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pointers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_pack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_sha256: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_norm: Option<String>,
    /// Advisory; ingestion's belief, not a count of pack content.
    #[serde(
        default,
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub bars_count: Option<u64>,
    #[serde(
        rename = "_quality_basis",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub quality_basis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointers: Option<Pointers>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Counts arrive as ints, floats or numeric strings depending on the producer.
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(count_from_value))
}

pub(crate) fn count_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|v| v.max(0) as u64))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.max(0.0) as u64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.max(0.0) as u64),
        _ => None,
    }
}

/// Ranking key for duplicate rows. Derived `Ord` compares fields in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct QualityRank {
    pub real_backfill: bool,
    pub bars_count: u64,
}

impl RegistryRow {
    pub fn canonical_key(&self) -> Option<String> {
        normalize_opt(self.canonical_id.as_deref())
    }

    pub fn ticker(&self) -> Option<String> {
        normalize_opt(self.symbol.as_deref())
    }

    pub fn is_stock(&self) -> bool {
        self.type_norm
            .as_deref()
            .map(|t| normalize_id(t) == STOCK_TYPE)
            .unwrap_or(false)
    }

    /// Current pack pointer, if set to a non-blank value.
    pub fn history_pack(&self) -> Option<&str> {
        self.pointers
            .as_ref()
            .and_then(|p| p.history_pack.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn quality_rank(&self) -> QualityRank {
        QualityRank {
            real_backfill: self
                .quality_basis
                .as_deref()
                .map(|q| q.trim().eq_ignore_ascii_case(BACKFILL_REAL))
                .unwrap_or(false),
            bars_count: self.bars_count.unwrap_or(0),
        }
    }

    /// Liveliness tier; `computed.layer` wins over the top-level field.
    pub fn layer(&self) -> String {
        self.extra
            .get("computed")
            .and_then(|c| c.get("layer"))
            .and_then(Value::as_str)
            .or(self.layer.as_deref())
            .and_then(|l| normalize_opt(Some(l)))
            .unwrap_or_else(|| DEAD_LAYER.to_string())
    }

    pub fn is_dead(&self) -> bool {
        self.layer() == DEAD_LAYER
    }
}

/// Total order used for winner selection: higher rank wins, then the
/// smaller canonical id.
pub fn compare_rows(a: &RegistryRow, b: &RegistryRow) -> Ordering {
    a.quality_rank()
        .cmp(&b.quality_rank())
        .then_with(|| b.canonical_key().cmp(&a.canonical_key()))
}

pub fn best_row<'a, I>(rows: I) -> Option<&'a RegistryRow>
where
    I: IntoIterator<Item = &'a RegistryRow>,
{
    rows.into_iter().max_by(|a, b| compare_rows(a, b))
}

/// Best non-dead row when one exists, else the best row overall.
pub fn prefer_alive(rows: &[RegistryRow]) -> Option<&RegistryRow> {
    best_row(rows.iter().filter(|r| !r.is_dead())).or_else(|| best_row(rows))
}

/// Streaming accumulator keeping only the winning row per key.
#[derive(Debug, Default)]
pub struct BestRows {
    by_key: HashMap<String, RegistryRow>,
}

impl BestRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, key: String, row: RegistryRow) {
        match self.by_key.get(&key) {
            Some(current) if compare_rows(&row, current) != Ordering::Greater => {}
            _ => {
                self.by_key.insert(key, row);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&RegistryRow> {
        self.by_key.get(key)
    }

    pub fn into_inner(self) -> HashMap<String, RegistryRow> {
        self.by_key
    }
}

/// Outcome of parsing one registry line.
#[derive(Debug)]
pub enum RegistryLine {
    Blank,
    Row(Box<RegistryRow>),
    Invalid,
}

pub fn parse_line(line: &[u8]) -> RegistryLine {
    if is_blank(line) {
        return RegistryLine::Blank;
    }
    match parse_json_line::<RegistryRow>(line) {
        Some(row) => RegistryLine::Row(Box::new(row)),
        None => RegistryLine::Invalid,
    }
}

/// Stream every parsable row of the line-delimited registry into `visit`.
/// Returns the number of unparsable lines.
pub fn for_each_row<F>(path: &Path, mut visit: F) -> Result<u64>
where
    F: FnMut(RegistryRow),
{
    if !path.exists() {
        return Err(UniverseError::missing("registry_ndjson", path));
    }
    let mut invalid = 0u64;
    for line in GzLines::open(path)? {
        match parse_line(&line?) {
            RegistryLine::Row(row) => visit(*row),
            RegistryLine::Invalid => invalid += 1,
            RegistryLine::Blank => {}
        }
    }
    Ok(invalid)
}

/// Denormalized registry snapshot `{ generated_at, record_count, records }`.
///
/// Records stay raw JSON so a rewrite only changes the fields it edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub record_count: usize,
    #[serde(default)]
    pub records: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistrySnapshot {
    /// Read a gzip snapshot, rejecting documents without a `records` array.
    pub fn load(path: &Path) -> Result<Self> {
        let doc: Value = read_gzip_json(path)?;
        let Value::Object(map) = doc else {
            return Err(UniverseError::shape(path, "snapshot is not a JSON object"));
        };
        if !matches!(map.get("records"), None | Some(Value::Array(_))) {
            return Err(UniverseError::shape(path, "records is not an array"));
        }
        serde_json::from_value(Value::Object(map)).map_err(|e| UniverseError::json(path, e))
    }

    /// Stable sort by canonical id; records without one sort first.
    pub fn sort_records(&mut self) {
        self.records.sort_by_cached_key(|record| {
            record
                .get("canonical_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        });
    }
}
