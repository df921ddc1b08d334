//! Pointer Integrity Repair
//!
//! Reconciles registry pack pointers against the canonical index. Each
//! `STOCK` row is decided on its own, so the only global state is the index:
//!
//! | pointer  | index candidates | action                                   |
//! |----------|------------------|------------------------------------------|
//! | none     | ≥ 1              | bind to first candidate                  |
//! | set      | 0                | phantom: clear pointer and pack fields   |
//! | set      | ≥ 1, not listed  | drift: rebind to first candidate         |
//! | set      | ≥ 1, listed      | unchanged                                |
//!
//! "First" is lexicographic, which makes the rule deterministic. After one
//! pass every pointer is either listed by the index or absent, so a second
//! pass with the same index changes nothing.
//!
//! Both registry representations are rewritten in full: the line-delimited
//! form streamed in source order, the snapshot loaded and re-sorted by
//! canonical id. Each is published atomically.

use crate::universe::canonical::{normalize_id, normalize_opt};
use crate::universe::clock;
use crate::universe::config::{display_path, UniverseConfig};
use crate::universe::error::{Result, UniverseError};
use crate::universe::ndjson::{is_blank, parse_json_line, GzLines};
use crate::universe::pack_index::CanonicalIndex;
use crate::universe::publish::{publish_gzip_json, GzipStagedFile};
use crate::universe::registry::{RegistrySnapshot, PHANTOM_FIX_BASIS, STOCK_TYPE};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// What the repair did to a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Unchanged,
    NotStock,
    ReboundMissing,
    ClearedPhantom,
    ReboundDrift,
}

impl PointerAction {
    pub fn mutated(self) -> bool {
        matches!(
            self,
            Self::ReboundMissing | Self::ClearedPhantom | Self::ReboundDrift
        )
    }
}

/// Per-target counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairStats {
    pub rows_total: u64,
    pub rows_json_error: u64,
    pub rows_skipped_non_stock: u64,
    pub cleared_phantom_pointer: u64,
    pub rebound_pointer_drift: u64,
    pub rebound_missing_pointer: u64,
}

impl RepairStats {
    fn record(&mut self, action: PointerAction) {
        self.rows_total += 1;
        match action {
            PointerAction::Unchanged => {}
            PointerAction::NotStock => self.rows_skipped_non_stock += 1,
            PointerAction::ReboundMissing => self.rebound_missing_pointer += 1,
            PointerAction::ClearedPhantom => self.cleared_phantom_pointer += 1,
            PointerAction::ReboundDrift => self.rebound_pointer_drift += 1,
        }
    }

    pub fn total_touched(&self) -> u64 {
        self.cleared_phantom_pointer + self.rebound_pointer_drift + self.rebound_missing_pointer
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairTargetSummary {
    pub target: String,
    #[serde(flatten)]
    pub stats: RepairStats,
    pub total_touched: u64,
}

impl RepairTargetSummary {
    fn new(target: &Path, stats: RepairStats) -> Self {
        let target = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| display_path(target));
        Self {
            total_touched: stats.total_touched(),
            target,
            stats,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PointerRepairReport {
    pub ok: bool,
    pub index_canonical_ids: usize,
    pub ndjson: RepairTargetSummary,
    pub snapshot: RepairTargetSummary,
    pub total_touched: u64,
}

// =============================================================================
// DECISION RULE
// =============================================================================

fn str_field<'a>(row: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

fn is_stock(row: &Map<String, Value>) -> bool {
    str_field(row, "type_norm")
        .map(|t| normalize_id(t) == STOCK_TYPE)
        .unwrap_or(false)
}

fn current_pack(row: &Map<String, Value>) -> Option<String> {
    row.get("pointers")
        .and_then(|p| p.get("history_pack"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Edit the row's `pointers` object in place. A missing or non-object
/// value is replaced by an empty object first.
fn edit_pointers<F>(row: &mut Map<String, Value>, edit: F)
where
    F: FnOnce(&mut Map<String, Value>),
{
    let mut pointers = match row.get_mut("pointers").map(Value::take) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    edit(&mut pointers);
    row.insert("pointers".to_string(), Value::Object(pointers));
}

fn rebind(row: &mut Map<String, Value>, pack: &str) {
    edit_pointers(row, |pointers| {
        pointers.insert("history_pack".to_string(), Value::String(pack.to_string()));
        pointers.shift_remove("pack_sha256");
        let group = pointers
            .entry("symbol_group")
            .or_insert(Value::Null);
        let falsy = match group {
            Value::String(s) => s.is_empty(),
            Value::Bool(b) => !*b,
            _ => false,
        };
        if falsy {
            *group = Value::Null;
        }
    });
}

fn clear_phantom(row: &mut Map<String, Value>) {
    edit_pointers(row, |pointers| {
        for key in ["history_pack", "pack_sha256", "symbol_group"] {
            pointers.shift_remove(key);
        }
    });
    row.insert("bars_count".to_string(), json!(0));
    row.insert("last_trade_date".to_string(), Value::Null);
    row.insert("avg_volume_10d".to_string(), json!(0));
    row.insert("avg_volume_30d".to_string(), json!(0));
    row.insert(
        "_quality_basis".to_string(),
        Value::String(PHANTOM_FIX_BASIS.to_string()),
    );
}

/// Apply the decision rule to one raw registry row in place. Only the
/// fields the action names are touched; everything else keeps its value
/// and position.
pub fn apply_pointer_fix(row: &mut Map<String, Value>, index: &CanonicalIndex) -> PointerAction {
    if !is_stock(row) {
        return PointerAction::NotStock;
    }
    let Some(canonical_id) = normalize_opt(str_field(row, "canonical_id")) else {
        return PointerAction::Unchanged;
    };
    let candidates = index.candidates(&canonical_id);
    let first = candidates.iter().min();

    match (current_pack(row), first) {
        (None, Some(first)) => {
            rebind(row, first);
            PointerAction::ReboundMissing
        }
        (None, None) => PointerAction::Unchanged,
        (Some(_), None) => {
            clear_phantom(row);
            PointerAction::ClearedPhantom
        }
        (Some(current), Some(first)) => {
            if candidates.iter().any(|c| c == &current) {
                PointerAction::Unchanged
            } else {
                rebind(row, first);
                PointerAction::ReboundDrift
            }
        }
    }
}

// =============================================================================
// REWRITERS
// =============================================================================

/// Stream the line-delimited registry through the rule and republish it.
/// Unparsable lines are counted and carried through byte for byte, as are
/// rows the rule leaves alone.
pub fn rewrite_registry_ndjson(path: &Path, index: &CanonicalIndex) -> Result<RepairStats> {
    let mut stats = RepairStats::default();
    let mut out = GzipStagedFile::create(path)?;

    for line in GzLines::open(path)? {
        let line = line?;
        if is_blank(&line) {
            continue;
        }
        match parse_json_line::<Value>(&line) {
            Some(Value::Object(mut row)) => {
                let action = apply_pointer_fix(&mut row, index);
                stats.record(action);
                if action.mutated() {
                    serde_json::to_writer(&mut out, &row)
                        .map_err(|e| UniverseError::json(path, e))?;
                } else {
                    out.write_all(&line)
                        .map_err(|e| UniverseError::publish(path, e))?;
                }
            }
            _ => {
                stats.rows_json_error += 1;
                out.write_all(&line)
                    .map_err(|e| UniverseError::publish(path, e))?;
            }
        }
        out.write_all(b"\n")
            .map_err(|e| UniverseError::publish(path, e))?;
    }

    out.commit()?;
    Ok(stats)
}

/// Rewrite the snapshot form: repair, re-sort by canonical id, refresh header.
pub fn rewrite_registry_snapshot(path: &Path, index: &CanonicalIndex) -> Result<RepairStats> {
    let mut snapshot = RegistrySnapshot::load(path)?;
    let mut stats = RepairStats::default();

    for record in snapshot.records.iter_mut() {
        match record {
            Value::Object(row) => stats.record(apply_pointer_fix(row, index)),
            _ => stats.rows_json_error += 1,
        }
    }

    snapshot.sort_records();
    snapshot.record_count = snapshot.records.len();
    snapshot.generated_at = Some(clock::now_iso());
    publish_gzip_json(path, &snapshot)?;
    Ok(stats)
}

/// Full repair run over both registry representations.
pub fn run_pointer_repair(config: &UniverseConfig) -> Result<PointerRepairReport> {
    let index_path = config.path(&config.paths.pack_index);
    let ndjson_path = config.path(&config.paths.registry_ndjson);
    let snapshot_path = config.path(&config.paths.registry_snapshot);

    for (kind, path) in [
        ("history_index", &index_path),
        ("registry_ndjson", &ndjson_path),
        ("registry_snapshot", &snapshot_path),
    ] {
        if !path.exists() {
            return Err(UniverseError::missing(kind, path));
        }
    }

    let index = CanonicalIndex::load(&index_path)?;
    info!(canonical_ids = index.len(), "loaded history index");

    let ndjson = RepairTargetSummary::new(&ndjson_path, rewrite_registry_ndjson(&ndjson_path, &index)?);
    let snapshot = RepairTargetSummary::new(
        &snapshot_path,
        rewrite_registry_snapshot(&snapshot_path, &index)?,
    );

    for summary in [&ndjson, &snapshot] {
        info!(
            artifact = %summary.target,
            touched = summary.total_touched,
            clear = summary.stats.cleared_phantom_pointer,
            rebind_drift = summary.stats.rebound_pointer_drift,
            rebind_missing = summary.stats.rebound_missing_pointer,
            json_errors = summary.stats.rows_json_error,
            "registry pointer sync"
        );
    }

    Ok(PointerRepairReport {
        ok: true,
        index_canonical_ids: index.len(),
        total_touched: ndjson.total_touched + snapshot.total_touched,
        ndjson,
        snapshot,
    })
}
