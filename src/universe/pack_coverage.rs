//! Forecast pack coverage
//!
//! Checks whether the best registry row for each SSOT ticker is physically
//! present in the pack its pointer names. Pointer repair makes pointers agree
//! with the index; this report measures the packs themselves.

use crate::universe::canonical::{normalize_opt, round_to};
use crate::universe::clock;
use crate::universe::config::{display_path, UniverseConfig};
use crate::universe::error::Result;
use crate::universe::ndjson::{is_blank, parse_json_line, read_json_lenient, GzLines};
use crate::universe::pack_index::CanonicalIndex;
use crate::universe::parity_gate::ssot_symbols;
use crate::universe::publish::publish_json_pretty;
use crate::universe::registry::{for_each_row, BestRows, RegistryRow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::{info, warn};

pub const COVERAGE_SCHEMA: &str = "rv_v7_forecast_pack_coverage_v1";
pub const MISSING_LIST_SCHEMA: &str = "rv_v7_forecast_pack_missing_canonical_ids_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    PackFileMissing,
    CanonicalMissingInPack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingSample {
    pub ticker: String,
    pub canonical_id: String,
    pub history_pack: String,
    pub reason: MissReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackMatch {
    pub scanned_packs: u64,
    pub total_candidates: u64,
    pub found_in_pack: u64,
    pub missing_in_pack: u64,
    pub missing_pack_file: u64,
    pub unreadable_packs: u64,
    pub found_ratio_pct: f64,
    pub missing_ratio_pct: f64,
    pub missing_sample: Vec<MissingSample>,
    pub missing_canonical_ids_count: usize,
    pub resolved_in_any_pack: u64,
    pub resolved_found_in_pack: u64,
    pub resolved_missing_in_pack: u64,
    pub resolved_ratio_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSources {
    pub ssot_symbols: String,
    pub registry: String,
    pub history_root: String,
    pub history_pack_index: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseCounts {
    pub symbols_total: usize,
    pub registry_best_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub schema: String,
    pub generated_at: String,
    pub sources: CoverageSources,
    pub universe: UniverseCounts,
    pub pack_match: PackMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingList {
    pub schema: String,
    pub generated_at: String,
    pub source_report: String,
    pub canonical_ids: Vec<String>,
}

/// Registry row reduced to what the pack check needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ticker: String,
    pub canonical_id: String,
    pub history_pack: String,
}

fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(part as f64 / total as f64 * 100.0, 2)
    }
}

/// Best STOCK row per SSOT ticker, among rows with a canonical id and a pointer.
pub fn best_candidates(registry: &Path, universe: &BTreeSet<String>) -> Result<Vec<Candidate>> {
    let mut best = BestRows::new();
    let invalid = for_each_row(registry, |row: RegistryRow| {
        if !row.is_stock() || row.canonical_key().is_none() || row.history_pack().is_none() {
            return;
        }
        if let Some(ticker) = row.ticker().filter(|t| universe.contains(t)) {
            best.offer(ticker, row);
        }
    })?;
    if invalid > 0 {
        warn!(invalid, "skipped unparsable registry lines");
    }

    let mut out: Vec<Candidate> = best
        .into_inner()
        .into_iter()
        .filter_map(|(ticker, row)| {
            Some(Candidate {
                canonical_id: row.canonical_key()?,
                history_pack: row.history_pack()?.to_string(),
                ticker,
            })
        })
        .collect();
    out.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    Ok(out)
}

/// Stream `pack`, removing ids from `wanted` as they appear. Stops early once
/// nothing is left to find.
fn scan_for_ids(pack: &Path, wanted: &mut HashSet<String>) -> Result<()> {
    for line in GzLines::open(pack)? {
        let line = line?;
        if is_blank(&line) {
            continue;
        }
        let Some(row) = parse_json_line::<Value>(&line) else {
            continue;
        };
        if let Some(id) = row
            .get("canonical_id")
            .and_then(Value::as_str)
            .and_then(|s| normalize_opt(Some(s)))
        {
            wanted.remove(&id);
            if wanted.is_empty() {
                break;
            }
        }
    }
    Ok(())
}

/// Group candidates by pack and check each pack for its wanted ids.
/// Returns the match counts and the sorted list of missing canonical ids.
pub fn match_packs(
    candidates: &[Candidate],
    history_base: &Path,
    sample_limit: usize,
) -> (PackMatch, Vec<String>) {
    let mut by_pack: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
    for candidate in candidates {
        by_pack
            .entry(candidate.history_pack.as_str())
            .or_default()
            .push(candidate);
    }

    let mut result = PackMatch::default();
    let mut missing_ids = BTreeSet::new();

    for (rel, rows) in by_pack {
        result.scanned_packs += 1;
        result.total_candidates += rows.len() as u64;
        let abs = history_base.join(rel);

        let (missed, reason): (Vec<&Candidate>, MissReason) = if !abs.is_file() {
            result.missing_pack_file += rows.len() as u64;
            (rows, MissReason::PackFileMissing)
        } else {
            let mut wanted: HashSet<String> = rows.iter().map(|r| r.canonical_id.clone()).collect();
            if let Err(e) = scan_for_ids(&abs, &mut wanted) {
                warn!(pack = %rel, error = %e, "pack unreadable during coverage scan");
                result.unreadable_packs += 1;
            }
            let (missed, found): (Vec<&Candidate>, Vec<&Candidate>) = rows
                .into_iter()
                .partition(|r| wanted.contains(&r.canonical_id));
            result.found_in_pack += found.len() as u64;
            (missed, MissReason::CanonicalMissingInPack)
        };

        for row in missed {
            missing_ids.insert(row.canonical_id.clone());
            if result.missing_sample.len() < sample_limit {
                result.missing_sample.push(MissingSample {
                    ticker: row.ticker.clone(),
                    canonical_id: row.canonical_id.clone(),
                    history_pack: rel.to_string(),
                    reason,
                });
            }
        }
    }

    result.missing_in_pack = result.total_candidates.saturating_sub(result.found_in_pack);
    result.found_ratio_pct = pct(result.found_in_pack, result.total_candidates);
    result.missing_ratio_pct = pct(result.missing_in_pack, result.total_candidates);
    result.missing_canonical_ids_count = missing_ids.len();
    (result, missing_ids.into_iter().collect())
}

/// Credit missing ids that some indexed pack does hold.
pub fn apply_index_resolution(result: &mut PackMatch, missing: &[String], index: &CanonicalIndex) {
    result.resolved_in_any_pack = missing
        .iter()
        .filter(|id| !index.candidates(id).is_empty())
        .count() as u64;
    result.resolved_found_in_pack = result.found_in_pack + result.resolved_in_any_pack;
    result.resolved_missing_in_pack = result
        .total_candidates
        .saturating_sub(result.resolved_found_in_pack);
    result.resolved_ratio_pct = pct(result.resolved_found_in_pack, result.total_candidates);
}

pub fn run_pack_coverage(config: &UniverseConfig) -> Result<CoverageReport> {
    let paths = &config.paths;
    let universe = read_json_lenient(config.path(&paths.ssot_symbols))
        .map(|doc| ssot_symbols(&doc))
        .unwrap_or_default();
    if universe.is_empty() {
        warn!("SSOT symbol list empty or missing, coverage will be empty");
    }

    let candidates = best_candidates(&config.path(&paths.registry_ndjson), &universe)?;
    let (mut pack_match, missing_ids) = match_packs(
        &candidates,
        &config.path(&paths.history_base),
        config.coverage.missing_sample_limit,
    );

    let index_path = config.path(&paths.pack_index);
    let index_used = if index_path.exists() {
        match CanonicalIndex::load(&index_path) {
            Ok(index) => {
                apply_index_resolution(&mut pack_match, &missing_ids, &index);
                true
            }
            Err(e) => {
                warn!(error = %e, "canonical index unreadable, resolution skipped");
                false
            }
        }
    } else {
        false
    };
    if !index_used {
        pack_match.resolved_found_in_pack = pack_match.found_in_pack;
        pack_match.resolved_missing_in_pack = pack_match.missing_in_pack;
        pack_match.resolved_ratio_pct = pack_match.found_ratio_pct;
    }

    let generated_at = clock::now_iso();
    let report = CoverageReport {
        schema: COVERAGE_SCHEMA.to_string(),
        generated_at: generated_at.clone(),
        sources: CoverageSources {
            ssot_symbols: display_path(&paths.ssot_symbols),
            registry: display_path(&paths.registry_ndjson),
            history_root: display_path(&paths.history_base),
            history_pack_index: index_used.then(|| display_path(&paths.pack_index)),
        },
        universe: UniverseCounts {
            symbols_total: universe.len(),
            registry_best_rows: candidates.len(),
        },
        pack_match,
    };
    let missing_list = MissingList {
        schema: MISSING_LIST_SCHEMA.to_string(),
        generated_at,
        source_report: display_path(&paths.pack_coverage_report),
        canonical_ids: missing_ids,
    };

    publish_json_pretty(config.path(&paths.pack_coverage_report), &report)?;
    publish_json_pretty(config.path(&paths.pack_missing_ids), &missing_list)?;
    info!(
        candidates = report.pack_match.total_candidates,
        found = report.pack_match.found_in_pack,
        found_ratio_pct = report.pack_match.found_ratio_pct,
        resolved_ratio_pct = report.pack_match.resolved_ratio_pct,
        "pack coverage published"
    );
    Ok(report)
}
