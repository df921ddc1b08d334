//! History-Pack Canonical Index
//!
//! Reverse lookup from canonical id to every pack file holding a record for
//! it. The index is a cache: it is rebuilt wholesale from the packs on every
//! run and never patched in place.
//!
//! # Memory Bound
//!
//! Packs are streamed line by line. The only state that grows is the id → pack
//! list map, so memory tracks the number of distinct ids, not the number of
//! rows. Ids seen in a pack are staged per pack and merged only once the pack
//! has been read to the end, so a pack whose gzip stream breaks contributes
//! nothing.

use crate::universe::canonical::normalize_opt;
use crate::universe::clock;
use crate::universe::config::{display_path, IndexConfig, UniverseConfig};
use crate::universe::error::{Result, UniverseError};
use crate::universe::ndjson::{is_blank, parse_json_line, read_gzip_json, GzLines};
use crate::universe::publish::{publish_gzip_json, publish_json_pretty};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

pub const INDEX_SCHEMA: &str = "rv_v7_history_pack_canonical_index_v1";
pub const INDEX_REPORT_SCHEMA: &str = "rv_v7_history_pack_canonical_index_report_v1";

// =============================================================================
// INDEX DOCUMENT
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalIndex {
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub source_root: String,
    #[serde(default)]
    pub packs_scanned: u64,
    #[serde(default)]
    pub packs_failed: u64,
    #[serde(default)]
    pub rows_scanned: u64,
    #[serde(default)]
    pub canonical_ids: u64,
    /// Canonical id → sorted, deduplicated pack relative paths.
    #[serde(default)]
    pub by_canonical_id: BTreeMap<String, Vec<String>>,
}

impl CanonicalIndex {
    /// Load a published index. Pack lists are re-sorted and deduplicated so
    /// a hand-edited or older artifact still yields deterministic candidates.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(UniverseError::missing("history_index", path));
        }
        let mut index: Self = read_gzip_json(path)?;
        let by_id = std::mem::take(&mut index.by_canonical_id);
        for (id, mut packs) in by_id {
            let Some(key) = normalize_opt(Some(&id)) else {
                continue;
            };
            packs.retain(|p| !p.trim().is_empty());
            let entry = index.by_canonical_id.entry(key).or_default();
            entry.append(&mut packs);
            entry.sort();
            entry.dedup();
        }
        Ok(index)
    }

    /// Candidate packs for an already-normalized canonical id.
    pub fn candidates(&self, canonical_id: &str) -> &[String] {
        self.by_canonical_id
            .get(canonical_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_canonical_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_canonical_id.is_empty()
    }

    fn add(&mut self, canonical_id: String, pack: &str) {
        let packs = self.by_canonical_id.entry(canonical_id).or_default();
        if let Err(pos) = packs.binary_search_by(|p| p.as_str().cmp(pack)) {
            packs.insert(pos, pack.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPack {
    pub pack: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOutputs {
    pub index_gz: String,
    pub report: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexCounts {
    pub packs_scanned: u64,
    pub packs_failed: u64,
    pub rows_scanned: u64,
    pub rows_malformed: u64,
    pub canonical_ids: u64,
}

/// Plain-JSON companion report for humans and CI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub schema: String,
    pub generated_at: String,
    pub started_at: String,
    pub source_root: String,
    pub outputs: IndexOutputs,
    pub counts: IndexCounts,
    pub failed_packs: Vec<FailedPack>,
}

// =============================================================================
// DISCOVERY
// =============================================================================

fn is_pack_name(name: &str, config: &IndexConfig) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(&config.pack_suffix.to_ascii_lowercase())
        && config
            .pack_prefixes
            .iter()
            .any(|prefix| lower.starts_with(&prefix.to_ascii_lowercase()))
}

/// All pack files under `root`, recursively, in sorted path order. A missing
/// root yields no packs.
pub fn discover_packs(root: &Path, config: &IndexConfig) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| UniverseError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| UniverseError::io(&dir, e))?;
            let file_type = entry.file_type().map_err(|e| UniverseError::io(entry.path(), e))?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file()
                && is_pack_name(&entry.file_name().to_string_lossy(), config)
            {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Forward-slash path of `pack` relative to `base`. `build_index` only
/// passes packs found under `base`.
pub fn relative_pack_path(pack: &Path, base: &Path) -> String {
    let rel = pack.strip_prefix(base).unwrap_or(pack);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

// =============================================================================
// SCAN
// =============================================================================

#[derive(Debug, Default)]
struct PackScan {
    rows: u64,
    malformed: u64,
    ids: HashSet<String>,
}

fn scan_pack(path: &Path) -> Result<PackScan> {
    let mut scan = PackScan::default();
    for line in GzLines::open(path)? {
        let line = line?;
        if is_blank(&line) {
            continue;
        }
        scan.rows += 1;
        let Some(row) = parse_json_line::<Value>(&line) else {
            scan.malformed += 1;
            continue;
        };
        if let Some(id) = row
            .get("canonical_id")
            .and_then(Value::as_str)
            .and_then(|s| normalize_opt(Some(s)))
        {
            scan.ids.insert(id);
        }
    }
    Ok(scan)
}

/// Result of a full rebuild, before publishing.
#[derive(Debug, Clone)]
pub struct IndexBuild {
    pub index: CanonicalIndex,
    pub rows_malformed: u64,
    pub failed_packs: Vec<FailedPack>,
    pub started_at: String,
}

/// Rebuild the index from scratch by scanning every pack under the history root.
pub fn build_index(config: &UniverseConfig) -> Result<IndexBuild> {
    let started_at = clock::now_iso();
    let history_root = config.path(&config.paths.history_root);
    let history_base = config.path(&config.paths.history_base);
    if !history_root.starts_with(&history_base) {
        return Err(UniverseError::Config {
            path: history_root,
            reason: format!(
                "history_root must lie under history_base {}",
                history_base.display()
            ),
        });
    }
    let packs = discover_packs(&history_root, &config.index)?;
    let progress_every = config.index.progress_every.max(1);

    let mut index = CanonicalIndex {
        schema: INDEX_SCHEMA.to_string(),
        source_root: display_path(&config.paths.history_root),
        ..Default::default()
    };
    let mut rows_malformed = 0u64;
    let mut failed_packs = Vec::new();

    if packs.is_empty() {
        info!(root = %history_root.display(), "no history packs found, index will be empty");
    }

    for (i, pack) in packs.iter().enumerate() {
        let rel = relative_pack_path(pack, &history_base);
        match scan_pack(pack) {
            Ok(scan) => {
                index.rows_scanned += scan.rows;
                rows_malformed += scan.malformed;
                for id in scan.ids {
                    index.add(id, &rel);
                }
            }
            Err(e) => {
                warn!(pack = %rel, error = %e, "pack unreadable, contribution dropped");
                failed_packs.push(FailedPack {
                    pack: rel,
                    error: e.to_string(),
                });
            }
        }
        if (i + 1) % progress_every == 0 || i + 1 == packs.len() {
            info!(
                stage = "indexing",
                scanned_packs = i + 1,
                total_packs = packs.len(),
                canonical_ids = index.len(),
                "index progress"
            );
        }
    }

    index.packs_scanned = packs.len() as u64;
    index.packs_failed = failed_packs.len() as u64;
    index.canonical_ids = index.len() as u64;
    index.generated_at = Some(clock::now_iso());
    debug!(rows_malformed, "pack scan finished");

    Ok(IndexBuild {
        index,
        rows_malformed,
        failed_packs,
        started_at,
    })
}

/// Build and atomically publish the index artifact and its report.
pub fn run_index_build(config: &UniverseConfig) -> Result<IndexReport> {
    let build = build_index(config)?;
    let index = &build.index;

    let report = IndexReport {
        schema: INDEX_REPORT_SCHEMA.to_string(),
        generated_at: index.generated_at.clone().unwrap_or_default(),
        started_at: build.started_at.clone(),
        source_root: index.source_root.clone(),
        outputs: IndexOutputs {
            index_gz: display_path(&config.paths.pack_index),
            report: display_path(&config.paths.pack_index_report),
        },
        counts: IndexCounts {
            packs_scanned: index.packs_scanned,
            packs_failed: index.packs_failed,
            rows_scanned: index.rows_scanned,
            rows_malformed: build.rows_malformed,
            canonical_ids: index.canonical_ids,
        },
        failed_packs: build.failed_packs.clone(),
    };

    publish_gzip_json(config.path(&config.paths.pack_index), index)?;
    publish_json_pretty(config.path(&config.paths.pack_index_report), &report)?;
    info!(
        packs_scanned = index.packs_scanned,
        rows_scanned = index.rows_scanned,
        canonical_ids = index.canonical_ids,
        "canonical index published"
    );
    Ok(report)
}
