//! Universe tooling configuration
//!
//! Every artifact path the tools read or write, relative to a repo root.
//! Defaults mirror the on-disk layout of the universe mirror; a TOML file can
//! override any subset of fields.

use crate::universe::error::{Result, UniverseError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "UNIVERSE_CONFIG";
/// Env var naming the repo root (default: current directory).
pub const REPO_ROOT_ENV: &str = "UNIVERSE_REPO_ROOT";
/// Env toggle for parity gate enforce mode.
pub const PARITY_ENFORCE_ENV: &str = "UNIVERSE_PARITY_ENFORCE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    pub repo_root: PathBuf,
    pub paths: ArtifactPaths,
    pub index: IndexConfig,
    pub parity: ParityConfig,
    pub dropout: DropoutConfig,
    pub coverage: CoverageConfig,
    pub resolution: ResolutionConfig,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            paths: ArtifactPaths::default(),
            index: IndexConfig::default(),
            parity: ParityConfig::default(),
            dropout: DropoutConfig::default(),
            coverage: CoverageConfig::default(),
            resolution: ResolutionConfig::default(),
        }
    }
}

impl UniverseConfig {
    pub fn default_for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: root.into(),
            ..Self::default()
        }
    }

    /// Load from TOML file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| UniverseError::io(path, e))?;
        toml::from_str(&contents).map_err(|e| UniverseError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Resolve the effective config: explicit file, else `UNIVERSE_CONFIG`,
    /// else defaults. An explicit root always wins over the file's root.
    pub fn resolve(root: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<Self> {
        let config_path =
            config_path.or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
        let mut config = match config_path {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        if let Some(root) = root.or_else(|| std::env::var_os(REPO_ROOT_ENV).map(PathBuf::from)) {
            config.repo_root = root;
        }
        Ok(config)
    }

    /// Absolute-or-root-relative path for a configured location.
    pub fn path(&self, rel: &Path) -> PathBuf {
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.repo_root.join(rel)
        }
    }
}

/// Forward-slash rendering of a configured path for reports.
pub fn display_path(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Locations of every input and output artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    /// Base that pack pointers are relative to.
    pub history_base: PathBuf,
    /// Directory scanned for history packs.
    pub history_root: PathBuf,
    pub registry_ndjson: PathBuf,
    pub registry_snapshot: PathBuf,
    pub pack_index: PathBuf,
    pub pack_index_report: PathBuf,
    pub ssot_symbols: PathBuf,
    pub ssot_rows: PathBuf,
    pub by_feature: PathBuf,
    pub scientific_snapshot: PathBuf,
    pub forecast_latest: PathBuf,
    pub marketphase_index: PathBuf,
    pub parity_report: PathBuf,
    pub dropout_ledger: PathBuf,
    pub dropout_summary: PathBuf,
    pub pack_coverage_report: PathBuf,
    pub pack_missing_ids: PathBuf,
    pub search_exact_index: PathBuf,
    pub symbol_resolution_report: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        let reports = Path::new("public/data/universe/v7/reports");
        let ssot = Path::new("public/data/universe/v7/ssot");
        let registry = Path::new("public/data/universe/v7/registry");
        Self {
            history_base: "mirrors/universe-v7".into(),
            history_root: "mirrors/universe-v7/history".into(),
            registry_ndjson: registry.join("registry.ndjson.gz"),
            registry_snapshot: registry.join("registry.snapshot.json.gz"),
            pack_index: reports.join("history_pack_canonical_index.json.gz"),
            pack_index_report: reports.join("history_pack_canonical_index_report.json"),
            ssot_symbols: ssot.join("stocks.max.symbols.json"),
            ssot_rows: ssot.join("stocks.max.rows.json"),
            by_feature: ssot.join("stocks.by_feature.json"),
            scientific_snapshot: "public/data/snapshots/stock-analysis.json".into(),
            forecast_latest: "public/data/forecast/latest.json".into(),
            marketphase_index: "public/data/marketphase/index.json".into(),
            parity_report: reports.join("feature_universe_parity_report.json"),
            dropout_ledger: "mirrors/universe-v7/ledgers/dropout_ledger.ndjson".into(),
            dropout_summary: reports.join("dropout_summary.json"),
            pack_coverage_report: reports.join("forecast_pack_coverage.json"),
            pack_missing_ids: reports.join("forecast_pack_missing_canonical_ids.json"),
            search_exact_index: "public/data/universe/v7/search/search_exact_by_symbol.json.gz"
                .into(),
            symbol_resolution_report: reports.join("index_symbol_resolution_report.json"),
        }
    }
}

/// Pack discovery and progress reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// File name prefixes (case-insensitive) that mark a history pack.
    pub pack_prefixes: Vec<String>,
    pub pack_suffix: String,
    /// Emit a progress event every N packs.
    pub progress_every: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            pack_prefixes: vec!["run_v7_".into(), "inc_".into(), "pack_".into()],
            pack_suffix: ".ndjson.gz".into(),
            progress_every: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityConfig {
    pub tracked_features: Vec<String>,
    pub enforce: bool,
}

impl Default for ParityConfig {
    fn default() -> Self {
        Self {
            tracked_features: ["analyzer", "scientific", "forecast", "marketphase", "elliott"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enforce: false,
        }
    }
}

/// One section of an upstream gap/reason report feeding the dropout ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapSource {
    pub path: PathBuf,
    /// Top-level key holding `{ missing: [...] }`.
    pub section: String,
    /// Features each missing row is recorded against.
    pub features: Vec<String>,
    /// Copy the row's own `details` object into the record.
    #[serde(default)]
    pub merge_details: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropoutConfig {
    pub sources: Vec<GapSource>,
    /// Derive `scientific` drops from `DATA_UNAVAILABLE` snapshot entries.
    pub scientific_from_snapshot: bool,
    pub policy_source: String,
}

impl Default for DropoutConfig {
    fn default() -> Self {
        let report = PathBuf::from("public/data/universe/v7/reports/feature_gap_reasons_report.json");
        Self {
            sources: vec![
                GapSource {
                    path: report.clone(),
                    section: "marketphase_elliott".into(),
                    features: vec!["marketphase".into(), "elliott".into()],
                    merge_details: false,
                },
                GapSource {
                    path: report,
                    section: "forecast".into(),
                    features: vec!["forecast".into()],
                    merge_details: true,
                },
            ],
            scientific_from_snapshot: true,
            policy_source: "gap_reports_v1".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub missing_sample_limit: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            missing_sample_limit: 50,
        }
    }
}

/// A named universe list checked by the symbol resolution verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseList {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub universes: Vec<UniverseList>,
    pub example_limit: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        let list = |name: &str| UniverseList {
            name: name.to_string(),
            path: PathBuf::from(format!("public/data/universe/{}.json", name)),
        };
        Self {
            universes: vec![list("sp500"), list("nasdaq100"), list("dowjones")],
            example_limit: 25,
        }
    }
}

/// `true` when the env toggle is set to a truthy value.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
