//! Universe Registry Tooling
//!
//! Batch tools that keep the canonical instrument registry consistent with the
//! history packs it points into, and gate feature coverage against the SSOT.
//!
//! # Pipeline
//!
//! ```text
//!  history packs (*.ndjson.gz)
//!          │  stream, one row at a time
//!          ▼
//! ┌──────────────────────┐        ┌──────────────────────────────┐
//! │ pack_index           │───────▶│ pointer_repair                │
//! │ id → sorted pack list│        │ registry ndjson + snapshot    │
//! └──────────┬───────────┘        └──────────────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐   ┌────────────────┐   ┌────────────────────┐
//! │ pack_coverage        │   │ parity_gate    │   │ dropout_ledger     │
//! │ pointer → pack check │   │ SSOT vs feature│   │ append-only drops  │
//! └──────────────────────┘   └────────────────┘   └────────────────────┘
//!
//!            every artifact ──▶ publish (temp sibling + rename)
//! ```
//!
//! # Guarantees
//!
//! - **Publish**: readers see the old or the new artifact, never a partial one
//! - **Index**: derived from packs only, rebuilt wholesale each run
//! - **Repair**: a second run with the same index mutates nothing
//! - **Ledger**: previous bytes are always a prefix of the new ledger unless reset

pub mod canonical;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dropout_ledger;
pub mod error;
pub mod ndjson;
// Supplementary report: are pointed-to packs physically holding their rows
pub mod pack_coverage;
pub mod pack_index;
pub mod parity_gate;
pub mod pointer_repair;
pub mod publish;
pub mod registry;
// Exact-symbol search index vs. index universes (S&P 500, Nasdaq-100, Dow)
pub mod symbol_resolution;
#[cfg(test)]
mod test_support;
#[cfg(test)]
mod publish_tests;
#[cfg(test)]
mod pack_coverage_tests;
#[cfg(test)]
mod symbol_resolution_tests;

// Re-exports for convenience
pub use config::UniverseConfig;
pub use dropout_ledger::{run_dropout_emit, DropoutRecord, DropoutSummary, EmitReport};
pub use error::{Result, UniverseError};
pub use pack_coverage::{run_pack_coverage, CoverageReport, PackMatch};
pub use pack_index::{run_index_build, CanonicalIndex, IndexReport};
pub use parity_gate::{run_parity_gate, GateMode, GateStatus, ParityReport};
pub use pointer_repair::{apply_pointer_fix, run_pointer_repair, PointerAction, PointerRepairReport};
pub use publish::{publish_bytes, publish_gzip_json, publish_json_pretty, GzipStagedFile, StagedFile};
pub use registry::{RegistryRow, RegistrySnapshot};
pub use symbol_resolution::{run_symbol_resolution, ResolutionReport};
