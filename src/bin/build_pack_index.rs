//! History-Pack Canonical Index Builder
//!
//! Scans every history pack under the history root and publishes the
//! canonical id → pack list index plus a plain-JSON scan report.
//!
//! Usage:
//!   cargo run --release --bin build_pack_index -- [--root <DIR>] [--config <FILE>]

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use universe_registry::universe::cli::{print_result, run_main, CommonArgs};
use universe_registry::universe::config::display_path;
use universe_registry::universe::pack_index::run_index_build;

#[derive(Parser, Debug)]
#[command(name = "build_pack_index")]
#[command(about = "Rebuild the history-pack canonical index from scratch")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn run(cli: Cli) -> Result<i32> {
    let config = cli.common.load_config()?;
    let report = run_index_build(&config)?;
    print_result(&json!({
        "ok": true,
        "out": report.outputs.index_gz,
        "report": display_path(&config.paths.pack_index_report),
        "packs_scanned": report.counts.packs_scanned,
        "packs_failed": report.counts.packs_failed,
        "rows_scanned": report.counts.rows_scanned,
        "canonical_ids": report.counts.canonical_ids,
    }))?;
    Ok(0)
}

fn main() {
    run_main("build_pack_index", || run(Cli::parse()))
}
