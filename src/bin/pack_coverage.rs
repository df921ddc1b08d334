//! Forecast Pack Coverage Report
//!
//! Measures whether the best registry row per SSOT ticker is physically
//! present in the history pack it points to.
//!
//! Usage:
//!   cargo run --release --bin pack_coverage -- [--root <DIR>] [--config <FILE>]

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use universe_registry::universe::cli::{print_result, run_main, CommonArgs};
use universe_registry::universe::config::display_path;
use universe_registry::universe::pack_coverage::run_pack_coverage;

#[derive(Parser, Debug)]
#[command(name = "pack_coverage")]
#[command(about = "Report registry pointer coverage against physical pack contents")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn run(cli: Cli) -> Result<i32> {
    let config = cli.common.load_config()?;
    let report = run_pack_coverage(&config)?;
    let m = &report.pack_match;
    print_result(&json!({
        "ok": true,
        "out": display_path(&config.paths.pack_coverage_report),
        "missing_list_out": display_path(&config.paths.pack_missing_ids),
        "universe_symbols": report.universe.symbols_total,
        "registry_best_rows": report.universe.registry_best_rows,
        "found_in_pack": m.found_in_pack,
        "missing_in_pack": m.missing_in_pack,
        "found_ratio_pct": m.found_ratio_pct,
        "resolved_found_in_pack": m.resolved_found_in_pack,
        "resolved_missing_in_pack": m.resolved_missing_in_pack,
        "resolved_ratio_pct": m.resolved_ratio_pct,
    }))?;
    Ok(0)
}

fn main() {
    run_main("pack_coverage", || run(Cli::parse()))
}
