//! Index Symbol Resolution Check
//!
//! Resolves the S&P 500, Nasdaq-100 and Dow lists through the exact-symbol
//! search index and reports unresolved and false-dead selections.
//!
//! Usage:
//!   cargo run --release --bin verify_symbol_resolution -- [--root <DIR>] [--config <FILE>]

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use universe_registry::universe::cli::{print_result, run_main, CommonArgs};
use universe_registry::universe::config::display_path;
use universe_registry::universe::parity_gate::GateStatus;
use universe_registry::universe::symbol_resolution::run_symbol_resolution;

#[derive(Parser, Debug)]
#[command(name = "verify_symbol_resolution")]
#[command(about = "Verify index universes resolve to live registry rows")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn run(cli: Cli) -> Result<i32> {
    let config = cli.common.load_config()?;
    let report = run_symbol_resolution(&config)?;
    print_result(&json!({
        "ok": report.status == GateStatus::Pass,
        "status": report.status,
        "out": display_path(&config.paths.symbol_resolution_report),
        "totals": report.totals,
    }))?;
    Ok(0)
}

fn main() {
    run_main("verify_symbol_resolution", || run(Cli::parse()))
}
