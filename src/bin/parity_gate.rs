//! Feature Universe Parity Gate
//!
//! Compares each tracked feature's symbol set with the SSOT universe and
//! reports live coverage. In enforce mode any violation exits with code 1.
//!
//! Usage:
//!   cargo run --release --bin parity_gate -- [--enforce] [--root <DIR>] [--config <FILE>]
//!
//! Enforce mode is also enabled by `UNIVERSE_PARITY_ENFORCE=true` or
//! `parity.enforce = true` in the config file.

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use universe_registry::universe::cli::{print_result, run_main, CommonArgs};
use universe_registry::universe::config::{display_path, env_flag, PARITY_ENFORCE_ENV};
use universe_registry::universe::parity_gate::{run_parity_gate, GateMode, GateStatus};

#[derive(Parser, Debug)]
#[command(name = "parity_gate")]
#[command(about = "Gate per-feature symbol universes against the SSOT")]
struct Cli {
    /// Fail (exit 1) on any violation instead of warning
    #[arg(long)]
    enforce: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn run(cli: Cli) -> Result<i32> {
    let config = cli.common.load_config()?;
    let mode = if cli.enforce || config.parity.enforce || env_flag(PARITY_ENFORCE_ENV) {
        GateMode::Enforce
    } else {
        GateMode::Report
    };

    let report = run_parity_gate(&config, mode)?;
    let code = report.exit_code();
    print_result(&json!({
        "status": if report.status == GateStatus::Fail { "FAIL" } else { "OK" },
        "code": code,
        "gate_status": report.status,
        "report": display_path(&config.paths.parity_report),
        "violations": report.violations,
        "ssot_symbols": report.ssot.symbols_count,
    }))?;
    Ok(code)
}

fn main() {
    run_main("parity_gate", || run(Cli::parse()))
}
