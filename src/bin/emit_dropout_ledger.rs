//! Dropout Ledger Writer
//!
//! Normalizes upstream gap reports and scientific snapshot gaps into dropout
//! records, appends them to the ledger and regenerates the dropout summary.
//!
//! Usage:
//!   cargo run --release --bin emit_dropout_ledger -- [--reset] [--root <DIR>] [--config <FILE>]

use anyhow::Result;
use clap::Parser;
use universe_registry::universe::cli::{print_result, run_main, CommonArgs};
use universe_registry::universe::dropout_ledger::run_dropout_emit;

#[derive(Parser, Debug)]
#[command(name = "emit_dropout_ledger")]
#[command(about = "Append dropout records from gap reports to the dropout ledger")]
struct Cli {
    /// Truncate the ledger before appending (re-baseline)
    #[arg(long)]
    reset: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn run(cli: Cli) -> Result<i32> {
    let config = cli.common.load_config()?;
    let report = run_dropout_emit(&config, cli.reset)?;
    print_result(&report)?;
    Ok(0)
}

fn main() {
    run_main("emit_dropout_ledger", || run(Cli::parse()))
}
