//! Pointer Integrity Repair
//!
//! Reconciles registry pack pointers (line-delimited and snapshot forms)
//! against the canonical index: binds missing pointers, rebinds drifted ones,
//! clears phantom ones.
//!
//! Usage:
//!   cargo run --release --bin repair_pointers -- [--root <DIR>] [--config <FILE>]

use anyhow::Result;
use clap::Parser;
use universe_registry::universe::cli::{print_result, run_main, CommonArgs};
use universe_registry::universe::pointer_repair::run_pointer_repair;

#[derive(Parser, Debug)]
#[command(name = "repair_pointers")]
#[command(about = "Repair registry history-pack pointers against the canonical index")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn run(cli: Cli) -> Result<i32> {
    let config = cli.common.load_config()?;
    let report = run_pointer_repair(&config)?;
    print_result(&report)?;
    Ok(0)
}

fn main() {
    run_main("repair_pointers", || run(Cli::parse()))
}
