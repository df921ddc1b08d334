//! Entry-point plumbing shared by the tool binaries.
//!
//! Each tool prints exactly one JSON line: its result on stdout, or a failure
//! line on stderr followed by exit code 1. Logs go to stderr through tracing.

use crate::universe::config::{UniverseConfig, CONFIG_PATH_ENV, REPO_ROOT_ENV};
use crate::universe::error::UniverseError;
use clap::Args;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Flags every tool accepts.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Repository root all configured paths are relative to
    #[arg(long, env = REPO_ROOT_ENV)]
    pub root: Option<PathBuf>,

    /// TOML config file overriding default paths
    #[arg(long, env = CONFIG_PATH_ENV)]
    pub config: Option<PathBuf>,
}

impl CommonArgs {
    pub fn load_config(&self) -> Result<UniverseConfig, UniverseError> {
        UniverseConfig::resolve(self.root.clone(), self.config.clone())
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "universe_registry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Write the single result line to stdout.
pub fn print_result<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let line = serde_json::to_string(value)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    Ok(())
}

/// Machine-readable failure line for an error escaping a tool.
pub fn failure_line(err: &anyhow::Error) -> serde_json::Value {
    let error_code = err
        .downcast_ref::<UniverseError>()
        .map(UniverseError::code)
        .unwrap_or("INTERNAL");
    json!({
        "status": "FAIL",
        "code": 1,
        "reason": format!("{:#}", err),
        "error_code": error_code,
    })
}

/// Run a tool body and exit with its code. Errors become one JSON line on
/// stderr and exit code 1.
pub fn run_main<F>(tool: &str, body: F) -> !
where
    F: FnOnce() -> anyhow::Result<i32>,
{
    dotenv::dotenv().ok();
    init_tracing();

    match body() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(tool, error = %format!("{:#}", err), "tool failed");
            let _ = writeln!(std::io::stderr(), "{}", failure_line(&err));
            std::process::exit(1);
        }
    }
}
