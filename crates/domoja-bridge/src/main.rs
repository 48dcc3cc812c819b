//! `domoja-bridge`: keeps configured accessories in step with a Domoja
//! server, and offers offline checks and listings of that configuration.

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(log_level(&cli));

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// `run` is long-lived and reports device changes at info, so it starts one
/// level more verbose than the one-shot commands. `RUST_LOG` overrides both.
fn log_level(cli: &Cli) -> &'static str {
    let base = u8::from(matches!(cli.command, Command::Run));
    match (cli.global.quiet, base.saturating_add(cli.global.verbose)) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    }
}

fn init_tracing(level: &str) {
    // Logs go to stderr; stdout carries command output only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    tracing::debug!(command = ?cli.command, "dispatching command");
    commands::dispatch(cli.command, &cli.global).await
}
