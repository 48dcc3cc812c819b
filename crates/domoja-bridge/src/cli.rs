//! Clap derive structures for the `domoja-bridge` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// domoja-bridge -- expose Domoja devices as bridge accessories
#[derive(Debug, Parser)]
#[command(
    name = "domoja-bridge",
    version,
    about = "Bridge Domoja devices to accessory hosts",
    long_about = "Keeps a set of accessories, declared in a configuration file, in sync\n\
        with the devices of a Domoja server: startup reconciliation, live\n\
        updates over the push channel, and commands back to the devices.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (JSON or TOML)
    #[arg(long, short = 'c', env = "DOMOJA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DOMOJA_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "DOMOJA_INSECURE", global = true)]
    pub insecure: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate the configuration file without contacting the server
    Check,

    /// List the devices known to the Domoja server
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Show the accessories the configuration declares
    #[command(alias = "acc", alias = "a")]
    Accessories,

    /// Log in, reconcile accessories, and follow device changes until Ctrl-C
    ///
    /// Sending SIGHUP reloads the configuration and reconciles again.
    Run,
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Only devices whose path starts with this prefix
    #[arg(long, short = 'p')]
    pub prefix: Option<String>,

    /// Only devices carrying this tag
    #[arg(long, short = 't')]
    pub tag: Option<String>,
}
