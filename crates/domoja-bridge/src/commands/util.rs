//! Shared helpers for command handlers.

use std::path::PathBuf;

use domoja_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// `--config`, or the platform default location.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(domoja_config::config_path)
}

/// Load the configuration file and apply CLI overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut config = domoja_config::load_config(&config_file(global))?;
    if global.insecure {
        config.insecure = true;
    }
    Ok(config)
}
