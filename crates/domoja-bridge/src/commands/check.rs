//! `check`: validate the configuration offline.

use domoja_config::validate;
use domoja_core::ServiceCatalog;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let config = util::load(global)?;
    let specs = config.accessory_specs()?;
    let warnings = validate(&specs, &ServiceCatalog::homekit())?;

    let color = output::should_color(&global.color);
    let mut lines: Vec<String> = warnings
        .iter()
        .map(|w| output::warning(&format!("warning: {w}"), color))
        .collect();

    let enabled = specs.iter().filter(|s| s.is_enabled()).count();
    lines.push(output::success(
        &format!(
            "Configuration is valid: {enabled} accessory(ies), {} disabled",
            specs.len() - enabled
        ),
        color,
    ));

    output::print_output(&lines.join("\n"), global.quiet);
    Ok(())
}
