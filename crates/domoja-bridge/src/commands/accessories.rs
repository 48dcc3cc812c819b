//! `accessories`: per-characteristic view of the configured accessories.

use domoja_core::{CharacteristicSummary, summarize};
use tabled::Tabled;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct CharacteristicRow {
    #[tabled(rename = "Accessory")]
    accessory: String,
    #[tabled(rename = "Service.Characteristic")]
    unit: String,
    #[tabled(rename = "Get")]
    get: String,
    #[tabled(rename = "Set")]
    set: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

impl From<&CharacteristicSummary> for CharacteristicRow {
    fn from(s: &CharacteristicSummary) -> Self {
        Self {
            accessory: s.accessory.clone(),
            unit: format!("{}.{}", s.service, s.characteristic),
            get: s.get.clone().unwrap_or_else(|| "-".into()),
            set: s.set.clone().unwrap_or_else(|| "-".into()),
            enabled: if s.disabled { "no" } else { "yes" }.into(),
        }
    }
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let specs = util::load(global)?.accessory_specs()?;
    let rows = summarize(&specs);

    let out = output::render_list(&global.output, &rows, |s| CharacteristicRow::from(s), |s| {
        format!("{}.{}.{}", s.accessory, s.service, s.characteristic)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
