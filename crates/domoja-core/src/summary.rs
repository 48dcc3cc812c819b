// Per-characteristic overview of an accessory set, for logs and the CLI.

use serde::Serialize;
use tracing::debug;

use crate::spec::{AccessorySpec, DeviceBinding};

/// One row per characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicSummary {
    pub accessory: String,
    pub service: String,
    pub characteristic: String,
    /// `device` or `device: a=>b, c=>d`.
    pub get: Option<String>,
    pub set: Option<String>,
    pub disabled: bool,
}

pub fn summarize(specs: &[AccessorySpec]) -> Vec<CharacteristicSummary> {
    specs
        .iter()
        .flat_map(|spec| {
            spec.characteristics().map(move |(service, c)| CharacteristicSummary {
                accessory: spec.display_name.clone(),
                service: service.to_owned(),
                characteristic: c.characteristic.clone(),
                get: c.get.as_ref().map(render_binding),
                set: c.set.as_ref().map(render_binding),
                disabled: spec.disabled,
            })
        })
        .collect()
}

pub fn render_binding(binding: &DeviceBinding) -> String {
    match &binding.mapping {
        Some(mapping) => format!("{}: {mapping}", binding.device),
        None => binding.device.clone(),
    }
}

/// Emit the summary at debug level, grouped by accessory.
pub fn log_summary<'a>(specs: impl IntoIterator<Item = &'a AccessorySpec>) {
    for spec in specs {
        debug!("Accessory \"{}\":", spec.display_name);
        for (service, c) in spec.characteristics() {
            debug!("\tService.Characteristic \"{service}.{}\":", c.characteristic);
            if let Some(get) = &c.get {
                debug!("\t\tget: {}", render_binding(get));
            }
            if let Some(set) = &c.set {
                debug!("\t\tset: {}", render_binding(set));
            }
        }
    }
}
