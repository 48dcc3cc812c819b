// ── Accessory entries ──
//
// The two shapes an accessory can be written in, and their normalization
// into `AccessorySpec`. Keys are camelCase so existing JSON configurations
// load verbatim.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use domoja_core::{
    AccessorySpec, CharacteristicSpec, CoreError, DeviceBinding, ServiceCatalog, ServiceSpec,
    SpecOrigin, StateMapping, check_unique_display_names, spec::kind_name,
};

use crate::ConfigError;

/// One entry of the `accessories` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccessoryEntry {
    ByServiceCharacteristic(ServiceCharacteristicEntry),
    Detailed(DetailedEntry),
}

/// One accessory per listed device, all sharing a service/characteristic.
///
/// ```json
/// { "service": "Switch", "characteristic": "On",
///   "get": { "mapping": ["ON", true, "OFF", false] },
///   "devicesAndDisplayNames": { "aquarium.lampes": "Lampes aquarium" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCharacteristicEntry {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub service: String,
    pub characteristic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<MappingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<MappingEntry>,
    pub devices_and_display_names: BTreeMap<String, DisplayNameEntry>,
}

/// `"Lampes aquarium"` or `{ "displayName": "Lampes aquarium" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayNameEntry {
    Name(String),
    #[serde(rename_all = "camelCase")]
    Detailed { display_name: String },
}

impl DisplayNameEntry {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { display_name: name } => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<StateMapping>,
}

/// A fully written accessory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedEntry {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub display_name: String,
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service: String,
    pub characteristics: Vec<CharacteristicEntry>,
}

/// A characteristic either names a shared `device` (bound on both paths)
/// or carries its own `get`/`set` bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicEntry {
    pub characteristic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<BindingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<BindingEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<StateMapping>,
}

// ── Normalization ───────────────────────────────────────────────────

impl AccessoryEntry {
    /// Expand into one or more specs.
    pub fn to_specs(&self) -> Result<Vec<AccessorySpec>, ConfigError> {
        match self {
            Self::ByServiceCharacteristic(entry) => Ok(entry.to_specs()),
            Self::Detailed(entry) => entry.to_spec().map(|spec| vec![spec]),
        }
    }
}

impl ServiceCharacteristicEntry {
    pub fn to_specs(&self) -> Vec<AccessorySpec> {
        let get = self.get.as_ref().and_then(|g| g.mapping.clone());
        let set = self.set.as_ref().and_then(|s| s.mapping.clone());
        self.devices_and_display_names
            .iter()
            .map(|(device, name)| {
                AccessorySpec::expanded(
                    name.display_name(),
                    &self.service,
                    &self.characteristic,
                    device,
                    get.clone(),
                    set.clone(),
                )
                .with_disabled(self.disabled)
            })
            .collect()
    }
}

impl DetailedEntry {
    pub fn to_spec(&self) -> Result<AccessorySpec, ConfigError> {
        let services = self
            .services
            .iter()
            .map(|s| {
                let characteristics = s
                    .characteristics
                    .iter()
                    .map(|c| c.to_spec(&self.display_name, &s.service))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ServiceSpec {
                    service: kind_name(&s.service),
                    characteristics,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(AccessorySpec {
            display_name: self.display_name.clone(),
            disabled: self.disabled,
            origin: SpecOrigin::Detailed,
            services,
        })
    }
}

impl CharacteristicEntry {
    fn to_spec(&self, accessory: &str, service: &str) -> Result<CharacteristicSpec, ConfigError> {
        let field = || format!("accessories.{accessory}.{service}.{}", self.characteristic);

        let (get, set) = if let Some(device) = &self.device {
            // A binding's own device wins over the shared one.
            let bind = |b: Option<&BindingEntry>| {
                let b = b.cloned().unwrap_or_default();
                DeviceBinding::new(b.device.unwrap_or_else(|| device.clone()), b.mapping)
            };
            (Some(bind(self.get.as_ref())), Some(bind(self.set.as_ref())))
        } else {
            if self.get.is_none() && self.set.is_none() {
                return Err(ConfigError::Validation {
                    field: field(),
                    reason: "needs a `device`, a `get` or a `set`".into(),
                });
            }
            let bind = |b: &BindingEntry, direction: &str| {
                b.device
                    .clone()
                    .map(|device| DeviceBinding::new(device, b.mapping.clone()))
                    .ok_or_else(|| ConfigError::Validation {
                        field: format!("{}.{direction}", field()),
                        reason: "missing `device`".into(),
                    })
            };
            (
                self.get.as_ref().map(|b| bind(b, "get")).transpose()?,
                self.set.as_ref().map(|b| bind(b, "set")).transpose()?,
            )
        };

        Ok(CharacteristicSpec {
            characteristic: kind_name(&self.characteristic),
            get,
            set,
        })
    }
}

/// Normalize every entry, in file order.
pub fn normalize(entries: &[AccessoryEntry]) -> Result<Vec<AccessorySpec>, ConfigError> {
    let mut specs = Vec::new();
    for entry in entries {
        specs.extend(entry.to_specs()?);
    }
    Ok(specs)
}

// ── Validation ──────────────────────────────────────────────────────

/// Non-fatal configuration finding.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    /// Mapping with an odd number of entries; the dangling one is ignored.
    OddMapping {
        accessory: String,
        service: String,
        characteristic: String,
        direction: &'static str,
        mapping: StateMapping,
    },
    /// Service or characteristic the host does not know; that unit is skipped.
    UnknownKind { accessory: String, reason: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OddMapping {
                accessory,
                service,
                characteristic,
                direction,
                mapping,
            } => write!(
                f,
                "{accessory}.{service}.{characteristic}: {direction} mapping \"{mapping}\" should have a pair length"
            ),
            Self::UnknownKind { accessory, reason } => write!(f, "{accessory}: {reason}"),
        }
    }
}

/// Refuse duplicate display names among enabled specs and collect warnings.
pub fn validate(specs: &[AccessorySpec], catalog: &ServiceCatalog) -> Result<Vec<ConfigWarning>, ConfigError> {
    check_unique_display_names(specs).map_err(|e| match e {
        CoreError::DuplicateDisplayName { name } => ConfigError::DuplicateDisplayName { name },
        other => ConfigError::Validation {
            field: "accessories".into(),
            reason: other.to_string(),
        },
    })?;

    let mut warnings = Vec::new();
    for spec in specs.iter().filter(|s| s.is_enabled()) {
        for (service, c) in spec.characteristics() {
            for (direction, binding) in [("get", &c.get), ("set", &c.set)] {
                let Some(mapping) = binding.as_ref().and_then(|b| b.mapping.as_ref()) else {
                    continue;
                };
                if !mapping.is_well_formed() {
                    warnings.push(ConfigWarning::OddMapping {
                        accessory: spec.display_name.clone(),
                        service: service.to_owned(),
                        characteristic: c.characteristic.clone(),
                        direction,
                        mapping: mapping.clone(),
                    });
                }
            }
        }
        warnings.extend(catalog.check(spec).into_iter().map(|e| ConfigWarning::UnknownKind {
            accessory: spec.display_name.clone(),
            reason: e.to_string(),
        }));
    }
    Ok(warnings)
}
