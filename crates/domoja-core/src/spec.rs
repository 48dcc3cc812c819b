// ── Accessory specs ──
//
// Desired accessory state, normalized from either configuration shape.
// The reconciler only ever sees this form.

use serde::{Deserialize, Serialize};

use crate::equality::structurally_equal;
use crate::mapping::StateMapping;

/// Which configuration shape a spec was normalized from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecOrigin {
    /// One accessory per device listed under a service/characteristic entry.
    Expanded,
    /// A fully written accessory entry.
    #[default]
    Detailed,
}

/// A device path plus the optional mapping applied on that path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub device: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<StateMapping>,
}

impl DeviceBinding {
    pub fn new(device: impl Into<String>, mapping: Option<StateMapping>) -> Self {
        Self {
            device: device.into(),
            mapping,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicSpec {
    pub characteristic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<DeviceBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<DeviceBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub service: String,
    pub characteristics: Vec<CharacteristicSpec>,
}

/// Desired state of one accessory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessorySpec {
    pub display_name: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub origin: SpecOrigin,
    pub services: Vec<ServiceSpec>,
}

impl AccessorySpec {
    /// Spec for one device of a service/characteristic entry.
    ///
    /// Both `get` and `set` are bound to `device`, each with its own
    /// optional mapping.
    pub fn expanded(
        display_name: impl Into<String>,
        service: &str,
        characteristic: &str,
        device: &str,
        get: Option<StateMapping>,
        set: Option<StateMapping>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            disabled: false,
            origin: SpecOrigin::Expanded,
            services: vec![ServiceSpec {
                service: kind_name(service),
                characteristics: vec![CharacteristicSpec {
                    characteristic: kind_name(characteristic),
                    get: Some(DeviceBinding::new(device, get)),
                    set: Some(DeviceBinding::new(device, set)),
                }],
            }],
        }
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Deep structural comparison of the full spec tree.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        structurally_equal(self, other)
    }

    /// Every `(service, characteristic)` pair with its spec.
    pub fn characteristics(&self) -> impl Iterator<Item = (&str, &CharacteristicSpec)> {
        self.services.iter().flat_map(|s| {
            s.characteristics
                .iter()
                .map(move |c| (s.service.as_str(), c))
        })
    }

    pub fn find_characteristic(&self, service: &str, characteristic: &str) -> Option<&CharacteristicSpec> {
        self.characteristics()
            .find(|(s, c)| *s == service && c.characteristic == characteristic)
            .map(|(_, c)| c)
    }

    /// Device of the single `get` binding, when there is exactly one.
    pub fn sole_get_device(&self) -> Option<&str> {
        let mut gets = self.characteristics().filter_map(|(_, c)| c.get.as_ref());
        match (gets.next(), gets.next()) {
            (Some(binding), None) => Some(binding.device.as_str()),
            _ => None,
        }
    }

    /// `true` when any characteristic reads from `device`.
    pub fn reads_device(&self, device: &str) -> bool {
        self.characteristics()
            .any(|(_, c)| c.get.as_ref().is_some_and(|g| g.device == device))
    }

    /// All device paths referenced by a `get` or `set` binding.
    pub fn bound_devices(&self) -> Vec<&str> {
        let mut devices: Vec<&str> = self
            .characteristics()
            .flat_map(|(_, c)| [c.get.as_ref(), c.set.as_ref()])
            .flatten()
            .map(|b| b.device.as_str())
            .collect();
        devices.sort_unstable();
        devices.dedup();
        devices
    }
}

/// Service and characteristic names are written with or without spaces
/// (`"Current Temperature"`); the host vocabulary has none.
pub fn kind_name(name: &str) -> String {
    name.chars().filter(|c| *c != ' ').collect()
}
