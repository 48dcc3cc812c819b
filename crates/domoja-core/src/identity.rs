// ── Accessory identity ──
//
// How a desired spec finds "its" previously materialized accessory.

use serde::{Deserialize, Serialize};

use crate::spec::{AccessorySpec, SpecOrigin};

/// Strategy used to pair desired specs with previous accessories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityPolicy {
    /// Same display name.
    DisplayName,
    /// Same device behind the sole `get` binding, falling back to display
    /// name when either side has no single `get` device.
    BoundDevice,
    /// Bound device between two expanded specs, display name otherwise.
    /// Renaming an expanded entry's label then updates the same accessory.
    #[default]
    Hybrid,
}

impl IdentityPolicy {
    /// Whether `previous` is the same logical accessory as `desired`.
    pub fn matches(self, previous: &AccessorySpec, desired: &AccessorySpec) -> bool {
        match self {
            Self::DisplayName => same_name(previous, desired),
            Self::BoundDevice => same_device(previous, desired).unwrap_or_else(|| same_name(previous, desired)),
            Self::Hybrid => {
                if previous.origin == SpecOrigin::Expanded && desired.origin == SpecOrigin::Expanded {
                    same_device(previous, desired).unwrap_or_else(|| same_name(previous, desired))
                } else {
                    same_name(previous, desired)
                }
            }
        }
    }
}

fn same_name(a: &AccessorySpec, b: &AccessorySpec) -> bool {
    a.display_name == b.display_name
}

fn same_device(a: &AccessorySpec, b: &AccessorySpec) -> Option<bool> {
    Some(a.sole_get_device()? == b.sole_get_device()?)
}
