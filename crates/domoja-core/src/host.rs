// ── Host accessory registry ──
//
// The narrow surface the engine needs from the bridge host: register,
// unregister, push a characteristic value. The host owns physical
// registration and characteristic objects; the engine only hands it
// opaque handles and specs.

use std::collections::BTreeMap;
use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::spec::AccessorySpec;

// ── Identity token ───────────────────────────────────────────────────

const HANDLE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d7_5b08_a2c1_d4e5_f607_1829);

/// Opaque host identity of an accessory, stable for a given display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessoryHandle(Uuid);

impl AccessoryHandle {
    pub fn for_display_name(display_name: &str) -> Self {
        Self(Uuid::new_v5(&HANDLE_NAMESPACE, display_name.as_bytes()))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AccessoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A materialized accessory: host handle plus the spec it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessory {
    pub handle: AccessoryHandle,
    pub spec: AccessorySpec,
}

impl Accessory {
    pub fn from_spec(spec: AccessorySpec) -> Self {
        Self {
            handle: AccessoryHandle::for_display_name(&spec.display_name),
            spec,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.spec.display_name
    }
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("Service \"{service}\" does not exist. Existing services: {}", .known.join(", "))]
    UnknownService { service: String, known: Vec<String> },

    #[error(
        "Characteristic \"{characteristic}\" does not exist in service \"{service}\". Possible characteristics: {}",
        .known.join(", ")
    )]
    UnknownCharacteristic {
        service: String,
        characteristic: String,
        known: Vec<String>,
    },

    #[error("Service \"{service}\" is not part of accessory {handle}")]
    ServiceNotInAccessory {
        handle: AccessoryHandle,
        service: String,
    },

    #[error("Accessory {handle} is not registered")]
    UnknownAccessory { handle: AccessoryHandle },

    #[error("Accessory {handle} is already registered")]
    AlreadyRegistered { handle: AccessoryHandle },

    #[error("Host rejected the request: {0}")]
    Rejected(String),
}

// ── Registry seam ────────────────────────────────────────────────────

/// Capabilities the engine calls on the bridge host.
pub trait HostAccessoryRegistry: Send + Sync + 'static {
    /// Materialize an accessory. Services or characteristics the host cannot
    /// resolve are skipped by the host; an `Err` means nothing was registered.
    fn register(&self, accessory: &Accessory) -> Result<(), HostError>;

    fn unregister(&self, handle: AccessoryHandle) -> Result<(), HostError>;

    fn update_characteristic(
        &self,
        handle: AccessoryHandle,
        service: &str,
        characteristic: &str,
        value: Value,
    ) -> Result<(), HostError>;
}

// ── Service catalog ──────────────────────────────────────────────────

/// Service kinds and the characteristics each one accepts.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: BTreeMap<String, Vec<String>>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: &str, characteristics: &[&str]) -> Self {
        self.services.insert(
            service.to_owned(),
            characteristics.iter().map(|c| (*c).to_owned()).collect(),
        );
        self
    }

    /// Common HomeKit services with required and optional characteristics.
    pub fn homekit() -> Self {
        Self::new()
            .with_service("Switch", &["On", "Name"])
            .with_service("Outlet", &["On", "OutletInUse", "Name"])
            .with_service(
                "Lightbulb",
                &["On", "Brightness", "Hue", "Saturation", "ColorTemperature", "Name"],
            )
            .with_service("Fan", &["On", "RotationDirection", "RotationSpeed", "Name"])
            .with_service(
                "TemperatureSensor",
                &["CurrentTemperature", "StatusActive", "StatusFault", "StatusLowBattery", "StatusTampered", "Name"],
            )
            .with_service(
                "HumiditySensor",
                &["CurrentRelativeHumidity", "StatusActive", "StatusFault", "StatusLowBattery", "StatusTampered", "Name"],
            )
            .with_service(
                "LightSensor",
                &["CurrentAmbientLightLevel", "StatusActive", "StatusFault", "StatusLowBattery", "StatusTampered", "Name"],
            )
            .with_service(
                "ContactSensor",
                &["ContactSensorState", "StatusActive", "StatusFault", "StatusLowBattery", "StatusTampered", "Name"],
            )
            .with_service(
                "MotionSensor",
                &["MotionDetected", "StatusActive", "StatusFault", "StatusLowBattery", "StatusTampered", "Name"],
            )
            .with_service(
                "LeakSensor",
                &["LeakDetected", "StatusActive", "StatusFault", "StatusLowBattery", "StatusTampered", "Name"],
            )
            .with_service(
                "Thermostat",
                &[
                    "CurrentHeatingCoolingState",
                    "TargetHeatingCoolingState",
                    "CurrentTemperature",
                    "TargetTemperature",
                    "TemperatureDisplayUnits",
                    "CurrentRelativeHumidity",
                    "TargetRelativeHumidity",
                    "CoolingThresholdTemperature",
                    "HeatingThresholdTemperature",
                    "Name",
                ],
            )
            .with_service(
                "WindowCovering",
                &[
                    "CurrentPosition",
                    "TargetPosition",
                    "PositionState",
                    "HoldPosition",
                    "ObstructionDetected",
                    "Name",
                ],
            )
            .with_service(
                "GarageDoorOpener",
                &["CurrentDoorState", "TargetDoorState", "ObstructionDetected", "LockCurrentState", "LockTargetState", "Name"],
            )
            .with_service("LockMechanism", &["LockCurrentState", "LockTargetState", "Name"])
            .with_service(
                "Valve",
                &["Active", "InUse", "ValveType", "SetDuration", "RemainingDuration", "IsConfigured", "StatusFault", "Name"],
            )
            .with_service(
                "SecuritySystem",
                &["SecuritySystemCurrentState", "SecuritySystemTargetState", "StatusFault", "StatusTampered", "Name"],
            )
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Check that `service.characteristic` exists, naming the alternatives
    /// when it does not.
    pub fn resolve(&self, service: &str, characteristic: &str) -> Result<(), HostError> {
        let Some(known) = self.services.get(service) else {
            return Err(HostError::UnknownService {
                service: service.to_owned(),
                known: self.service_names(),
            });
        };
        if known.iter().any(|c| c == characteristic) {
            Ok(())
        } else {
            Err(HostError::UnknownCharacteristic {
                service: service.to_owned(),
                characteristic: characteristic.to_owned(),
                known: known.clone(),
            })
        }
    }

    /// Every unresolvable unit of a spec.
    pub fn check(&self, spec: &AccessorySpec) -> Vec<HostError> {
        spec.characteristics()
            .filter_map(|(service, c)| self.resolve(service, &c.characteristic).err())
            .collect()
    }
}

// ── In-memory host ───────────────────────────────────────────────────

/// A registered accessory as the in-memory host sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct HostedAccessory {
    pub display_name: String,
    /// service → characteristic → last value pushed.
    pub services: BTreeMap<String, BTreeMap<String, Option<Value>>>,
}

/// Host that keeps accessories and characteristic values in memory.
///
/// Used by the standalone `run` mode and by tests.
pub struct MemoryHost {
    catalog: ServiceCatalog,
    accessories: DashMap<AccessoryHandle, HostedAccessory>,
}

impl MemoryHost {
    pub fn new(catalog: ServiceCatalog) -> Self {
        Self {
            catalog,
            accessories: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }

    pub fn is_registered(&self, handle: AccessoryHandle) -> bool {
        self.accessories.contains_key(&handle)
    }

    pub fn accessory(&self, handle: AccessoryHandle) -> Option<HostedAccessory> {
        self.accessories.get(&handle).map(|a| a.value().clone())
    }

    /// Last value pushed to a characteristic.
    pub fn value(&self, handle: AccessoryHandle, service: &str, characteristic: &str) -> Option<Value> {
        self.accessories
            .get(&handle)?
            .services
            .get(service)?
            .get(characteristic)?
            .clone()
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(ServiceCatalog::homekit())
    }
}

impl HostAccessoryRegistry for MemoryHost {
    fn register(&self, accessory: &Accessory) -> Result<(), HostError> {
        if self.accessories.contains_key(&accessory.handle) {
            return Err(HostError::AlreadyRegistered {
                handle: accessory.handle,
            });
        }
        info!(accessory = accessory.display_name(), "adding new accessory");

        let mut services: BTreeMap<String, BTreeMap<String, Option<Value>>> = BTreeMap::new();
        for (service, c) in accessory.spec.characteristics() {
            match self.catalog.resolve(service, &c.characteristic) {
                Ok(()) => {
                    services
                        .entry(service.to_owned())
                        .or_default()
                        .insert(c.characteristic.clone(), None);
                }
                Err(e) => error!(accessory = accessory.display_name(), "{e}"),
            }
        }

        self.accessories.insert(
            accessory.handle,
            HostedAccessory {
                display_name: accessory.spec.display_name.clone(),
                services,
            },
        );
        Ok(())
    }

    fn unregister(&self, handle: AccessoryHandle) -> Result<(), HostError> {
        match self.accessories.remove(&handle) {
            Some((_, hosted)) => {
                debug!(accessory = %hosted.display_name, "accessory unregistered");
                Ok(())
            }
            None => Err(HostError::UnknownAccessory { handle }),
        }
    }

    fn update_characteristic(
        &self,
        handle: AccessoryHandle,
        service: &str,
        characteristic: &str,
        value: Value,
    ) -> Result<(), HostError> {
        self.catalog.resolve(service, characteristic)?;

        let mut hosted = self
            .accessories
            .get_mut(&handle)
            .ok_or(HostError::UnknownAccessory { handle })?;
        let slot = hosted
            .services
            .get_mut(service)
            .ok_or_else(|| HostError::ServiceNotInAccessory {
                handle,
                service: service.to_owned(),
            })?
            .entry(characteristic.to_owned())
            .or_default();
        *slot = Some(value);
        Ok(())
    }
}
