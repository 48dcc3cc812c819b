// ── Live sync ──
//
// Start gate for the push channel and the fan-out of device changes to
// every characteristic reading that device.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, error, info};

use crate::device::Device;
use crate::host::{Accessory, HostAccessoryRegistry};
use crate::mapping::transform;

/// Opens once both "inventory loaded" and "host ready" have been signalled,
/// in either order. Exactly one of the two marking calls returns `true`.
#[derive(Debug, Default)]
pub struct StartGate {
    inventory_loaded: AtomicBool,
    host_ready: AtomicBool,
    opened: AtomicBool,
}

impl StartGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call opened the gate.
    pub fn mark_inventory_loaded(&self) -> bool {
        self.inventory_loaded.store(true, Ordering::SeqCst);
        self.try_open()
    }

    /// Returns `true` if this call opened the gate.
    pub fn mark_host_ready(&self) -> bool {
        self.host_ready.store(true, Ordering::SeqCst);
        self.try_open()
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    fn try_open(&self) -> bool {
        self.inventory_loaded.load(Ordering::SeqCst)
            && self.host_ready.load(Ordering::SeqCst)
            && self
                .opened
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }
}

/// Push `new_value` into every enabled characteristic whose `get` reads
/// `device`. Returns the number of characteristics updated.
pub fn fan_out<H: HostAccessoryRegistry + ?Sized>(
    host: &H,
    accessories: &[Accessory],
    device: &Device,
    new_value: &Value,
) -> usize {
    let mut matched = 0;
    let mut updated = 0;

    for accessory in accessories.iter().filter(|a| a.spec.is_enabled()) {
        for (service, c) in accessory.spec.characteristics() {
            let Some(get) = c.get.as_ref().filter(|g| g.device == device.path) else {
                continue;
            };
            matched += 1;

            let value = transform(get.mapping.as_ref(), new_value);
            if value.is_null() {
                debug!(accessory = accessory.display_name(), service, characteristic = %c.characteristic, "mapped to null, update skipped");
                continue;
            }

            info!(
                "{}.{}.{} is now {}",
                accessory.display_name(),
                service,
                c.characteristic,
                value
            );
            match host.update_characteristic(accessory.handle, service, &c.characteristic, value) {
                Ok(()) => updated += 1,
                Err(e) => error!(accessory = accessory.display_name(), error = %e, "error while preparing update of accessory"),
            }
        }
    }

    if matched == 0 {
        debug!(device = %device.path, "no accessory depends on device");
    }
    updated
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::host::MemoryHost;
    use crate::mapping::StateMapping;
    use crate::spec::{AccessorySpec, CharacteristicSpec, DeviceBinding, ServiceSpec, SpecOrigin};
    use crate::testing::record;
    use serde_json::json;

    #[test]
    fn gate_opens_once_whichever_signal_is_last() {
        let gate = StartGate::new();
        assert!(!gate.mark_host_ready());
        assert!(gate.mark_inventory_loaded());
        assert!(!gate.mark_inventory_loaded());
        assert!(!gate.mark_host_ready());
        assert!(gate.is_open());

        let gate = StartGate::new();
        assert!(!gate.mark_inventory_loaded());
        assert!(gate.mark_host_ready());
    }

    #[test]
    fn gate_opens_exactly_once_under_contention() {
        let gate = Arc::new(StartGate::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        gate.mark_inventory_loaded()
                    } else {
                        gate.mark_host_ready()
                    }
                })
            })
            .collect();
        let opened = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o)
            .count();
        assert_eq!(opened, 1);
    }

    fn register(host: &MemoryHost, spec: AccessorySpec) -> Accessory {
        let accessory = Accessory::from_spec(spec);
        host.register(&accessory).unwrap();
        accessory
    }

    #[test]
    fn change_reaches_every_dependent_characteristic() {
        let host = MemoryHost::default();
        let on_off = Some(StateMapping::new(vec![json!("ON"), json!(true), json!("OFF"), json!(false)]));
        let switch = register(
            &host,
            AccessorySpec::expanded("Lampes", "Switch", "On", "aquarium.lampes", on_off.clone(), None),
        );
        let both = register(
            &host,
            AccessorySpec {
                display_name: "Aquarium".into(),
                disabled: false,
                origin: SpecOrigin::Detailed,
                services: vec![
                    ServiceSpec {
                        service: "Lightbulb".into(),
                        characteristics: vec![CharacteristicSpec {
                            characteristic: "On".into(),
                            get: Some(DeviceBinding::new("aquarium.lampes", on_off)),
                            set: None,
                        }],
                    },
                    ServiceSpec {
                        service: "Outlet".into(),
                        characteristics: vec![CharacteristicSpec {
                            characteristic: "OutletInUse".into(),
                            get: Some(DeviceBinding::new("aquarium.lampes", None)),
                            set: None,
                        }],
                    },
                ],
            },
        );
        let unrelated = register(
            &host,
            AccessorySpec::expanded("Pompe", "Switch", "On", "piscine.pompe", None, None),
        );
        let device = Device::from(record("aquarium.lampes", json!("OFF")));

        let updated = fan_out(&host, &[switch.clone(), both.clone(), unrelated.clone()], &device, &json!("OFF"));

        assert_eq!(updated, 3);
        assert_eq!(host.value(switch.handle, "Switch", "On"), Some(json!(false)));
        assert_eq!(host.value(both.handle, "Lightbulb", "On"), Some(json!(false)));
        assert_eq!(host.value(both.handle, "Outlet", "OutletInUse"), Some(json!("OFF")));
        assert_eq!(host.value(unrelated.handle, "Switch", "On"), None);
    }

    #[test]
    fn device_without_dependents_updates_nothing() {
        let host = MemoryHost::default();
        let device = Device::from(record("lonely", json!(1)));
        assert_eq!(fan_out(&host, &[], &device, &json!(2)), 0);
    }

    #[test]
    fn null_result_and_disabled_accessories_are_skipped() {
        let host = MemoryHost::default();
        let ignore = Some(StateMapping::new(vec![json!("ON"), json!(true), json!("*"), Value::Null]));
        let lamp = register(
            &host,
            AccessorySpec::expanded("Lampes", "Switch", "On", "aquarium.lampes", ignore, None),
        );
        let disabled = Accessory::from_spec(
            AccessorySpec::expanded("Off", "Switch", "On", "aquarium.lampes", None, None).with_disabled(true),
        );
        let device = Device::from(record("aquarium.lampes", json!("DIMMED")));

        assert_eq!(fan_out(&host, &[lamp.clone(), disabled], &device, &json!("DIMMED")), 0);
        assert_eq!(host.value(lamp.handle, "Switch", "On"), None);
    }

    #[test]
    fn later_event_overwrites_earlier_one() {
        let host = MemoryHost::default();
        let lamp = register(
            &host,
            AccessorySpec::expanded("Lampes", "Switch", "On", "aquarium.lampes", None, None),
        );
        let device = Device::from(record("aquarium.lampes", json!("ON")));

        fan_out(&host, std::slice::from_ref(&lamp), &device, &json!("ON"));
        fan_out(&host, std::slice::from_ref(&lamp), &device, &json!("OFF"));

        assert_eq!(host.value(lamp.handle, "Switch", "On"), Some(json!("OFF")));
    }
}
