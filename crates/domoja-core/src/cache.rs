// ── Device cache ──
//
// path → Device map. A full load replaces every record; a pushed change
// only moves state and update date of a device that is already known.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use domoja_api::ChangeEvent;

use crate::device::{Device, DeviceValue, parse_timestamp};
use crate::error::CoreError;
use crate::remote::RemoteServer;

/// Thread-safe store of the remote device inventory.
pub struct DeviceCache {
    devices: DashMap<String, Arc<Device>>,
    last_full_load: watch::Sender<Option<DateTime<Utc>>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        let (last_full_load, _) = watch::channel(None);
        Self {
            devices: DashMap::new(),
            last_full_load,
        }
    }

    /// Fetch the inventory and replace the cache contents.
    ///
    /// On failure the cache is left untouched; the caller decides whether
    /// to retry the startup sequence.
    pub async fn load<R: RemoteServer>(&self, remote: &R, cookie: &str) -> Result<usize, CoreError> {
        let records = match remote.list_devices(cookie).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "could not retrieve devices from domoja server");
                return Err(e.into());
            }
        };

        let count = self.replace_all(records.into_iter().map(Device::from));
        info!(count, "loaded devices from domoja server");
        Ok(count)
    }

    /// Replace all records. Returns the new device count.
    pub fn replace_all(&self, devices: impl IntoIterator<Item = Device>) -> usize {
        self.devices.clear();
        for device in devices {
            self.devices.insert(device.path.clone(), Arc::new(device));
        }
        self.last_full_load.send_replace(Some(Utc::now()));
        self.devices.len()
    }

    /// Apply a pushed change to a known device.
    ///
    /// Returns the updated record, or `None` when the id is unknown. Unknown
    /// ids never create an entry.
    pub fn apply_change(&self, change: &ChangeEvent) -> Option<Arc<Device>> {
        let Some(mut entry) = self.devices.get_mut(&change.id) else {
            debug!(device = %change.id, "change for unknown device");
            return None;
        };

        let at = change
            .date
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let mut device = Device::clone(entry.value());
        device.apply_state(DeviceValue::from_json(change.new_value.clone()), at);
        let device = Arc::new(device);
        *entry.value_mut() = Arc::clone(&device);
        Some(device)
    }

    pub fn get(&self, path: &str) -> Option<Arc<Device>> {
        self.devices.get(path).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.devices.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// All devices, sorted by path.
    pub fn snapshot(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<_> = self.devices.iter().map(|r| Arc::clone(r.value())).collect();
        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }

    /// `true` once a full load has completed.
    pub fn is_loaded(&self) -> bool {
        self.last_full_load.borrow().is_some()
    }

    pub fn last_full_load(&self) -> Option<DateTime<Utc>> {
        *self.last_full_load.borrow()
    }

    /// Watch the time of the last full load.
    pub fn subscribe_loads(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_full_load.subscribe()
    }
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}
