// ── Device registry ──
//
// Host-side catalogue of physical devices. Entities point at a device
// through its identifier; latches get their own sub-device linked to the
// station they hang off (`via_device`).

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use hiklink_api::Device;

/// Integration domain, the namespace of every identifier we hand out.
pub const DOMAIN: &str = "hikconnect";

/// Manufacturer reported for every device.
pub const MANUFACTURER: &str = "Hikvision";

/// `(domain, id)` pair identifying a registered device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceIdentifier {
    pub domain: &'static str,
    pub id: String,
}

impl DeviceIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            domain: DOMAIN,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub identifier: DeviceIdentifier,
    pub config_entry_id: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    pub suggested_area: Option<String>,
    pub via_device: Option<DeviceIdentifier>,
}

impl DeviceEntry {
    /// Registry entry for an intercom station or recorder.
    pub fn for_device(config_entry_id: &str, device: &Device) -> Self {
        Self {
            identifier: DeviceIdentifier::new(device.id.clone()),
            config_entry_id: config_entry_id.to_owned(),
            name: device.name.clone(),
            manufacturer: MANUFACTURER,
            model: Some(device.device_type.clone()),
            sw_version: Some(device.version.clone()),
            suggested_area: None,
            via_device: None,
        }
    }
}

/// Concurrent device catalogue shared by all entries.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<DeviceIdentifier, Arc<DeviceEntry>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns `true` if the device was new.
    pub fn register(&self, entry: DeviceEntry) -> bool {
        self.devices
            .insert(entry.identifier.clone(), Arc::new(entry))
            .is_none()
    }

    pub fn get(&self, identifier: &DeviceIdentifier) -> Option<Arc<DeviceEntry>> {
        self.devices.get(identifier).map(|r| Arc::clone(r.value()))
    }

    /// All devices belonging to one config entry.
    pub fn entries_for(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        self.devices
            .iter()
            .filter(|r| r.value().config_entry_id == config_entry_id)
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    /// Drop every device of a config entry. Returns how many were removed.
    pub fn remove_config_entry(&self, config_entry_id: &str) -> usize {
        let mut removed = 0;
        self.devices.retain(|_, entry| {
            let keep = entry.config_entry_id != config_entry_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
