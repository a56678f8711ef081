// ── Entities ──
//
// What the integration exposes to the host: one latch per wired lock,
// one call-status sensor and three call buttons per station. Every entity
// receives the entry's `EntryContext` at construction.

pub mod button;
pub mod lock;
pub mod sensor;

pub use button::CallButton;
pub use lock::{Latch, LockState};
pub use sensor::{CallStatusSensor, UpdateOutcome};

use serde::Serialize;
use serde_json::{Map, Value};
use strum::Display;

use crate::registry::{DOMAIN, DeviceIdentifier};

/// Host platform an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Lock,
    Sensor,
    Button,
}

/// Contract shared by every entity.
pub trait Entity {
    fn platform(&self) -> Platform;

    /// Stable across restarts; derived from vendor ids only.
    fn unique_id(&self) -> String;

    fn name(&self) -> String;

    fn icon(&self) -> &'static str;

    /// Registry device this entity is attached to.
    fn device_identifier(&self) -> DeviceIdentifier;

    /// State is inferred locally rather than read back from hardware.
    fn assumed_state(&self) -> bool {
        false
    }

    /// Current state as the host displays it. `None` for stateless entities.
    fn state_value(&self) -> Option<String> {
        None
    }

    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }

    fn snapshot(&self) -> EntityState {
        EntityState {
            platform: self.platform(),
            unique_id: self.unique_id(),
            name: self.name(),
            icon: self.icon(),
            state: self.state_value(),
            assumed_state: self.assumed_state(),
            attributes: self.attributes(),
        }
    }
}

/// Point-in-time view of an entity for consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub platform: Platform,
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    pub state: Option<String>,
    pub assumed_state: bool,
    pub attributes: Map<String, Value>,
}

/// `hikconnect-<part>-<part>...`
pub(crate) fn unique_id(parts: &[&str]) -> String {
    let mut id = String::from(DOMAIN);
    for part in parts {
        id.push('-');
        id.push_str(part);
    }
    id
}
