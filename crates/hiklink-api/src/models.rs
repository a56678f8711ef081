// ── Wire models ──
//
// Shapes returned by the Hik-Connect cloud. Field names follow the vendor
// JSON; anything the integration does not read is ignored on decode.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A physical device (indoor station, door station, NVR) bound to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub serial: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub version: String,
    /// Channel number -> number of locks wired to that channel.
    #[serde(default)]
    pub locks: BTreeMap<u32, u32>,
}

impl Device {
    /// Locks attached to `channel`. Camera-only channels have none.
    pub fn lock_count(&self, channel: u32) -> u32 {
        self.locks.get(&channel).copied().unwrap_or(0)
    }
}

/// A camera channel of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub channel_number: u32,
    #[serde(default)]
    pub signal_status: i64,
    #[serde(default)]
    pub is_shown: bool,
}

// ── Call status ──────────────────────────────────────────────────

/// Intercom call state as reported by the indoor station.
///
/// Unknown vendor strings are kept verbatim in [`CallState::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallState {
    Idle,
    Ringing,
    InProgress,
    Other(String),
}

impl CallState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::InProgress => "call in progress",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for CallState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "idle" => Self::Idle,
            "ringing" => Self::Ringing,
            "call in progress" => Self::InProgress,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for CallState {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<CallState> for String {
    fn from(state: CallState) -> Self {
        match state {
            CallState::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sample of `get_call_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStatus {
    pub status: CallState,
    /// Auxiliary fields (room number, building, caller) passed through as-is.
    #[serde(default)]
    pub info: serde_json::Map<String, serde_json::Value>,
}

impl CallStatus {
    pub fn new(status: impl Into<CallState>) -> Self {
        Self {
            status: status.into(),
            info: serde_json::Map::new(),
        }
    }
}

/// Call-control operations available on an indoor station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOperation {
    Answer,
    Cancel,
    Hangup,
}

impl CallOperation {
    pub const ALL: [Self; 3] = [Self::Answer, Self::Cancel, Self::Hangup];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::Cancel => "cancel",
            Self::Hangup => "hangup",
        }
    }
}

impl fmt::Display for CallOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
