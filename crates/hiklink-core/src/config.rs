// ── Config entry types ──
//
// A `ConfigEntry` is one configured Hik-Connect account: credentials,
// endpoint and polling options. Core never reads config files; the
// `hiklink-config` crate (or any other store) builds entries and hands them in.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::CoreError;

/// Schema version written by this release.
pub const CURRENT_VERSION: u32 = 2;

/// Immutable connection data collected by the config flow.
#[derive(Debug, Clone)]
pub struct EntryData {
    pub username: String,
    pub password: SecretString,
    /// Cloud endpoint. Absent only on version 1 entries awaiting migration.
    pub base_url: Option<Url>,
}

/// Polling and timing knobs. Defaults match the Hik-Connect app's cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// How often to ask the client whether the session needs refreshing.
    pub relogin_interval: Duration,
    /// How often the device/camera list is re-fetched.
    pub device_refresh_interval: Duration,
    /// Call-status poll cadence.
    pub call_status_interval: Duration,
    /// Upper bound for a single call-status request.
    pub call_status_timeout: Duration,
    /// Consecutive call-status failures per logged error.
    pub error_threshold: u32,
    /// How long a latch reports "unlocked" after a successful open.
    pub relock_delay: Duration,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            relogin_interval: Duration::from_secs(10 * 60),
            device_refresh_interval: Duration::from_secs(5 * 60),
            call_status_interval: Duration::from_secs(3),
            call_status_timeout: Duration::from_millis(2800),
            error_threshold: 10,
            relock_delay: Duration::from_secs(5),
        }
    }
}

impl EntryOptions {
    /// Reject values the background tasks cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        let intervals = [
            ("relogin_interval", self.relogin_interval),
            ("device_refresh_interval", self.device_refresh_interval),
            ("call_status_interval", self.call_status_interval),
            ("call_status_timeout", self.call_status_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(CoreError::Config {
                    message: format!("{name} must be greater than zero"),
                });
            }
        }
        if self.error_threshold == 0 {
            return Err(CoreError::Config {
                message: "error_threshold must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// One configured account.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub version: u32,
    pub title: String,
    /// Username; at most one entry per account.
    pub unique_id: String,
    pub data: EntryData,
    pub options: EntryOptions,
}

impl ConfigEntry {
    /// A fresh entry at the current schema version.
    pub fn new(username: &str, password: SecretString, base_url: Url) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            version: CURRENT_VERSION,
            title: username.to_owned(),
            unique_id: username.to_owned(),
            data: EntryData {
                username: username.to_owned(),
                password,
                base_url: Some(base_url),
            },
            options: EntryOptions::default(),
        }
    }

    pub fn base_url(&self) -> Result<&Url, CoreError> {
        self.data.base_url.as_ref().ok_or_else(|| CoreError::Config {
            message: format!(
                "entry {} has no base URL (version {} needs migration)",
                self.entry_id, self.version
            ),
        })
    }
}

// ── Migration ────────────────────────────────────────────────────────

/// Upgrade an entry to [`CURRENT_VERSION`] in place.
///
/// Version 1 predates the configurable endpoint and gets the public cloud
/// URL. Returns `true` if anything changed.
pub fn migrate_entry(entry: &mut ConfigEntry) -> Result<bool, CoreError> {
    if entry.version > CURRENT_VERSION {
        return Err(CoreError::Config {
            message: format!(
                "entry {} has version {}, newest supported is {CURRENT_VERSION}",
                entry.entry_id, entry.version
            ),
        });
    }
    if entry.version == CURRENT_VERSION {
        return Ok(false);
    }

    let from = entry.version;
    if entry.data.base_url.is_none() {
        let url = Url::parse(hiklink_api::DEFAULT_BASE_URL).map_err(|e| CoreError::Config {
            message: format!("Invalid URL: {e}"),
        })?;
        entry.data.base_url = Some(url);
    }
    entry.version = CURRENT_VERSION;
    info!(entry_id = %entry.entry_id, from, to = CURRENT_VERSION, "migrated config entry");
    Ok(true)
}
