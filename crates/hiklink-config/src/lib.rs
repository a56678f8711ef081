//! Persisted configuration for hiklink.
//!
//! TOML config entries, credential resolution (env + keyring + plaintext),
//! and translation to `hiklink_core::ConfigEntry`. Records are migrated to
//! the current entry version as they are loaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hiklink_core::{
    ConfigEntry, CoreError, EntryData, EntryOptions, migrate_entry, validate_base_url,
};

const KEYRING_SERVICE: &str = "hiklink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for entry '{entry}'")]
    NoCredentials { entry: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry '{entry}': {source}")]
    Entry {
        entry: String,
        #[source]
        source: CoreError,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Options applied to every entry unless overridden.
    #[serde(default)]
    pub defaults: Defaults,

    /// Configured accounts, keyed by a local name.
    #[serde(default)]
    pub entries: BTreeMap<String, EntryRecord>,
}

/// Global polling and timing defaults. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_relogin_interval")]
    pub relogin_interval_ms: u64,

    #[serde(default = "default_device_refresh_interval")]
    pub device_refresh_interval_ms: u64,

    #[serde(default = "default_call_status_interval")]
    pub call_status_interval_ms: u64,

    #[serde(default = "default_call_status_timeout")]
    pub call_status_timeout_ms: u64,

    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    #[serde(default = "default_relock_delay")]
    pub relock_delay_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            relogin_interval_ms: default_relogin_interval(),
            device_refresh_interval_ms: default_device_refresh_interval(),
            call_status_interval_ms: default_call_status_interval(),
            call_status_timeout_ms: default_call_status_timeout(),
            error_threshold: default_error_threshold(),
            relock_delay_ms: default_relock_delay(),
        }
    }
}

fn default_relogin_interval() -> u64 {
    600_000
}
fn default_device_refresh_interval() -> u64 {
    300_000
}
fn default_call_status_interval() -> u64 {
    3_000
}
fn default_call_status_timeout() -> u64 {
    2_800
}
fn default_error_threshold() -> u32 {
    10
}
fn default_relock_delay() -> u64 {
    5_000
}

impl Defaults {
    pub fn options(&self) -> EntryOptions {
        EntryOptions {
            relogin_interval: Duration::from_millis(self.relogin_interval_ms),
            device_refresh_interval: Duration::from_millis(self.device_refresh_interval_ms),
            call_status_interval: Duration::from_millis(self.call_status_interval_ms),
            call_status_timeout: Duration::from_millis(self.call_status_timeout_ms),
            error_threshold: self.error_threshold,
            relock_delay: Duration::from_millis(self.relock_delay_ms),
        }
    }
}

/// One persisted Hik-Connect account.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntryRecord {
    /// Stable id; the record name is used when absent.
    pub entry_id: Option<String>,

    /// Schema version. Hand-written records without one are version 1.
    #[serde(default = "default_version")]
    pub version: u32,

    pub username: String,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Cloud endpoint (e.g., "https://api.hik-connect.com").
    pub base_url: Option<String>,

    /// Overrides of the `[defaults]` values, same units.
    #[serde(default, skip_serializing_if = "Overrides::is_empty")]
    pub overrides: Overrides,
}

fn default_version() -> u32 {
    1
}

/// Per-entry option overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Overrides {
    pub relogin_interval_ms: Option<u64>,
    pub device_refresh_interval_ms: Option<u64>,
    pub call_status_interval_ms: Option<u64>,
    pub call_status_timeout_ms: Option<u64>,
    pub error_threshold: Option<u32>,
    pub relock_delay_ms: Option<u64>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overrides for every option of `options` that differs from `base`.
    pub fn diff(options: &EntryOptions, base: &EntryOptions) -> Self {
        let millis = |value: Duration, base: Duration| (value != base).then(|| as_millis(value));
        Self {
            relogin_interval_ms: millis(options.relogin_interval, base.relogin_interval),
            device_refresh_interval_ms: millis(
                options.device_refresh_interval,
                base.device_refresh_interval,
            ),
            call_status_interval_ms: millis(options.call_status_interval, base.call_status_interval),
            call_status_timeout_ms: millis(options.call_status_timeout, base.call_status_timeout),
            error_threshold: (options.error_threshold != base.error_threshold)
                .then_some(options.error_threshold),
            relock_delay_ms: millis(options.relock_delay, base.relock_delay),
        }
    }

    /// `base` with these overrides applied.
    pub fn apply(&self, mut options: EntryOptions) -> EntryOptions {
        let set = |slot: &mut Duration, ms: Option<u64>| {
            if let Some(ms) = ms {
                *slot = Duration::from_millis(ms);
            }
        };
        set(&mut options.relogin_interval, self.relogin_interval_ms);
        set(&mut options.device_refresh_interval, self.device_refresh_interval_ms);
        set(&mut options.call_status_interval, self.call_status_interval_ms);
        set(&mut options.call_status_timeout, self.call_status_timeout_ms);
        set(&mut options.relock_delay, self.relock_delay_ms);
        if let Some(threshold) = self.error_threshold {
            options.error_threshold = threshold;
        }
        options
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl EntryRecord {
    /// Effective options: `defaults` with this record's overrides applied.
    pub fn options(&self, defaults: &Defaults) -> EntryOptions {
        self.overrides.apply(defaults.options())
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "hiklink", "hiklink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hiklink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` merged with `HIKLINK_` environment variables.
///
/// Nested keys are separated by a double underscore, e.g.
/// `HIKLINK_DEFAULTS__ERROR_THRESHOLD=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HIKLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_user(entry_name: &str) -> String {
    format!("{entry_name}/password")
}

/// Resolve an entry's password: env var, then system keyring, then plaintext.
pub fn resolve_password(record: &EntryRecord, entry_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Record's password_env → env var lookup
    if let Some(ref env_name) = record.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(entry_name)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = record.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        entry: entry_name.into(),
    })
}

/// Store an entry's password in the system keyring.
pub fn store_password(entry_name: &str, password: &SecretString) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(entry_name))?;
    entry.set_password(password.expose_secret())?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a migrated `ConfigEntry` from a persisted record.
pub fn record_to_entry(
    record: &EntryRecord,
    entry_name: &str,
    defaults: &Defaults,
) -> Result<ConfigEntry, ConfigError> {
    let base_url = record
        .base_url
        .as_deref()
        .map(|raw| {
            validate_base_url(raw).map_err(|_| ConfigError::Validation {
                field: format!("entries.{entry_name}.base_url"),
                reason: format!("expected http(s)://host[:port] with no path, got {raw}"),
            })
        })
        .transpose()?;

    let password = resolve_password(record, entry_name)?;
    let into_entry_err = |source| ConfigError::Entry {
        entry: entry_name.into(),
        source,
    };

    let mut entry = ConfigEntry {
        entry_id: record
            .entry_id
            .clone()
            .unwrap_or_else(|| entry_name.to_owned()),
        version: record.version,
        title: record.username.clone(),
        unique_id: record.username.clone(),
        data: EntryData {
            username: record.username.clone(),
            password,
            base_url,
        },
        options: record.options(defaults),
    };
    migrate_entry(&mut entry).map_err(into_entry_err)?;
    entry.base_url().map_err(into_entry_err)?;
    entry.options.validate().map_err(into_entry_err)?;
    Ok(entry)
}

/// All entries of `cfg`, in name order.
pub fn load_entries(cfg: &Config) -> Result<Vec<ConfigEntry>, ConfigError> {
    cfg.entries
        .iter()
        .map(|(name, record)| record_to_entry(record, name, &cfg.defaults))
        .collect()
}

/// Persistable record for `entry`.
///
/// The password is not written; store it with [`store_password`] or set
/// `password_env`. Options equal to `defaults` are left out. Durations are
/// kept to the millisecond; finer precision is dropped.
pub fn entry_to_record(entry: &ConfigEntry, defaults: &Defaults) -> EntryRecord {
    EntryRecord {
        entry_id: Some(entry.entry_id.clone()),
        version: entry.version,
        username: entry.data.username.clone(),
        password: None,
        password_env: None,
        base_url: entry.data.base_url.as_ref().map(ToString::to_string),
        overrides: Overrides::diff(&entry.options, &defaults.options()),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::*;

    const SAMPLE: &str = r#"
[defaults]
error_threshold = 4

[entries.home]
entry_id = "7c1f"
version = 2
username = "user@example.com"
password_env = "HOME_INTERCOM_PASSWORD"
base_url = "https://ieu.hik-connect.com"

[entries.home.overrides]
relock_delay_ms = 8000

[entries.cabin]
username = "cabin@example.com"
password_env = "CABIN_INTERCOM_PASSWORD"
"#;

    #[test]
    fn defaults_match_entry_options() {
        assert_eq!(Defaults::default().options(), EntryOptions::default());
    }

    #[test]
    fn load_merges_file_and_environment() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("HIKLINK_DEFAULTS__RELOGIN_INTERVAL_MS", 120_000);

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.defaults.error_threshold, 4);
            assert_eq!(cfg.defaults.relogin_interval_ms, 120_000);
            assert_eq!(cfg.defaults.call_status_interval_ms, 3_000);
            assert_eq!(cfg.entries.len(), 2);
            assert_eq!(cfg.entries["cabin"].version, 1);
            assert_eq!(cfg.entries["home"].overrides.relock_delay_ms, Some(8000));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.entries.is_empty());
        assert_eq!(cfg.defaults, Defaults::default());
    }

    #[test]
    fn records_translate_with_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("HOME_INTERCOM_PASSWORD", "hunter2");
            let cfg: Config = toml::from_str(SAMPLE).map_err(|e| e.to_string())?;
            let entry = record_to_entry(&cfg.entries["home"], "home", &cfg.defaults)
                .map_err(|e| e.to_string())?;

            assert_eq!(entry.entry_id, "7c1f");
            assert_eq!(entry.unique_id, "user@example.com");
            assert_eq!(
                entry.base_url().unwrap().as_str(),
                "https://ieu.hik-connect.com/"
            );
            assert_eq!(entry.options.error_threshold, 4);
            assert_eq!(entry.options.relock_delay, Duration::from_secs(8));
            assert_eq!(entry.data.password.expose_secret(), "hunter2");
            Ok(())
        });
    }

    #[test]
    fn v1_records_are_migrated() {
        Jail::expect_with(|jail| {
            jail.set_env("CABIN_INTERCOM_PASSWORD", "pw");
            let cfg: Config = toml::from_str(SAMPLE).map_err(|e| e.to_string())?;
            let entry = record_to_entry(&cfg.entries["cabin"], "cabin", &cfg.defaults)
                .map_err(|e| e.to_string())?;

            assert_eq!(entry.version, hiklink_core::CURRENT_VERSION);
            assert_eq!(entry.entry_id, "cabin");
            assert_eq!(
                entry.base_url().unwrap().as_str(),
                "https://api.hik-connect.com/"
            );
            Ok(())
        });
    }

    /// Record whose password comes from `TEST_INTERCOM_PASSWORD`.
    fn env_record() -> EntryRecord {
        EntryRecord {
            username: "user@example.com".into(),
            password_env: Some("TEST_INTERCOM_PASSWORD".into()),
            ..EntryRecord::default()
        }
    }

    #[test]
    fn v2_record_without_url_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("TEST_INTERCOM_PASSWORD", "pw");
            let record = EntryRecord {
                version: 2,
                ..env_record()
            };
            let err = record_to_entry(&record, "broken", &Defaults::default()).unwrap_err();
            assert!(matches!(err, ConfigError::Entry { .. }), "got: {err}");
            Ok(())
        });
    }

    #[test]
    fn base_url_must_be_a_bare_origin() {
        for raw in ["not a url", "https://host/v3?x=1", "ftp://host", "https://host/#top"] {
            let record = EntryRecord {
                version: 2,
                base_url: Some(raw.into()),
                ..env_record()
            };
            let err = record_to_entry(&record, "home", &Defaults::default()).unwrap_err();
            assert!(matches!(err, ConfigError::Validation { .. }), "{raw}: {err}");
        }
    }

    #[test]
    fn password_env_takes_precedence() {
        Jail::expect_with(|jail| {
            jail.set_env("HOME_INTERCOM_PASSWORD", "from-env");
            let record = EntryRecord {
                username: "user@example.com".into(),
                password: Some("plaintext".into()),
                password_env: Some("HOME_INTERCOM_PASSWORD".into()),
                ..EntryRecord::default()
            };
            let pw = resolve_password(&record, "home").map_err(|e| e.to_string())?;
            assert_eq!(pw.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn zero_threshold_fails_validation() {
        Jail::expect_with(|jail| {
            jail.set_env("TEST_INTERCOM_PASSWORD", "pw");
            let record = EntryRecord {
                overrides: Overrides {
                    error_threshold: Some(0),
                    ..Overrides::default()
                },
                ..env_record()
            };
            assert!(record_to_entry(&record, "home", &Defaults::default()).is_err());
            Ok(())
        });
    }

    #[test]
    fn default_options_are_not_written() {
        let entry = ConfigEntry::new(
            "user@example.com",
            SecretString::from("pw"),
            Url::parse("https://api.hik-connect.com").unwrap(),
        );
        let record = entry_to_record(&entry, &Defaults::default());
        assert!(record.overrides.is_empty());
        assert!(record.password.is_none());

        let text = toml::to_string_pretty(&record).unwrap();
        assert!(!text.contains("overrides"), "{text}");
    }

    #[test]
    fn save_then_load_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut entry = ConfigEntry::new(
            "user@example.com",
            SecretString::from("pw"),
            Url::parse("https://api.hik-connect.com").unwrap(),
        );
        entry.options.relock_delay = Duration::from_secs(10);
        entry.options.relogin_interval = Duration::from_secs(120);
        entry.options.call_status_timeout = Duration::from_secs(1);
        entry.options.call_status_interval = Duration::from_millis(1500);
        entry.options.device_refresh_interval = Duration::from_millis(500);

        let defaults = Defaults::default();
        let mut record = entry_to_record(&entry, &defaults);
        assert_eq!(record.overrides.relock_delay_ms, Some(10_000));
        assert_eq!(record.overrides.call_status_interval_ms, Some(1500));
        assert_eq!(record.overrides.error_threshold, None);
        record.password_env = Some("HOME_INTERCOM_PASSWORD".into());

        let mut cfg = Config::default();
        cfg.entries.insert("home".into(), record);
        save_config_to(&cfg, &path).unwrap();

        Jail::expect_with(|jail| {
            jail.set_env("HOME_INTERCOM_PASSWORD", "pw");
            let text = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
            let loaded: Config = toml::from_str(&text).map_err(|e| e.to_string())?;
            let restored = load_entries(&loaded).map_err(|e| e.to_string())?;

            assert_eq!(restored.len(), 1);
            assert_eq!(restored[0].entry_id, entry.entry_id);
            assert_eq!(restored[0].options, entry.options);
            assert_eq!(restored[0].data.base_url, entry.data.base_url);
            assert_eq!(restored[0].data.password.expose_secret(), "pw");
            Ok(())
        });
    }
}
