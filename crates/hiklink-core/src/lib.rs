//! Config-entry lifecycle and intercom entities for Hik-Connect.
//!
//! This crate turns a [`HikConnectApi`](hiklink_api::HikConnectApi) client
//! into the pieces a home-automation host consumes:
//!
//! - **[`EntryRuntime`]** — Setup and teardown of one configured account.
//!   [`setup()`](EntryRuntime::setup) logs in, runs the first device poll,
//!   registers devices, builds entities, then spawns the device refresh,
//!   session refresh and call-status tasks. [`unload()`](EntryRuntime::unload)
//!   reverses all of it.
//!
//! - **[`Coordinator`]** — Polls a fetch function on an interval and
//!   publishes the latest snapshot through a `tokio::sync::watch` channel.
//!
//! - **Entities** ([`entity`]) — [`Latch`] per wired lock with auto-relock,
//!   [`CallStatusSensor`] per station with failure-threshold reporting, and
//!   one [`CallButton`] per call operation.
//!
//! - **[`ConfigFlow`]** — Validates credentials and base URL and produces
//!   a [`ConfigEntry`].
//!
//! - **[`DeviceRegistry`]** — Devices registered by loaded entries, keyed by
//!   vendor id.

pub mod config;
pub mod config_flow;
pub mod coordinator;
pub mod entity;
pub mod entry;
pub mod error;
pub mod registry;
pub mod relogin;

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CURRENT_VERSION, ConfigEntry, EntryData, EntryOptions, migrate_entry};
pub use config_flow::{AbortReason, ConfigFlow, FlowError, FlowResult, UserInput, validate_base_url};
pub use coordinator::{Coordinator, DeviceSnapshot, UpdateStatus};
pub use entity::{
    CallButton, CallStatusSensor, Entity, EntityState, Latch, LockState, Platform, UpdateOutcome,
};
pub use entry::{Entities, EntryContext, EntryRuntime, EntryState, SetupError};
pub use error::CoreError;
pub use registry::{DOMAIN, DeviceEntry, DeviceIdentifier, DeviceRegistry, MANUFACTURER};
pub use relogin::relogin_if_needed;
