// ── Call status sensor ──
//
// Polls the indoor station's call state every few seconds. The endpoint
// is flaky enough that single failures are routine; they are counted and
// only every `error_threshold`-th consecutive failure is logged and
// reported. The last known value survives failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use hiklink_api::{CallState, CallStatus, Device, HikConnectApi};

use super::{Entity, Platform, unique_id};
use crate::entry::EntryContext;
use crate::error::CoreError;
use crate::registry::DeviceIdentifier;

/// Result of a successful [`CallStatusSensor::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A fresh sample was stored.
    Updated,
    /// The poll failed but stays below the reporting threshold.
    Suppressed { consecutive_failures: u32 },
}

pub struct CallStatusSensor<A: HikConnectApi> {
    ctx: Arc<EntryContext<A>>,
    device: Device,
    value: watch::Sender<Option<CallStatus>>,
    error_counter: AtomicU32,
}

impl<A: HikConnectApi> CallStatusSensor<A> {
    pub fn new(ctx: Arc<EntryContext<A>>, device: Device) -> Self {
        let (value, _) = watch::channel(None);
        Self {
            ctx,
            device,
            value,
            error_counter: AtomicU32::new(0),
        }
    }

    /// Last successfully polled call state.
    pub fn native_value(&self) -> Option<CallState> {
        self.value.borrow().as_ref().map(|s| s.status.clone())
    }

    /// Auxiliary info of the last sample.
    pub fn extra_state_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        self.value
            .borrow()
            .as_ref()
            .map(|s| s.info.clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CallStatus>> {
        self.value.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.error_counter.load(Ordering::Relaxed)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Poll once.
    ///
    /// Transient failures return `Ok(Suppressed)` except on every
    /// `error_threshold`-th consecutive one, which is logged and returned.
    /// Other failures (auth, closed client) are returned immediately.
    pub async fn update(&self) -> Result<UpdateOutcome, CoreError> {
        let timeout = self.ctx.options().call_status_timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.ctx.api().get_call_status(&self.device.serial),
        )
        .await
        {
            Ok(result) => result.map_err(CoreError::from),
            Err(_) => Err(CoreError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        let err = match result {
            Ok(status) => {
                debug!(serial = %self.device.serial, status = %status.status, "call status");
                self.value.send_replace(Some(status));
                self.error_counter.store(0, Ordering::Relaxed);
                return Ok(UpdateOutcome::Updated);
            }
            Err(e) if e.is_transient() => e,
            Err(e) => return Err(e),
        };

        let threshold = self.ctx.options().error_threshold.max(1);
        let failures = self.error_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if failures % threshold == 0 {
            // Quiet below the threshold (rare blips) and between multiples
            // of it (a lasting outage is reported once per threshold).
            error!(
                serial = %self.device.serial,
                error = %err,
                "Update of call status failed {threshold} times in a row"
            );
            return Err(err);
        }
        debug!(serial = %self.device.serial, failures, error = %err, "call status poll failed");
        Ok(UpdateOutcome::Suppressed {
            consecutive_failures: failures,
        })
    }

    /// Poll on the configured cadence until cancelled.
    ///
    /// Returns the error if the session is rejected.
    pub async fn run(&self, cancel: CancellationToken) -> Option<CoreError> {
        let mut interval = tokio::time::interval(self.ctx.options().call_status_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // first poll happens before the entity is added

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                _ = interval.tick() => match self.update().await {
                    Err(e) if e.is_auth() => return Some(e),
                    Err(e) if !e.is_transient() => {
                        warn!(serial = %self.device.serial, error = %e, "call status poll failed");
                    }
                    _ => {}
                },
            }
        }
    }
}

impl<A: HikConnectApi> Entity for CallStatusSensor<A> {
    fn platform(&self) -> Platform {
        Platform::Sensor
    }

    fn unique_id(&self) -> String {
        unique_id(&[&self.device.id, "call-status"])
    }

    fn name(&self) -> String {
        format!("{} call status", self.device.name)
    }

    fn icon(&self) -> &'static str {
        match self.native_value() {
            Some(CallState::Idle) => "mdi:phone-hangup",
            Some(CallState::Ringing) => "mdi:phone-ring",
            Some(CallState::InProgress) => "mdi:phone-in-talk",
            _ => "mdi:phone-alert",
        }
    }

    fn device_identifier(&self) -> DeviceIdentifier {
        DeviceIdentifier::new(self.device.id.clone())
    }

    fn state_value(&self) -> Option<String> {
        self.native_value().map(|s| s.to_string())
    }

    fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        self.extra_state_attributes()
    }
}
