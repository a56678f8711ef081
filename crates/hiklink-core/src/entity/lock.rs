// ── Latch lock ──
//
// A door strike wired to a camera channel. Opening is momentary: the
// strike releases and the door stays closed by the latch again a few
// seconds later. The API offers no way to read the strike back, so the
// unlocked state is assumed and reverted by a local timer.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hiklink_api::{Camera, Device, HikConnectApi};

use super::{Entity, Platform, unique_id};
use crate::entry::EntryContext;
use crate::error::CoreError;
use crate::registry::{DeviceEntry, DeviceIdentifier, MANUFACTURER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Locked,
    Unlocked,
}

/// One lock output of a door station channel.
pub struct Latch<A: HikConnectApi> {
    ctx: Arc<EntryContext<A>>,
    device: Device,
    camera: Camera,
    lock_index: u32,
    state: Arc<watch::Sender<LockState>>,
    relock: Mutex<Option<JoinHandle<()>>>,
}

impl<A: HikConnectApi> Latch<A> {
    pub fn new(ctx: Arc<EntryContext<A>>, device: Device, camera: Camera, lock_index: u32) -> Self {
        let (state, _) = watch::channel(LockState::Locked);
        Self {
            ctx,
            device,
            camera,
            lock_index,
            state: Arc::new(state),
            relock: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LockState {
        *self.state.borrow()
    }

    pub fn is_locked(&self) -> bool {
        self.state() == LockState::Locked
    }

    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.state.subscribe()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn lock_index(&self) -> u32 {
        self.lock_index
    }

    /// Sub-device for this latch, hanging off its station.
    pub fn device_entry(&self) -> DeviceEntry {
        DeviceEntry {
            identifier: self.device_identifier(),
            config_entry_id: self.ctx.entry_id().to_owned(),
            name: self.name(),
            manufacturer: MANUFACTURER,
            model: None,
            sw_version: None,
            suggested_area: Some("Outside".into()),
            via_device: Some(DeviceIdentifier::new(self.device.id.clone())),
        }
    }

    /// Release the strike, then report "unlocked" until the relock delay passes.
    ///
    /// Opening again while unlocked restarts the delay.
    pub async fn open(&self) -> Result<(), CoreError> {
        debug!(
            serial = %self.device.serial,
            channel = self.camera.channel_number,
            lock_index = self.lock_index,
            "opening latch"
        );
        self.ctx
            .api()
            .unlock(
                &self.device.serial,
                self.camera.channel_number,
                self.lock_index,
            )
            .await?;

        info!(entity = %self.unique_id(), "latch opened");
        self.state.send_replace(LockState::Unlocked);
        self.schedule_relock();
        Ok(())
    }

    /// Same as [`open`](Self::open); a latch has no separate unlock.
    pub async fn unlock(&self) -> Result<(), CoreError> {
        self.open().await
    }

    /// Latches close by themselves; there is nothing to send.
    pub fn lock(&self) -> Result<(), CoreError> {
        warn!(entity = %self.unique_id(), "locking is not supported, the latch relocks on its own");
        Err(CoreError::Unsupported {
            operation: "lock".into(),
        })
    }

    /// Abort a pending relock timer. The state is left as is.
    pub fn cancel_relock(&self) {
        let pending = self
            .relock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = pending {
            handle.abort();
        }
    }

    fn schedule_relock(&self) {
        let state = Arc::clone(&self.state);
        let delay = self.ctx.options().relock_delay;
        let entity = self.unique_id();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.send_replace(LockState::Locked);
            debug!(%entity, "latch relocked");
        });

        let previous = self
            .relock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl<A: HikConnectApi> Entity for Latch<A> {
    fn platform(&self) -> Platform {
        Platform::Lock
    }

    fn unique_id(&self) -> String {
        unique_id(&[
            &self.device.id,
            &self.camera.id,
            &self.lock_index.to_string(),
        ])
    }

    fn name(&self) -> String {
        let (serial, camera) = (&self.device.serial, &self.camera.name);
        if self.lock_index > 0 {
            format!("{serial}: {camera} {}", self.lock_index + 1)
        } else {
            format!("{serial}: {camera}")
        }
    }

    fn icon(&self) -> &'static str {
        match self.state() {
            LockState::Locked => "mdi:lock",
            LockState::Unlocked => "mdi:lock-open",
        }
    }

    fn device_identifier(&self) -> DeviceIdentifier {
        DeviceIdentifier::new(self.unique_id())
    }

    fn assumed_state(&self) -> bool {
        true
    }

    fn state_value(&self) -> Option<String> {
        Some(self.state().to_string())
    }
}

impl<A: HikConnectApi> Drop for Latch<A> {
    fn drop(&mut self) {
        self.cancel_relock();
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hiklink_api::Error;
    use hiklink_api::mock::{MockCall, MockHikConnect, MockOp};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::{camera, context, device};

    fn latch(mock: &MockHikConnect, lock_index: u32) -> Latch<MockHikConnect> {
        Latch::new(
            context(mock),
            device("Q100", &[(1, 2)]),
            camera("cam-1", 1),
            lock_index,
        )
    }

    #[test]
    fn naming_and_ids() {
        let mock = MockHikConnect::new("u", "p");
        let first = latch(&mock, 0);
        let second = latch(&mock, 1);

        assert_eq!(first.name(), "Q100: Gate cam-1");
        assert_eq!(second.name(), "Q100: Gate cam-1 2");
        assert_eq!(first.unique_id(), "hikconnect-id-Q100-cam-1-0");
        assert_eq!(second.unique_id(), "hikconnect-id-Q100-cam-1-1");
        assert!(first.assumed_state());
        assert_eq!(first.platform(), Platform::Lock);
        assert_eq!(first.snapshot().state.as_deref(), Some("locked"));
    }

    #[test]
    fn device_entry_links_to_station() {
        let mock = MockHikConnect::new("u", "p");
        let entry = latch(&mock, 0).device_entry();

        assert_eq!(entry.identifier.id, "hikconnect-id-Q100-cam-1-0");
        assert_eq!(entry.via_device, Some(DeviceIdentifier::new("id-Q100")));
        assert_eq!(entry.suggested_area.as_deref(), Some("Outside"));
        assert_eq!(entry.config_entry_id, "entry-1");
    }

    #[tokio::test(start_paused = true)]
    async fn open_unlocks_then_relocks_without_network() {
        let mock = MockHikConnect::new("u", "p");
        let latch = latch(&mock, 1);
        assert!(latch.is_locked());

        latch.open().await.unwrap();
        assert_eq!(latch.state(), LockState::Unlocked);
        assert_eq!(latch.icon(), "mdi:lock-open");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(latch.state(), LockState::Unlocked);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(latch.state(), LockState::Locked);

        assert_eq!(
            mock.calls(),
            vec![MockCall::Unlock {
                serial: "Q100".into(),
                channel: 1,
                lock_index: 1,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_restarts_the_relock_delay() {
        let mock = MockHikConnect::new("u", "p");
        let latch = latch(&mock, 0);

        latch.open().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        latch.open().await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(latch.state(), LockState::Unlocked);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(latch.state(), LockState::Locked);
    }

    #[tokio::test]
    async fn failed_unlock_keeps_state() {
        let mock = MockHikConnect::new("u", "p");
        mock.fail(MockOp::Unlock, Error::Network {
            message: "unreachable".into(),
        });
        let latch = latch(&mock, 0);

        let err = latch.open().await.unwrap_err();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
        assert!(latch.is_locked());
    }

    #[test]
    fn lock_is_unsupported() {
        let mock = MockHikConnect::new("u", "p");
        assert!(matches!(
            latch(&mock, 0).lock(),
            Err(CoreError::Unsupported { .. })
        ));
    }
}
