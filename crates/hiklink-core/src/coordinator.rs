// ── Polling coordinator ──
//
// Fetches one shared payload on a fixed interval and hands it to every
// entity that needs it, so N entities cost one round of network calls.
// Failed updates keep the previous payload.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hiklink_api::{Camera, Device, HikConnectApi};

use crate::error::CoreError;

type FetchFn<T> = dyn Fn() -> BoxFuture<'static, Result<T, CoreError>> + Send + Sync;

/// Outcome of the most recent update.
#[derive(Debug, Clone, Default)]
pub struct UpdateStatus {
    pub last_update_success: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Shared polling primitive for one payload type.
pub struct Coordinator<T: Send + Sync + 'static> {
    name: String,
    update_interval: Duration,
    fetch: Box<FetchFn<T>>,
    data: watch::Sender<Option<Arc<T>>>,
    status: Mutex<UpdateStatus>,
}

impl<T: Send + Sync + 'static> Coordinator<T> {
    pub fn new<F>(name: impl Into<String>, update_interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T, CoreError>> + Send + Sync + 'static,
    {
        let (data, _) = watch::channel(None);
        Self {
            name: name.into(),
            update_interval,
            fetch: Box::new(fetch),
            data,
            status: Mutex::new(UpdateStatus::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Most recent successful payload, if any.
    pub fn data(&self) -> Option<Arc<T>> {
        self.data.borrow().clone()
    }

    /// Subscribe to payload changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.data.subscribe()
    }

    pub fn status(&self) -> UpdateStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch once and publish the result.
    ///
    /// Authentication errors pass through unchanged; everything else is
    /// reported as [`CoreError::UpdateFailed`].
    pub async fn refresh(&self) -> Result<Arc<T>, CoreError> {
        let result = (self.fetch)().await;
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        let was_healthy = status.last_error.is_none();

        match result {
            Ok(payload) => {
                let payload = Arc::new(payload);
                self.data.send_replace(Some(Arc::clone(&payload)));
                if !was_healthy {
                    info!(coordinator = %self.name, "update recovered");
                }
                status.last_update_success = true;
                status.last_updated = Some(Utc::now());
                status.last_error = None;
                Ok(payload)
            }
            Err(e) => {
                // Log the transition into failure once, then stay quiet.
                if was_healthy {
                    warn!(coordinator = %self.name, error = %e, "update failed");
                } else {
                    debug!(coordinator = %self.name, error = %e, "update still failing");
                }
                status.last_update_success = false;
                status.last_error = Some(e.to_string());
                if e.is_auth() {
                    Err(e)
                } else {
                    Err(CoreError::UpdateFailed {
                        coordinator: self.name.clone(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    /// Refresh on every interval tick until cancelled.
    ///
    /// Returns the error if the session is rejected; polling stops then,
    /// because only new credentials can fix it.
    pub async fn run(&self, cancel: CancellationToken) -> Option<CoreError> {
        let mut interval = tokio::time::interval(self.update_interval);
        interval.tick().await; // first refresh happens during setup

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        if e.is_auth() {
                            return Some(e);
                        }
                    }
                }
            }
        }
    }
}

// ── Device snapshot ──────────────────────────────────────────────────

/// A device together with its camera channels, as of the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub device: Device,
    pub cameras: Vec<Camera>,
}

impl DeviceSnapshot {
    /// `(camera, lock_index)` for every latch wired to this device.
    pub fn latches(&self) -> impl Iterator<Item = (&Camera, u32)> {
        self.cameras.iter().flat_map(|camera| {
            (0..self.device.lock_count(camera.channel_number)).map(move |index| (camera, index))
        })
    }
}

/// List devices, then each device's cameras.
pub async fn fetch_device_snapshots<A: HikConnectApi>(
    api: &A,
) -> Result<Vec<DeviceSnapshot>, CoreError> {
    debug!("getting devices");
    let devices = api.get_devices().await?;
    let mut snapshots = Vec::with_capacity(devices.len());
    for device in devices {
        debug!(serial = %device.serial, "getting cameras");
        let cameras = api.get_cameras(&device.serial).await?;
        snapshots.push(DeviceSnapshot { device, cameras });
    }
    Ok(snapshots)
}

/// Coordinator that polls the account's devices and cameras.
pub fn device_coordinator<A: HikConnectApi>(
    api: Arc<A>,
    update_interval: Duration,
) -> Coordinator<Vec<DeviceSnapshot>> {
    Coordinator::new("devices", update_interval, move || {
        let api = Arc::clone(&api);
        async move { fetch_device_snapshots(api.as_ref()).await }.boxed()
    })
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use hiklink_api::Error;
    use hiklink_api::mock::{MockHikConnect, MockOp};
    use pretty_assertions::assert_eq;

    use super::*;

    fn device(serial: &str, locks: &[(u32, u32)]) -> Device {
        Device {
            id: format!("id-{serial}"),
            serial: serial.into(),
            name: format!("Station {serial}"),
            device_type: "DS-KD8003".into(),
            version: "2.2.3".into(),
            locks: locks.iter().copied().collect(),
        }
    }

    fn camera(id: &str, channel: u32) -> Camera {
        Camera {
            id: id.into(),
            name: format!("Camera {id}"),
            channel_number: channel,
            signal_status: 1,
            is_shown: true,
        }
    }

    #[tokio::test]
    async fn refresh_publishes_device_snapshots() {
        let mock = MockHikConnect::new("u", "p")
            .with_device(device("S1", &[(1, 2)]), vec![camera("c1", 1), camera("c2", 2)])
            .with_device(device("S2", &[]), vec![]);
        let coordinator = device_coordinator(Arc::new(mock), Duration::from_secs(60));

        let snapshots = coordinator.refresh().await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].latches().count(), 2);
        assert_eq!(snapshots[1].latches().count(), 0);
        assert!(coordinator.status().last_update_success);
        assert!(coordinator.data().is_some());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_data() {
        let mock = MockHikConnect::new("u", "p").with_device(device("S1", &[(1, 1)]), vec![]);
        let coordinator = device_coordinator(Arc::new(mock.clone()), Duration::from_secs(60));
        coordinator.refresh().await.unwrap();

        mock.fail(MockOp::GetDevices, Error::Network {
            message: "connection reset".into(),
        });
        let err = coordinator.refresh().await.unwrap_err();

        assert!(matches!(err, CoreError::UpdateFailed { .. }));
        assert_eq!(coordinator.data().map(|d| d.len()), Some(1));
        let status = coordinator.status();
        assert!(!status.last_update_success);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn auth_errors_pass_through() {
        let mock = MockHikConnect::new("u", "p");
        mock.fail(MockOp::GetDevices, Error::SessionExpired);
        let coordinator = device_coordinator(Arc::new(mock), Duration::from_secs(60));

        assert!(coordinator.refresh().await.unwrap_err().is_auth());
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_on_interval_until_cancelled() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let coordinator = Arc::new(Coordinator::<u32>::new("counter", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) }.boxed()
        }));
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            let cancel = cancel.clone();
            async move { coordinator.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        cancel.cancel();
        assert!(task.await.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_auth_failure() {
        let mock = MockHikConnect::new("u", "p");
        let coordinator = device_coordinator(Arc::new(mock.clone()), Duration::from_secs(10));
        mock.fail(MockOp::GetDevices, Error::Login {
            message: "password changed".into(),
        });

        let err = coordinator.run(CancellationToken::new()).await;
        assert!(err.is_some_and(|e| e.is_auth()));
    }
}
