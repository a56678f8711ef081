// ── Config entry runtime ──
//
// Setup and teardown of one configured account. Setup logs in, runs the
// first device poll, registers devices, builds entities, and spawns the
// background tasks. Unload reverses all of it and closes the client.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use strum::Display;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hiklink_api::{ApiFactory, HikConnectApi};

use crate::config::{ConfigEntry, EntryOptions, migrate_entry};
use crate::coordinator::{Coordinator, DeviceSnapshot, device_coordinator};
use crate::entity::{CallButton, CallStatusSensor, Entity, EntityState, Latch};
use crate::error::CoreError;
use crate::registry::{DeviceEntry, DeviceRegistry};
use crate::relogin::relogin_task;

// ── EntryState ───────────────────────────────────────────────────

/// Lifecycle state of a config entry, observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    NotLoaded,
    SetupInProgress,
    Loaded,
    /// Setup failed for a reason retrying will not fix.
    SetupError,
    /// Setup hit a network problem; the host should retry later.
    SetupRetry,
    /// Credentials rejected; the host should start a reauth flow.
    AuthFailed,
    UnloadInProgress,
    MigrationError,
}

// ── SetupError ───────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Authentication failed: {0}")]
    AuthFailed(#[source] CoreError),

    #[error("Not ready, retry later: {0}")]
    NotReady(#[source] CoreError),

    #[error("Setup failed: {0}")]
    Failed(#[source] CoreError),

    #[error("Migration failed: {0}")]
    Migration(#[source] CoreError),

    #[error("Entry is already loaded")]
    AlreadyLoaded,
}

impl SetupError {
    fn classify(err: CoreError) -> Self {
        if err.is_auth() {
            Self::AuthFailed(err)
        } else if err.is_transient() {
            Self::NotReady(err)
        } else {
            Self::Failed(err)
        }
    }

    /// State the entry lands in after this failure.
    pub fn state(&self) -> EntryState {
        match self {
            Self::AuthFailed(_) => EntryState::AuthFailed,
            Self::NotReady(_) => EntryState::SetupRetry,
            Self::Failed(_) => EntryState::SetupError,
            Self::Migration(_) => EntryState::MigrationError,
            Self::AlreadyLoaded => EntryState::Loaded,
        }
    }
}

// ── EntryContext ─────────────────────────────────────────────────

/// Everything an entity needs from its entry.
pub struct EntryContext<A: HikConnectApi> {
    entry_id: String,
    api: Arc<A>,
    options: EntryOptions,
}

impl<A: HikConnectApi> EntryContext<A> {
    pub fn new(entry_id: impl Into<String>, api: Arc<A>, options: EntryOptions) -> Self {
        Self {
            entry_id: entry_id.into(),
            api,
            options,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn options(&self) -> &EntryOptions {
        &self.options
    }
}

// ── Entities ─────────────────────────────────────────────────────

/// Entities created for one entry, grouped by platform.
pub struct Entities<A: HikConnectApi> {
    pub locks: Vec<Arc<Latch<A>>>,
    pub sensors: Vec<Arc<CallStatusSensor<A>>>,
    pub buttons: Vec<Arc<CallButton<A>>>,
}

impl<A: HikConnectApi> Clone for Entities<A> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
            sensors: self.sensors.clone(),
            buttons: self.buttons.clone(),
        }
    }
}

impl<A: HikConnectApi> Entities<A> {
    /// Per device: one sensor and three buttons. Per wired lock: one latch.
    pub fn build(ctx: &Arc<EntryContext<A>>, snapshots: &[DeviceSnapshot]) -> Self {
        let mut entities = Self {
            locks: Vec::new(),
            sensors: Vec::new(),
            buttons: Vec::new(),
        };
        for snapshot in snapshots {
            for (camera, lock_index) in snapshot.latches() {
                entities.locks.push(Arc::new(Latch::new(
                    Arc::clone(ctx),
                    snapshot.device.clone(),
                    camera.clone(),
                    lock_index,
                )));
            }
            entities.sensors.push(Arc::new(CallStatusSensor::new(
                Arc::clone(ctx),
                snapshot.device.clone(),
            )));
            entities.buttons.extend(
                CallButton::all_for(ctx, &snapshot.device)
                    .into_iter()
                    .map(Arc::new),
            );
        }
        entities
    }

    pub fn len(&self) -> usize {
        self.locks.len() + self.sensors.len() + self.buttons.len()
    }

    /// Current state of every entity: locks, then sensors, then buttons.
    pub fn snapshot(&self) -> Vec<EntityState> {
        let locks = self.locks.iter().map(|e| e.snapshot());
        let sensors = self.sensors.iter().map(|e| e.snapshot());
        let buttons = self.buttons.iter().map(|e| e.snapshot());
        locks.chain(sensors).chain(buttons).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── EntryRuntime ─────────────────────────────────────────────────

struct Loaded<A: HikConnectApi> {
    ctx: Arc<EntryContext<A>>,
    coordinator: Arc<Coordinator<Vec<DeviceSnapshot>>>,
    entities: Entities<A>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Runtime of one config entry.
///
/// Cheaply cloneable via `Arc`. Call [`setup()`](Self::setup) to bring the
/// entry up and [`unload()`](Self::unload) to tear it down.
pub struct EntryRuntime<F: ApiFactory> {
    inner: Arc<EntryInner<F>>,
}

impl<F: ApiFactory> Clone for EntryRuntime<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EntryInner<F: ApiFactory> {
    entry: Mutex<ConfigEntry>,
    factory: F,
    registry: Arc<DeviceRegistry>,
    state: Arc<watch::Sender<EntryState>>,
    loaded: tokio::sync::Mutex<Option<Loaded<F::Api>>>,
}

impl<F: ApiFactory + 'static> EntryRuntime<F> {
    pub fn new(entry: ConfigEntry, factory: F, registry: Arc<DeviceRegistry>) -> Self {
        let (state, _) = watch::channel(EntryState::NotLoaded);
        Self {
            inner: Arc::new(EntryInner {
                entry: Mutex::new(entry),
                factory,
                registry,
                state: Arc::new(state),
                loaded: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Snapshot of the (possibly migrated) config entry.
    pub fn entry(&self) -> ConfigEntry {
        self.lock_entry().clone()
    }

    pub fn state(&self) -> EntryState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EntryState> {
        self.inner.state.subscribe()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    /// Entities of the loaded entry, `None` when not loaded.
    pub async fn entities(&self) -> Option<Entities<F::Api>> {
        self.inner
            .loaded
            .lock()
            .await
            .as_ref()
            .map(|l| l.entities.clone())
    }

    pub async fn coordinator(&self) -> Option<Arc<Coordinator<Vec<DeviceSnapshot>>>> {
        self.inner
            .loaded
            .lock()
            .await
            .as_ref()
            .map(|l| Arc::clone(&l.coordinator))
    }

    pub async fn context(&self) -> Option<Arc<EntryContext<F::Api>>> {
        self.inner
            .loaded
            .lock()
            .await
            .as_ref()
            .map(|l| Arc::clone(&l.ctx))
    }

    fn lock_entry(&self) -> std::sync::MutexGuard<'_, ConfigEntry> {
        self.inner
            .entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: EntryState) {
        self.inner.state.send_replace(state);
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Bring the entry up.
    ///
    /// Auth failures land in [`EntryState::AuthFailed`], network trouble in
    /// [`EntryState::SetupRetry`]. No entities or devices are left behind
    /// on failure and the client is closed.
    pub async fn setup(&self) -> Result<(), SetupError> {
        let mut loaded = self.inner.loaded.lock().await;
        if loaded.is_some() {
            return Err(SetupError::AlreadyLoaded);
        }
        self.set_state(EntryState::SetupInProgress);

        let entry = {
            let mut entry = self.lock_entry();
            if let Err(e) = migrate_entry(&mut entry) {
                drop(entry);
                warn!(error = %e, "config entry migration failed");
                self.set_state(EntryState::MigrationError);
                return Err(SetupError::Migration(e));
            }
            entry.clone()
        };

        match self.try_setup(&entry).await {
            Ok(l) => {
                info!(
                    entry_id = %entry.entry_id,
                    locks = l.entities.locks.len(),
                    sensors = l.entities.sensors.len(),
                    buttons = l.entities.buttons.len(),
                    "config entry loaded"
                );
                *loaded = Some(l);
                self.set_state(EntryState::Loaded);
                Ok(())
            }
            Err(e) => {
                let err = SetupError::classify(e);
                warn!(entry_id = %entry.entry_id, error = %err, "config entry setup failed");
                self.set_state(err.state());
                Err(err)
            }
        }
    }

    async fn try_setup(&self, entry: &ConfigEntry) -> Result<Loaded<F::Api>, CoreError> {
        entry.options.validate()?;
        let api = Arc::new(self.inner.factory.build(entry.base_url()?)?);

        match self.start(entry, Arc::clone(&api)).await {
            Ok(loaded) => Ok(loaded),
            Err(e) => {
                if let Err(close_err) = api.close().await {
                    debug!(error = %close_err, "closing client after failed setup");
                }
                Err(e)
            }
        }
    }

    async fn start(
        &self,
        entry: &ConfigEntry,
        api: Arc<F::Api>,
    ) -> Result<Loaded<F::Api>, CoreError> {
        info!(username = %entry.data.username, "logging in to Hik-Connect");
        api.login(&entry.data.username, &entry.data.password)
            .await?;

        let ctx = Arc::new(EntryContext::new(
            entry.entry_id.clone(),
            Arc::clone(&api),
            entry.options.clone(),
        ));
        let coordinator = Arc::new(device_coordinator(
            Arc::clone(&api),
            entry.options.device_refresh_interval,
        ));
        let snapshots = coordinator.refresh().await?;
        let entities = Entities::build(&ctx, &snapshots);

        // First sample before the sensors are handed out.
        for sensor in &entities.sensors {
            if let Err(e) = sensor.update().await {
                if e.is_auth() {
                    return Err(e);
                }
                debug!(error = %e, "initial call status poll failed");
            }
        }

        for snapshot in snapshots.iter() {
            self.inner
                .registry
                .register(DeviceEntry::for_device(&entry.entry_id, &snapshot.device));
        }
        for latch in &entities.locks {
            self.inner.registry.register(latch.device_entry());
        }

        let cancel = CancellationToken::new();
        let tasks = self.spawn_tasks(&api, &coordinator, &entities, &entry.options, &cancel);

        Ok(Loaded {
            ctx,
            coordinator,
            entities,
            cancel,
            tasks,
        })
    }

    fn spawn_tasks(
        &self,
        api: &Arc<F::Api>,
        coordinator: &Arc<Coordinator<Vec<DeviceSnapshot>>>,
        entities: &Entities<F::Api>,
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::with_capacity(entities.sensors.len() + 2);

        {
            let coordinator = Arc::clone(coordinator);
            let cancel = cancel.clone();
            let state = Arc::clone(&self.inner.state);
            tasks.push(tokio::spawn(async move {
                if let Some(err) = coordinator.run(cancel.clone()).await {
                    mark_auth_failed(&state, &cancel, &err, "device refresh");
                }
            }));
        }

        {
            let api = Arc::clone(api);
            let period = options.relogin_interval;
            let cancel = cancel.clone();
            let state = Arc::clone(&self.inner.state);
            tasks.push(tokio::spawn(async move {
                if let Some(err) = relogin_task(api, period, cancel.clone()).await {
                    mark_auth_failed(&state, &cancel, &err, "session refresh");
                }
            }));
        }

        for sensor in &entities.sensors {
            let sensor = Arc::clone(sensor);
            let cancel = cancel.clone();
            let state = Arc::clone(&self.inner.state);
            tasks.push(tokio::spawn(async move {
                if let Some(err) = sensor.run(cancel.clone()).await {
                    mark_auth_failed(&state, &cancel, &err, "call status poll");
                }
            }));
        }

        tasks
    }

    /// Tear the entry down: stop tasks, drop devices, close the client.
    pub async fn unload(&self) {
        let mut guard = self.inner.loaded.lock().await;
        let Some(loaded) = guard.take() else {
            self.set_state(EntryState::NotLoaded);
            return;
        };
        self.set_state(EntryState::UnloadInProgress);

        loaded.cancel.cancel();
        join_tasks(loaded.tasks).await;
        for latch in &loaded.entities.locks {
            latch.cancel_relock();
        }

        let removed = self
            .inner
            .registry
            .remove_config_entry(loaded.ctx.entry_id());
        if let Err(e) = loaded.ctx.api().close().await {
            warn!(error = %e, "closing client failed (non-fatal)");
        }

        self.set_state(EntryState::NotLoaded);
        debug!(entry_id = %loaded.ctx.entry_id(), removed, "config entry unloaded");
    }

    /// Swap in an updated entry (e.g. after reauth) and set up again.
    pub async fn reload_with(&self, entry: ConfigEntry) -> Result<(), SetupError> {
        self.unload().await;
        *self.lock_entry() = entry;
        self.setup().await
    }
}

/// Wait for every task; a panicked or aborted task is logged, not propagated.
async fn join_tasks(tasks: Vec<JoinHandle<()>>) {
    for handle in tasks {
        if let Err(e) = handle.await {
            warn!(error = %e, panicked = e.is_panic(), "background task ended abnormally");
        }
    }
}

fn mark_auth_failed(
    state: &watch::Sender<EntryState>,
    cancel: &CancellationToken,
    err: &CoreError,
    source: &str,
) {
    warn!(error = %err, source, "session rejected, reauthentication required");
    state.send_replace(EntryState::AuthFailed);
    cancel.cancel();
}
