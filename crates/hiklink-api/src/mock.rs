// ── In-memory client double ──
//
// Scriptable stand-in for a real Hik-Connect client. Clones share state,
// so a test can keep one handle while the code under test owns another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::client::HikConnectApi;
use crate::error::Error;
use crate::models::{CallOperation, CallStatus, Camera, Device};

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Login,
    RefreshLogin,
    GetDevices,
    GetCameras,
    Unlock,
    GetCallStatus,
    CallOperation,
    Close,
}

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Login { username: String },
    RefreshLogin,
    GetDevices,
    GetCameras { serial: String },
    Unlock { serial: String, channel: u32, lock_index: u32 },
    GetCallStatus { serial: String },
    CallOperation { serial: String, operation: CallOperation },
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    username: String,
    password: String,
    devices: Vec<Device>,
    cameras: HashMap<String, Vec<Camera>>,
    call_status: HashMap<String, CallStatus>,
    call_status_delay: Option<Duration>,
    failures: HashMap<MockOp, Error>,
    one_shot_failures: HashMap<MockOp, Vec<Error>>,
    refresh_needed: bool,
    closed: bool,
    calls: Vec<MockCall>,
}

impl MockState {
    fn check(&mut self, op: MockOp) -> Result<(), Error> {
        if self.closed && op != MockOp::Close {
            return Err(Error::Closed);
        }
        if let Some(queue) = self.one_shot_failures.get_mut(&op) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Scriptable in-memory [`HikConnectApi`].
#[derive(Debug, Clone, Default)]
pub struct MockHikConnect {
    state: Arc<Mutex<MockState>>,
}

impl MockHikConnect {
    /// A client that accepts exactly this username/password pair.
    pub fn new(username: &str, password: &str) -> Self {
        let mock = Self::default();
        {
            let mut state = mock.state();
            username.clone_into(&mut state.username);
            password.clone_into(&mut state.password);
        }
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a device together with its camera channels.
    pub fn with_device(self, device: Device, cameras: Vec<Camera>) -> Self {
        {
            let mut state = self.state();
            state.cameras.insert(device.serial.clone(), cameras);
            state.devices.push(device);
        }
        self
    }

    /// Replace the device list (cameras of removed devices are kept but unused).
    pub fn set_devices(&self, devices: Vec<Device>) {
        self.state().devices = devices;
    }

    /// Status returned by `get_call_status` for `serial` from now on.
    pub fn set_call_status(&self, serial: &str, status: CallStatus) {
        self.state().call_status.insert(serial.to_owned(), status);
    }

    /// Delay every `get_call_status` response (drives timeout paths).
    pub fn set_call_status_delay(&self, delay: Option<Duration>) {
        self.state().call_status_delay = delay;
    }

    pub fn set_refresh_needed(&self, needed: bool) {
        self.state().refresh_needed = needed;
    }

    /// Fail every call to `op` with `err` until [`clear_failure`](Self::clear_failure).
    pub fn fail(&self, op: MockOp, err: Error) {
        self.state().failures.insert(op, err);
    }

    /// Fail only the next call to `op`. Queues up when called repeatedly.
    pub fn fail_once(&self, op: MockOp, err: Error) {
        self.state().one_shot_failures.entry(op).or_default().push(err);
    }

    pub fn clear_failure(&self, op: MockOp) {
        let mut state = self.state();
        state.failures.remove(&op);
        state.one_shot_failures.remove(&op);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Accept calls again after `close`, as a freshly built client would.
    pub fn reopen(&self) {
        self.state().closed = false;
    }
}

impl HikConnectApi for MockHikConnect {
    async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push(MockCall::Login {
            username: username.to_owned(),
        });
        state.check(MockOp::Login)?;
        if username != state.username || password.expose_secret() != state.password {
            return Err(Error::Login {
                message: "invalid username or password".into(),
            });
        }
        Ok(())
    }

    fn is_refresh_login_needed(&self) -> bool {
        self.state().refresh_needed
    }

    async fn refresh_login(&self) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push(MockCall::RefreshLogin);
        state.check(MockOp::RefreshLogin)?;
        state.refresh_needed = false;
        Ok(())
    }

    async fn get_devices(&self) -> Result<Vec<Device>, Error> {
        let mut state = self.state();
        state.calls.push(MockCall::GetDevices);
        state.check(MockOp::GetDevices)?;
        Ok(state.devices.clone())
    }

    async fn get_cameras(&self, serial: &str) -> Result<Vec<Camera>, Error> {
        let mut state = self.state();
        state.calls.push(MockCall::GetCameras {
            serial: serial.to_owned(),
        });
        state.check(MockOp::GetCameras)?;
        Ok(state.cameras.get(serial).cloned().unwrap_or_default())
    }

    async fn unlock(&self, serial: &str, channel: u32, lock_index: u32) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push(MockCall::Unlock {
            serial: serial.to_owned(),
            channel,
            lock_index,
        });
        state.check(MockOp::Unlock)
    }

    async fn get_call_status(&self, serial: &str) -> Result<CallStatus, Error> {
        let delay = {
            let mut state = self.state();
            state.calls.push(MockCall::GetCallStatus {
                serial: serial.to_owned(),
            });
            state.call_status_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.check(MockOp::GetCallStatus)?;
        Ok(state
            .call_status
            .get(serial)
            .cloned()
            .unwrap_or_else(|| CallStatus::new("idle")))
    }

    async fn answer_call(&self, serial: &str) -> Result<(), Error> {
        self.record_operation(serial, CallOperation::Answer)
    }

    async fn cancel_call(&self, serial: &str) -> Result<(), Error> {
        self.record_operation(serial, CallOperation::Cancel)
    }

    async fn hangup_call(&self, serial: &str) -> Result<(), Error> {
        self.record_operation(serial, CallOperation::Hangup)
    }

    async fn close(&self) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push(MockCall::Close);
        state.check(MockOp::Close)?;
        state.closed = true;
        Ok(())
    }
}

impl MockHikConnect {
    fn record_operation(&self, serial: &str, operation: CallOperation) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push(MockCall::CallOperation {
            serial: serial.to_owned(),
            operation,
        });
        state.check(MockOp::CallOperation)
    }
}
