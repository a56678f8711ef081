// ── Client interface ──
//
// The operations hiklink needs from a Hik-Connect client. Implementations
// own the HTTP session; callers share one client per config entry behind
// an `Arc`, so every method takes `&self`.

use std::future::Future;

use secrecy::SecretString;
use url::Url;

use crate::error::Error;
use crate::models::{CallOperation, CallStatus, Camera, Device};

/// Public Hik-Connect cloud endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.hik-connect.com";

/// Async client for the Hik-Connect cloud.
///
/// Returned futures are `Send` so they can be driven from spawned
/// background tasks.
pub trait HikConnectApi: Send + Sync + 'static {
    /// Start a session with account credentials.
    fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Whether the session token is close enough to expiry to refresh.
    fn is_refresh_login_needed(&self) -> bool;

    /// Extend the current session without re-sending credentials.
    fn refresh_login(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// All devices bound to the account.
    fn get_devices(&self) -> impl Future<Output = Result<Vec<Device>, Error>> + Send;

    /// Camera channels of one device.
    fn get_cameras(&self, serial: &str)
    -> impl Future<Output = Result<Vec<Camera>, Error>> + Send;

    /// Open the latch `lock_index` wired to `channel`.
    fn unlock(
        &self,
        serial: &str,
        channel: u32,
        lock_index: u32,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Current intercom call state of an indoor station.
    fn get_call_status(&self, serial: &str)
    -> impl Future<Output = Result<CallStatus, Error>> + Send;

    fn answer_call(&self, serial: &str) -> impl Future<Output = Result<(), Error>> + Send;

    fn cancel_call(&self, serial: &str) -> impl Future<Output = Result<(), Error>> + Send;

    fn hangup_call(&self, serial: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Release connection resources. Further calls fail with [`Error::Closed`].
    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Dispatch a call-control operation to its dedicated method.
    fn call_operation(
        &self,
        serial: &str,
        operation: CallOperation,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            match operation {
                CallOperation::Answer => self.answer_call(serial).await,
                CallOperation::Cancel => self.cancel_call(serial).await,
                CallOperation::Hangup => self.hangup_call(serial).await,
            }
        }
    }
}

/// Builds clients bound to a base URL.
///
/// Closures `Fn(&Url) -> Result<A, Error>` implement this directly.
pub trait ApiFactory: Send + Sync {
    type Api: HikConnectApi;

    fn build(&self, base_url: &Url) -> Result<Self::Api, Error>;
}

impl<F, A> ApiFactory for F
where
    F: Fn(&Url) -> Result<A, Error> + Send + Sync,
    A: HikConnectApi,
{
    type Api = A;

    fn build(&self, base_url: &Url) -> Result<A, Error> {
        self(base_url)
    }
}
