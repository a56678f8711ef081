// ── Session keep-alive ──
//
// Hik-Connect sessions expire. On a fixed cadence the client is asked
// whether its token is due for a refresh; no backoff, a failed refresh is
// simply retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hiklink_api::HikConnectApi;

use crate::error::CoreError;

/// Refresh the session if the client says it is due. Returns whether it was.
pub async fn relogin_if_needed<A: HikConnectApi>(api: &A) -> Result<bool, CoreError> {
    let needed = api.is_refresh_login_needed();
    debug!(needed, "relogin check");
    if needed {
        api.refresh_login().await?;
        info!("session refreshed");
    }
    Ok(needed)
}

/// Run [`relogin_if_needed`] every `period` until cancelled.
///
/// Returns the error if the session is rejected outright.
pub async fn relogin_task<A: HikConnectApi>(
    api: Arc<A>,
    period: Duration,
    cancel: CancellationToken,
) -> Option<CoreError> {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // setup just logged in

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            _ = interval.tick() => match relogin_if_needed(api.as_ref()).await {
                Err(e) if e.is_auth() => return Some(e),
                Err(e) => warn!(error = %e, "session refresh failed, retrying next interval"),
                Ok(_) => {}
            },
        }
    }
}
