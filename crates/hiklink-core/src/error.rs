// ── Core error types ──
//
// Errors surfaced by entries, entities and the config flow. Callers never
// see raw client errors; `From<hiklink_api::Error>` folds them into the
// variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach Hik-Connect: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("API client is closed")]
    ClientClosed,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Unexpected response from Hik-Connect: {message}")]
    InvalidResponse { message: String },

    #[error("Update of {coordinator} failed: {message}")]
    UpdateFailed { coordinator: String, message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    #[error("Entry is not loaded")]
    NotLoaded,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Needs new credentials; retrying on a timer will not help.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// Expected to clear up on its own (network blips, API hiccups).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::Timeout { .. }
                | Self::InvalidResponse { .. }
                | Self::UpdateFailed { .. }
        )
    }
}

// ── Conversion from client errors ────────────────────────────────────

impl From<hiklink_api::Error> for CoreError {
    fn from(err: hiklink_api::Error) -> Self {
        match err {
            hiklink_api::Error::Login { message } => CoreError::AuthenticationFailed { message },
            hiklink_api::Error::SessionExpired => CoreError::AuthenticationFailed {
                message: "Session expired -- re-authentication required".into(),
            },
            hiklink_api::Error::Network { message } => {
                CoreError::ConnectionFailed { reason: message }
            }
            hiklink_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            hiklink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            hiklink_api::Error::UnexpectedResponse { message } => {
                CoreError::InvalidResponse { message }
            }
            hiklink_api::Error::Closed => CoreError::ClientClosed,
        }
    }
}
