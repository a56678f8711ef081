use thiserror::Error;

/// Top-level error type for the `hiklink-api` crate.
///
/// Implementations of [`HikConnectApi`](crate::HikConnectApi) translate
/// their transport failures into these variants. `hiklink-core` maps them
/// into entry states and user-facing diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong credentials, locked account, ...).
    #[error("Login failed: {message}")]
    Login { message: String },

    /// Session expired and could not be refreshed.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// Connection refused, DNS failure, connection reset.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Request did not complete in time.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// Response lacked expected fields or could not be decoded.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    // ── Lifecycle ───────────────────────────────────────────────────
    /// The client was used after `close()`.
    #[error("Client is closed")]
    Closed,
}

impl Error {
    /// Credentials or session are no longer accepted; only a new login helps.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Login { .. } | Self::SessionExpired)
    }

    /// Failures worth retrying on the next poll without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::UnexpectedResponse { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::UnexpectedResponse {
            message: err.to_string(),
        }
    }
}
