//! Errors raised while talking to Download Station.

use thiserror::Error;

/// Errors that can occur during NAS operations.
///
/// Transport failures (`Timeout`, `Network`, `HttpStatus`, `Decode`) are
/// kept apart from failures reported by the API itself (`Api`,
/// `SessionExpired`) and from login failures (`Auth`).
#[derive(Debug, Clone, Error)]
pub enum SynologyError {
    /// Login rejected or the NAS could not be reached while logging in
    #[error("authentication to {host}:{port} failed: {reason}")]
    Auth {
        /// NAS host
        host: String,
        /// NAS port
        port: u16,
        /// Human-readable cause
        reason: String,
    },
    /// The request did not complete within the configured timeout
    #[error("request timed out after {0}s")]
    Timeout(u64),
    /// Connection refused, DNS failure, TLS failure and similar
    #[error("network error: {0}")]
    Network(String),
    /// The NAS answered with a non-success HTTP status
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    /// The response body was not the expected JSON envelope
    #[error("invalid response: {0}")]
    Decode(String),
    /// The session id is no longer accepted
    #[error("session expired (code {0})")]
    SessionExpired(i64),
    /// The API reported a failure
    #[error("API error {code}: {message}")]
    Api {
        /// Synology error code
        code: i64,
        /// Description of the code
        message: String,
    },
    /// The HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl SynologyError {
    /// Classify a transport-level `reqwest` error.
    #[must_use]
    pub fn from_transport(error: &reqwest::Error, timeout_secs: u64) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if let Some(status) = error.status() {
            Self::HttpStatus(status.as_u16())
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }

    /// Whether the failure is the session-expiry signal that permits one
    /// re-authentication and retry.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}
