// ── Core error types ──
//
// Subscription-level errors surfaced by misty-core. Wire failures from
// misty-api are folded into these via `From<misty_api::Error>`.

use std::time::Duration;

use thiserror::Error;

use crate::topic::Actuator;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot open pub/sub connection to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Subscription connection closed: {reason}")]
    SubscriptionClosed { reason: String },

    // ── Registration errors ──────────────────────────────────────────
    #[error("Robot rejected registration of {event_name}: {message}")]
    RegistrationRejected { event_name: String, message: String },

    // ── Wait errors ──────────────────────────────────────────────────
    #[error("Timed out after {timeout_ms}ms waiting for event")]
    WaitTimedOut { timeout_ms: u64 },

    #[error("Wait was cancelled")]
    WaitCancelled,

    // ── Actuator errors ──────────────────────────────────────────────
    #[error("No position reported for actuator {actuator}")]
    MissingActuatorValue { actuator: Actuator },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Robot API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn timed_out(timeout: Duration) -> Self {
        Self::WaitTimedOut {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns `true` for the recoverable "event did not arrive in time" case.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::WaitTimedOut { .. })
    }

    /// Returns `true` if the robot refused an event registration.
    pub fn is_registration_failure(&self) -> bool {
        matches!(self, Self::RegistrationRejected { .. })
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<misty_api::Error> for CoreError {
    fn from(err: misty_api::Error) -> Self {
        match err {
            misty_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: "pubsub".into(),
                reason,
            },
            misty_api::Error::WebSocketSend(reason) => CoreError::SubscriptionClosed { reason },
            misty_api::Error::WebSocketClosed { code, reason } => CoreError::SubscriptionClosed {
                reason: format!("code {code}: {reason}"),
            },
            misty_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            misty_api::Error::Transport(e) => CoreError::Api {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            misty_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid robot URL: {e}"),
            },
            misty_api::Error::Client(message) => CoreError::Config { message },
            misty_api::Error::Deserialization { message, .. } => CoreError::Internal(message),
        }
    }
}
