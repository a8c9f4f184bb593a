//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use misty_config::ConfigError;
use misty_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to robot at {url}")]
    #[diagnostic(
        code(misty::connection_failed),
        help(
            "Check that the robot is powered on and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Subscription ended unexpectedly: {reason}")]
    #[diagnostic(code(misty::subscription_closed))]
    SubscriptionClosed { reason: String },

    #[error("No robot address configured")]
    #[diagnostic(
        code(misty::no_robot),
        help(
            "Pass --robot http://<address>, set MISTY_ROBOT,\n\
             or add `robot = \"http://<address>\"` to {path}"
        )
    )]
    NoRobot { path: String },

    // ── Events ───────────────────────────────────────────────────────

    #[error("Robot rejected event {event_name}: {message}")]
    #[diagnostic(
        code(misty::registration_rejected),
        help("Check the topic name and filter conditions.")
    )]
    RegistrationRejected { event_name: String, message: String },

    #[error("No matching event within {millis}ms")]
    #[diagnostic(
        code(misty::timeout),
        help("Increase the timeout or check that the robot is emitting this topic.")
    )]
    Timeout { millis: u64 },

    #[error("Interrupted")]
    #[diagnostic(code(misty::interrupted))]
    Interrupted,

    // ── API ──────────────────────────────────────────────────────────

    #[error("Robot API error: {message}")]
    #[diagnostic(code(misty::api_error))]
    Api { status: Option<u16>, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(misty::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(misty::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(misty::json))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(misty::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::SubscriptionClosed { .. } => {
                exit_code::CONNECTION
            }
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::RegistrationRejected { .. } => exit_code::REJECTED,
            Self::Api {
                status: Some(404), ..
            } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NoRobot { .. } | Self::Json(_) => exit_code::USAGE,
            Self::Interrupted => exit_code::INTERRUPTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::SubscriptionClosed { reason } => Self::SubscriptionClosed { reason },
            CoreError::RegistrationRejected {
                event_name,
                message,
            } => Self::RegistrationRejected {
                event_name,
                message,
            },
            CoreError::WaitTimedOut { timeout_ms } => Self::Timeout { millis: timeout_ms },
            CoreError::WaitCancelled => Self::Interrupted,
            CoreError::Api { message, status } => Self::Api { status, message },
            CoreError::Config { message } => Self::Validation {
                field: "robot".into(),
                reason: message,
            },
            other @ (CoreError::MissingActuatorValue { .. } | CoreError::Internal(_)) => {
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<misty_api::Error> for CliError {
    fn from(err: misty_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_timeout_maps_to_timeout_exit_code() {
        let err: CliError = CoreError::WaitTimedOut { timeout_ms: 250 }.into();
        assert!(matches!(err, CliError::Timeout { millis: 250 }));
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
    }

    #[test]
    fn rejection_keeps_event_name() {
        let err: CliError = CoreError::RegistrationRejected {
            event_name: "SelfState-0001".into(),
            message: "NOT registered".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::REJECTED);
        assert!(err.to_string().contains("SelfState-0001"));
    }

    #[test]
    fn api_not_found_maps_to_not_found() {
        let err: CliError = misty_api::Error::Api {
            status: 404,
            message: "no such endpoint".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
        assert!(matches!(err, CliError::Api { status: Some(404), .. }));
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err: CliError = ConfigError::Validation {
            field: "calibration.tail".into(),
            reason: "unknown actuator".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
