use thiserror::Error;

/// Top-level error type for the `misty-api` crate.
///
/// Covers the two wire surfaces a robot exposes: the pub/sub WebSocket
/// and the REST API. `misty-core` maps these into subscription-level
/// diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Pub/sub WebSocket ───────────────────────────────────────────
    /// The streaming connection could not be opened.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// A control frame could not be written to an open connection.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    /// The robot closed the connection.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),

    // ── REST envelope ───────────────────────────────────────────────
    /// The robot answered with a failure envelope or a non-success status.
    #[error("Robot API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_404_is_not_found() {
        let err = Error::Api {
            status: 404,
            message: "no such audio file".into(),
        };
        assert!(err.is_not_found());
        assert!(
            !Error::WebSocketClosed {
                code: 1008,
                reason: "policy".into()
            }
            .is_not_found()
        );
    }
}
