// Shared transport configuration for the REST client and the pub/sub
// endpoint derived from the same robot address.

use std::time::Duration;

use url::Url;

use crate::error::Error;

const USER_AGENT: &str = concat!("misty-rs/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    /// Accept self-signed certificates when the robot is reached over HTTPS.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {e}")))
    }
}

/// Derive the pub/sub WebSocket endpoint from a robot base URL.
///
/// `http://10.0.1.160` becomes `ws://10.0.1.160/pubsub`; `https` maps to `wss`.
/// Any path on the base URL is replaced.
pub fn pubsub_url(base: &Url) -> Result<Url, Error> {
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(Error::WebSocketConnect(format!(
                "unsupported robot URL scheme '{other}'"
            )));
        }
    };
    let host = base
        .host_str()
        .ok_or_else(|| Error::WebSocketConnect(format!("robot URL has no host: {base}")))?;
    let raw = match base.port() {
        Some(p) => format!("{scheme}://{host}:{p}/pubsub"),
        None => format!("{scheme}://{host}/pubsub"),
    };
    Ok(Url::parse(&raw)?)
}
