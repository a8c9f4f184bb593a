// REST collaborator
//
// Minimal `request(method, path, body) -> JSON` surface over the robot's HTTP
// API. Per-capability wrappers (audio, images, movement, ...) are built on top
// of this by callers; this module only handles URL construction and the
// `{ status, result | error }` envelope.

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Envelope every REST response is wrapped in.
#[derive(serde::Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for a single robot.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Create a client for the robot at `base_url` (e.g. `http://10.0.1.160`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The robot base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/api/{path}`.
    fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/api/{path}"))?)
    }

    /// Issue a request and unwrap the envelope, returning `result`.
    ///
    /// A `"Failed"` status or a non-2xx response becomes [`Error::Api`].
    /// A body that is not an envelope is returned as-is.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let url = self.api_url(path)?;
        debug!("{method} {url}");

        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        let parsed: Option<Envelope> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|e| e.error)
                .unwrap_or_else(|| text.clone());
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        match parsed {
            Some(Envelope {
                status: Some(ref s),
                error,
                ..
            }) if s.eq_ignore_ascii_case("failed") => Err(Error::Api {
                status: status.as_u16(),
                message: error.unwrap_or_else(|| "request failed".into()),
            }),
            Some(Envelope {
                status: Some(_),
                result,
                ..
            }) => Ok(result.unwrap_or(Value::Null)),
            _ if text.trim().is_empty() => Ok(Value::Null),
            _ => serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text,
            }),
        }
    }

    /// `GET` request.
    pub async fn get(&self, path: &str) -> Result<Value, Error> {
        self.request(Method::GET, path, None).await
    }

    /// `POST` with an optional JSON body.
    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value, Error> {
        self.request(Method::POST, path, body).await
    }

    /// `DELETE` with an optional JSON body.
    pub async fn delete(&self, path: &str, body: Option<&Value>) -> Result<Value, Error> {
        self.request(Method::DELETE, path, body).await
    }
}
