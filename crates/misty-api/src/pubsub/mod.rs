//! Pub/sub WebSocket connection to a Misty robot.
//!
//! The robot accepts one event registration per connection, so every
//! subscription opens its own socket. [`connect`] returns the two halves:
//! a [`PubSubWriter`] for control frames and a [`PubSubReader`] that yields
//! classified [`Inbound`] frames until the connection ends.
//!
//! No reconnection is attempted here; a dropped connection simply ends the
//! reader. A close frame carrying a code is surfaced once as
//! [`Error::WebSocketClosed`] before the reader ends.

pub mod frames;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use frames::{ControlFrame, Inbound};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a pub/sub connection and split it into writer and reader halves.
pub async fn connect(endpoint: &Url) -> Result<(PubSubWriter, PubSubReader), Error> {
    tracing::debug!(url = %endpoint, "opening pub/sub connection");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let (sink, stream) = ws_stream.split();
    Ok((
        PubSubWriter { sink },
        PubSubReader {
            stream,
            closed: false,
        },
    ))
}

// ── Writer ───────────────────────────────────────────────────────────

/// Write half of a pub/sub connection.
pub struct PubSubWriter {
    sink: SplitSink<WsStream, Message>,
}

impl PubSubWriter {
    /// Serialize and send a control frame.
    pub async fn send(&mut self, frame: &ControlFrame) -> Result<(), Error> {
        let text =
            serde_json::to_string(frame).map_err(|e| Error::WebSocketSend(e.to_string()))?;
        tracing::trace!(event_name = frame.event_name(), "sending control frame");
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| Error::WebSocketSend(e.to_string()))
    }

    /// Send a close frame and flush.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.sink
            .close()
            .await
            .map_err(|e| Error::WebSocketSend(e.to_string()))
    }
}

// ── Reader ───────────────────────────────────────────────────────────

/// Read half of a pub/sub connection.
pub struct PubSubReader {
    stream: SplitStream<WsStream>,
    closed: bool,
}

impl PubSubReader {
    /// Wait for the next data frame and classify it.
    ///
    /// Control traffic (ping, pong, raw frames) is skipped. A close frame
    /// with a payload yields [`Error::WebSocketClosed`] once; after that, or
    /// when the stream ends without one, this returns `None`.
    pub async fn next_frame(&mut self) -> Option<Result<Inbound, Error>> {
        if self.closed {
            return None;
        }
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Inbound::parse(&text)),
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => return Some(Inbound::parse(text)),
                    Err(e) => tracing::debug!(error = %e, "skipping non-UTF-8 binary frame"),
                },
                Ok(Message::Ping(_)) => {
                    // tungstenite handles pong replies automatically
                    tracing::trace!("pub/sub ping");
                }
                Ok(Message::Close(frame)) => {
                    self.closed = true;
                    let cf = frame?;
                    tracing::debug!(code = %cf.code, reason = %cf.reason, "pub/sub close frame");
                    return Some(Err(Error::WebSocketClosed {
                        code: u16::from(cf.code),
                        reason: cf.reason.to_string(),
                    }));
                }
                Ok(_) => {}
                Err(e) => return Some(Err(Error::WebSocketConnect(e.to_string()))),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use frames::EventCondition;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    /// One-connection server: reads a single frame, answers with `reply`,
    /// then returns the frame it read.
    async fn one_shot_server(reply: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let received = loop {
                if let Some(Ok(Message::Text(t))) = ws.next().await {
                    break t.to_string();
                }
            };
            ws.send(Message::text(reply)).await.unwrap();
            ws.close(None).await.ok();
            received
        });
        (Url::parse(&format!("ws://{addr}/pubsub")).unwrap(), task)
    }

    #[tokio::test]
    async fn subscribe_then_read_ack() {
        let (url, server) = one_shot_server(
            r#"{"eventName":"TouchSensor-0001","message":"Registration Status: API event registered."}"#,
        )
        .await;

        let (mut writer, mut reader) = connect(&url).await.unwrap();
        writer
            .send(&ControlFrame::Subscribe {
                topic: "TouchSensor".into(),
                debounce_ms: 250,
                event_name: "TouchSensor-0001".into(),
                conditions: vec![EventCondition::equals("sensorPosition", "Chin")],
                return_property: None,
            })
            .await
            .unwrap();

        let inbound = reader.next_frame().await.unwrap().unwrap();
        assert!(matches!(inbound, Inbound::Registered { .. }));

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["Operation"], "subscribe");
        assert_eq!(sent["EventConditions"][0]["Value"], "Chin");

        // Server closed after replying.
        assert!(reader.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn close_code_is_reported_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "too many connections".into(),
            }))
            .await
            .ok();
            while ws.next().await.is_some() {}
        });

        let url = Url::parse(&format!("ws://{addr}/pubsub")).unwrap();
        let (_writer, mut reader) = connect(&url).await.unwrap();

        let err = reader.next_frame().await.unwrap().unwrap_err();
        assert!(
            matches!(err, Error::WebSocketClosed { code: 1008, ref reason } if reason == "too many connections"),
            "unexpected: {err:?}"
        );
        assert!(reader.next_frame().await.is_none());
        server.abort();
    }

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/pubsub")).unwrap();
        let result = connect(&url).await;
        assert!(matches!(result, Err(Error::WebSocketConnect(_))));
    }
}
