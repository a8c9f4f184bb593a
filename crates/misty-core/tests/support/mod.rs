// In-process stand-in for a robot's pub/sub endpoint.
//
// Accepts any number of WebSocket connections. On each one it reads the
// subscribe frame, answers with an acknowledgment (or a rejection), streams
// the scripted telemetry, then records every later control frame until the
// client closes.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

type FramePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type TelemetryScript = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// Scripted robot behavior, keyed off the subscribe frame.
#[derive(Clone)]
pub struct Behavior {
    /// Answer with a rejection instead of an acknowledgment.
    pub reject: FramePredicate,
    /// `message` objects to stream after the acknowledgment.
    pub telemetry: TelemetryScript,
    /// Pause between telemetry frames.
    pub interval: Duration,
    /// Close the socket after the telemetry script runs out.
    pub close_after_telemetry: bool,
    /// Close code sent with any close frame; `None` sends a bare close.
    pub close_code: Option<u16>,
    /// Close the socket instead of answering the subscribe frame.
    pub close_on_subscribe: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            reject: Arc::new(|_| false),
            telemetry: Arc::new(|_| Vec::new()),
            interval: Duration::from_millis(5),
            close_after_telemetry: false,
            close_code: None,
            close_on_subscribe: false,
        }
    }
}

impl Behavior {
    pub fn reject_if(mut self, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.reject = Arc::new(f);
        self
    }

    pub fn telemetry(mut self, f: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static) -> Self {
        self.telemetry = Arc::new(f);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn close_after_telemetry(mut self) -> Self {
        self.close_after_telemetry = true;
        self
    }

    pub fn close_code(mut self, code: u16) -> Self {
        self.close_code = Some(code);
        self
    }

    pub fn close_on_subscribe(mut self) -> Self {
        self.close_on_subscribe = true;
        self
    }

    fn close_frame(&self) -> Option<CloseFrame> {
        self.close_code.map(|code| CloseFrame {
            code: CloseCode::from(code),
            reason: "robot going away".into(),
        })
    }
}

#[derive(Default)]
struct Recorded {
    frames: Mutex<Vec<Value>>,
    open: AtomicUsize,
}

pub struct MockRobot {
    pub endpoint: Url,
    recorded: Arc<Recorded>,
    task: tokio::task::JoinHandle<()>,
}

impl MockRobot {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Recorded::default());

        let task = {
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                while let Ok((tcp, _)) = listener.accept().await {
                    tokio::spawn(serve(tcp, behavior.clone(), Arc::clone(&recorded)));
                }
            })
        };

        Self {
            endpoint: Url::parse(&format!("ws://{addr}/pubsub")).unwrap(),
            recorded,
            task,
        }
    }

    pub fn frames(&self) -> Vec<Value> {
        self.recorded.frames.lock().unwrap().clone()
    }

    fn frames_with(&self, operation: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["Operation"] == operation)
            .collect()
    }

    pub fn subscribes(&self) -> Vec<Value> {
        self.frames_with("subscribe")
    }

    pub fn unsubscribes(&self) -> Vec<Value> {
        self.frames_with("unsubscribe")
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes().len()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes().len()
    }

    pub fn open_connections(&self) -> usize {
        self.recorded.open.load(Ordering::SeqCst)
    }

    /// Poll until `check` holds, panicking after two seconds.
    pub async fn eventually(&self, what: &str, check: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !check(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for: {what}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockRobot {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(tcp: TcpStream, behavior: Behavior, recorded: Arc<Recorded>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
        return;
    };
    recorded.open.fetch_add(1, Ordering::SeqCst);

    let subscribe = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: Value = serde_json::from_str(&text).unwrap();
                recorded.frames.lock().unwrap().push(frame.clone());
                break Some(frame);
            }
            Some(Ok(_)) => {}
            _ => break None,
        }
    };

    if let Some(frame) = subscribe {
        let event_name = frame["EventName"].clone();
        if behavior.close_on_subscribe {
            let _ = ws.close(behavior.close_frame()).await;
        } else if (behavior.reject)(&frame) {
            let reply = json!({
                "eventName": event_name,
                "message": "Registration Status: API event NOT registered. Invalid event condition.",
            });
            let _ = ws.send(Message::text(reply.to_string())).await;
        } else {
            let ack = json!({
                "eventName": event_name,
                "message": "Registration Status: API event registered.",
            });
            let _ = ws.send(Message::text(ack.to_string())).await;

            for message in (behavior.telemetry)(&frame) {
                tokio::time::sleep(behavior.interval).await;
                let frame = json!({ "eventName": event_name, "message": message });
                if ws.send(Message::text(frame.to_string())).await.is_err() {
                    break;
                }
            }

            if behavior.close_after_telemetry {
                let _ = ws.close(behavior.close_frame()).await;
            }
        }

        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    recorded.frames.lock().unwrap().push(frame);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    }

    recorded.open.fetch_sub(1, Ordering::SeqCst);
}

/// Value of the first event condition in a subscribe frame.
pub fn condition_value(frame: &Value) -> Option<&str> {
    frame["EventConditions"][0]["Value"].as_str()
}
