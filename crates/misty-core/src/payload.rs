// ── Telemetry payloads ──
//
// One decoded telemetry frame plus receipt metadata, and the per-manager
// "latest payload per topic" cache the dispatcher writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::subscription::SubscriptionHandle;
use crate::topic::Topic;

/// A telemetry frame as delivered to handlers.
///
/// The body is the full decoded frame (`eventName`, `message`, ...). Use
/// [`path`](Self::path) for optional dotted access instead of indexing.
#[derive(Debug, Clone)]
pub struct Payload {
    received_at: DateTime<Utc>,
    body: Arc<Value>,
    handle: SubscriptionHandle,
}

impl Payload {
    pub(crate) fn new(body: Value, handle: SubscriptionHandle) -> Self {
        Self {
            received_at: Utc::now(),
            body: Arc::new(body),
            handle,
        }
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    pub fn topic(&self) -> Topic {
        self.handle.topic()
    }

    /// The frame's `message` object.
    pub fn message(&self) -> Option<&Value> {
        self.body.get("message")
    }

    /// Look up a dotted path such as `message.metaData.name` or
    /// `message.statusList.0`. Missing segments yield `None`.
    pub fn path(&self, path: &str) -> Option<&Value> {
        lookup(&self.body, path)
    }

    pub fn f64_at(&self, path: &str) -> Option<f64> {
        self.path(path).and_then(Value::as_f64)
    }

    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.path(path).and_then(Value::as_str)
    }
}

pub(crate) fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

// ── LatestPayloads ───────────────────────────────────────────────────

/// Most recent payload per topic. Written only by the dispatcher.
#[derive(Debug, Default)]
pub struct LatestPayloads {
    by_topic: DashMap<Topic, Payload>,
}

impl LatestPayloads {
    pub fn get(&self, topic: Topic) -> Option<Payload> {
        self.by_topic.get(&topic).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }

    pub(crate) fn record(&self, payload: Payload) {
        self.by_topic.insert(payload.topic(), payload);
    }
}
