// ── Subscription handle model ──
//
// Value types identifying what to subscribe to (`SubscriptionSpec`,
// `SubscriptionTarget`), an active subscription (`SubscriptionHandle`), and
// the callback that receives its payloads (`Handler`).

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use misty_api::{ControlFrame, EventCondition, Inequality};

use crate::manager::{ConnectionManager, ManagerInner};
use crate::payload::Payload;
use crate::topic::Topic;

/// Process-wide handle id source. Never reset, so ids stay unique across
/// managers and unsubscribe/resubscribe cycles.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

// ── SubscriptionSpec ─────────────────────────────────────────────────

/// A concrete, filterable subscription target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionSpec {
    topic: Topic,
    conditions: BTreeSet<EventCondition>,
    return_property: Option<String>,
}

impl SubscriptionSpec {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            conditions: BTreeSet::new(),
            return_property: None,
        }
    }

    pub fn with_condition(mut self, condition: EventCondition) -> Self {
        self.conditions.insert(condition);
        self
    }

    /// Ask the robot to send only this property of each telemetry message.
    pub fn returning(mut self, property: impl Into<String>) -> Self {
        self.return_property = Some(property.into());
        self
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn conditions(&self) -> &BTreeSet<EventCondition> {
        &self.conditions
    }

    pub fn return_property(&self) -> Option<&str> {
        self.return_property.as_deref()
    }

    /// Value of the first `property = value` condition on `property`.
    pub fn condition_value(&self, property: &str) -> Option<&str> {
        self.conditions
            .iter()
            .find(|c| c.property == property && c.inequality == Inequality::Eq)
            .map(|c| c.value.as_str())
    }

    pub(crate) fn subscribe_frame(&self, event_name: String, debounce: Duration) -> ControlFrame {
        ControlFrame::Subscribe {
            topic: self.topic.wire_name().to_owned(),
            debounce_ms: u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX),
            event_name,
            conditions: self.conditions.iter().cloned().collect(),
            return_property: self.return_property.clone(),
        }
    }
}

impl From<Topic> for SubscriptionSpec {
    fn from(topic: Topic) -> Self {
        Self::new(topic)
    }
}

/// Renders as `Topic[:cond|cond][:return=prop]`.
impl fmt::Display for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.topic)?;
        if !self.conditions.is_empty() {
            let conds: Vec<String> = self.conditions.iter().map(ToString::to_string).collect();
            write!(f, ":{}", conds.join("|"))?;
        }
        if let Some(ref prop) = self.return_property {
            write!(f, ":return={prop}")?;
        }
        Ok(())
    }
}

// ── SubscriptionTarget ───────────────────────────────────────────────

/// Either a high-level topic (resolved through the catalog) or one spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionTarget {
    Topic(Topic),
    Spec(SubscriptionSpec),
}

impl SubscriptionTarget {
    pub fn resolve(&self) -> Vec<SubscriptionSpec> {
        match self {
            Self::Topic(topic) => topic.resolve(),
            Self::Spec(spec) => vec![spec.clone()],
        }
    }
}

impl From<Topic> for SubscriptionTarget {
    fn from(topic: Topic) -> Self {
        Self::Topic(topic)
    }
}

impl From<SubscriptionSpec> for SubscriptionTarget {
    fn from(spec: SubscriptionSpec) -> Self {
        Self::Spec(spec)
    }
}

// ── SubscriptionHandle ───────────────────────────────────────────────

/// Identifies one active subscription. Equality and hashing use the id only.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    spec: Arc<SubscriptionSpec>,
    owner: Weak<ManagerInner>,
}

impl SubscriptionHandle {
    pub(crate) fn new(spec: SubscriptionSpec, owner: Weak<ManagerInner>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            spec: Arc::new(spec),
            owner,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    pub fn topic(&self) -> Topic {
        self.spec.topic()
    }

    /// Unique name the robot knows this registration by.
    pub fn event_name(&self) -> String {
        format!("{}-{:04}", self.spec, self.id)
    }

    /// Unsubscribe through the owning manager.
    ///
    /// Returns `false` if the manager is gone or the handle is no longer live.
    pub async fn unsubscribe(&self) -> bool {
        let Some(inner) = self.owner.upgrade() else {
            return false;
        };
        ConnectionManager::from_inner(inner).unsubscribe(self).await
    }
}

impl PartialEq for SubscriptionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriptionHandle {}

impl Hash for SubscriptionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("spec", &self.spec.to_string())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (handle {})", self.spec, self.id)
    }
}

// ── Handler ──────────────────────────────────────────────────────────

type HandlerFn = dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync;

/// Async callback invoked for every payload of a subscription.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |payload: Payload| -> BoxFuture<'static, ()> {
            Box::pin(f(payload))
        }))
    }

    /// A handler that ignores every payload; the latest-payload cache
    /// is still updated.
    pub fn noop() -> Self {
        Self::new(|_| async {})
    }

    pub(crate) fn call(&self, payload: Payload) -> BoxFuture<'static, ()> {
        (self.0)(payload)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::{Actuator, Sensor};
    use pretty_assertions::assert_eq;

    #[test]
    fn spec_display_includes_conditions_and_return() {
        let spec = SubscriptionSpec::new(Topic::TimeOfFlight)
            .with_condition(EventCondition::new("distanceInMeters", Inequality::Lt, "0.2"))
            .returning("distanceInMeters");
        assert_eq!(
            spec.to_string(),
            "TimeOfFlight:distanceInMeters<0.2:return=distanceInMeters"
        );
    }

    #[test]
    fn subscribe_frame_carries_spec() {
        let spec = Actuator::Pitch.spec();
        let frame = spec.subscribe_frame("x-0001".into(), Duration::from_millis(100));
        let ControlFrame::Subscribe {
            topic,
            debounce_ms,
            conditions,
            return_property,
            ..
        } = frame
        else {
            panic!("expected subscribe frame");
        };
        assert_eq!(topic, "ActuatorPosition");
        assert_eq!(debounce_ms, 100);
        assert_eq!(conditions, vec![EventCondition::equals("sensorId", "ahp")]);
        assert!(return_property.is_none());
    }

    #[test]
    fn handle_ids_strictly_increase() {
        let a = SubscriptionHandle::new(Topic::SelfState.into(), Weak::new());
        let b = SubscriptionHandle::new(Topic::SelfState.into(), Weak::new());
        let c = SubscriptionHandle::new(Topic::SelfState.into(), Weak::new());
        assert!(a.id() < b.id() && b.id() < c.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn event_name_is_spec_and_padded_id() {
        let handle = SubscriptionHandle::new(Actuator::Yaw.spec(), Weak::new());
        let expected = format!("ActuatorPosition:sensorId=ahy-{:04}", handle.id());
        assert_eq!(handle.event_name(), expected);
    }

    #[tokio::test]
    async fn orphaned_handle_unsubscribe_is_false() {
        let handle = SubscriptionHandle::new(Topic::SelfState.into(), Weak::new());
        assert!(!handle.unsubscribe().await);
    }
}
