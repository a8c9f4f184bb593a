// ── Event callback ──
//
// A predicate over payloads paired with a single-shot signal. Used to turn
// "send a command, then wait until telemetry says it is done" into
// sequential code.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use strum::Display;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::manager::ConnectionManager;
use crate::payload::Payload;
use crate::subscription::{Handler, SubscriptionTarget};

/// Lifecycle of an [`EventCallback`].
///
/// `Signaled`, `TimedOut`, and `Cancelled` stay put until
/// [`EventCallback::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CallbackState {
    Idle,
    Waiting,
    Signaled,
    TimedOut,
    Cancelled,
}

impl CallbackState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Signaled | Self::TimedOut | Self::Cancelled)
    }
}

type PredicateFn = dyn Fn(Payload) -> BoxFuture<'static, bool> + Send + Sync;

struct CallbackInner {
    predicate: Box<PredicateFn>,
    state: watch::Sender<CallbackState>,
}

/// Predicate-driven, single-shot wait primitive. Clones share state.
#[derive(Clone)]
pub struct EventCallback {
    inner: Arc<CallbackInner>,
    default_timeout: Option<Duration>,
}

impl EventCallback {
    /// Build from an async predicate.
    pub fn new<F, Fut>(predicate: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            inner: Arc::new(CallbackInner {
                predicate: Box::new(move |payload: Payload| -> BoxFuture<'static, bool> {
                    Box::pin(predicate(payload))
                }),
                state: watch::Sender::new(CallbackState::Idle),
            }),
            default_timeout: None,
        }
    }

    /// Build from a synchronous predicate.
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        Self::new(move |payload| {
            let hit = predicate(&payload);
            async move { hit }
        })
    }

    /// Timeout used by [`wait`](Self::wait) when none is passed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn state(&self) -> CallbackState {
        *self.inner.state.borrow()
    }

    pub fn is_signaled(&self) -> bool {
        self.state() == CallbackState::Signaled
    }

    /// Run the predicate on a payload and signal if it holds.
    ///
    /// Ignored once the callback is in a terminal state. Returns whether
    /// this call signaled.
    pub async fn invoke(&self, payload: Payload) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        if !(self.inner.predicate)(payload).await {
            return false;
        }
        self.transition(CallbackState::Signaled)
    }

    /// Wait until signaled.
    ///
    /// `timeout` overrides the default; with neither, waits indefinitely.
    /// Dropping the returned future moves the callback to `Cancelled` so
    /// other waiters are released.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<(), CoreError> {
        let timeout = timeout.or(self.default_timeout);
        let mut rx = self.inner.state.subscribe();
        self.inner.state.send_if_modified(|s| {
            let was_idle = *s == CallbackState::Idle;
            if was_idle {
                *s = CallbackState::Waiting;
            }
            was_idle
        });

        let mut guard = CancelOnDrop {
            callback: self,
            armed: true,
        };
        let terminal = async {
            rx.wait_for(|s| s.is_terminal())
                .await
                .map_or(CallbackState::Cancelled, |s| *s)
        };
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, terminal).await.ok(),
            None => Some(terminal.await),
        };
        guard.armed = false;

        let state = match outcome {
            Some(state) => state,
            None => {
                self.transition(CallbackState::TimedOut);
                // A signal may have raced the deadline.
                self.state()
            }
        };

        match state {
            CallbackState::Signaled => Ok(()),
            CallbackState::TimedOut => Err(CoreError::timed_out(timeout.unwrap_or_default())),
            _ => Err(CoreError::WaitCancelled),
        }
    }

    /// Reset to `Idle` for reuse.
    pub fn clear(&self) {
        self.inner.state.send_replace(CallbackState::Idle);
    }

    /// Handler that feeds every payload into [`invoke`](Self::invoke).
    pub fn handler(&self) -> Handler {
        let callback = self.clone();
        Handler::new(move |payload| {
            let callback = callback.clone();
            async move {
                callback.invoke(payload).await;
            }
        })
    }

    /// Subscribe, wait for the predicate, unsubscribe.
    ///
    /// Reusing a callback needs [`clear`](Self::clear) first; see
    /// [`scoped_subscribe_with`](Self::scoped_subscribe_with).
    ///
    /// Unsubscription happens on every exit: success, timeout, subscribe
    /// error, or the future being dropped (in which case it is scheduled on
    /// the manager's cleanup pool).
    pub async fn scoped_subscribe(
        &self,
        manager: &ConnectionManager,
        target: impl Into<SubscriptionTarget>,
        debounce: Option<Duration>,
    ) -> Result<(), CoreError> {
        self.scoped_subscribe_with(manager, target, debounce, async { Ok::<_, CoreError>(()) })
            .await
    }

    /// Like [`scoped_subscribe`](Self::scoped_subscribe), but runs `action`
    /// after subscribing and before waiting, e.g. the command whose
    /// completion the predicate detects.
    ///
    /// The callback's state is not reset. A callback that is already
    /// signaled returns as soon as `action` completes, and one that timed
    /// out or was cancelled fails the same way again; call
    /// [`clear`](Self::clear) first to wait for fresh telemetry.
    pub async fn scoped_subscribe_with<F, T, E>(
        &self,
        manager: &ConnectionManager,
        target: impl Into<SubscriptionTarget>,
        debounce: Option<Duration>,
        action: F,
    ) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Into<CoreError> + Send,
    {
        let scope = manager.scoped(target, self.handler(), debounce).await?;
        let result: Result<T, CoreError> = async {
            let value = action.await.map_err(Into::into)?;
            self.wait(None).await?;
            Ok(value)
        }
        .await;
        let removed = scope.close().await;
        debug!(removed, ok = result.is_ok(), "scoped subscription closed");
        result
    }

    fn transition(&self, to: CallbackState) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.is_terminal() {
                false
            } else {
                *s = to;
                true
            }
        })
    }
}

impl std::fmt::Debug for EventCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCallback")
            .field("state", &self.state())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

struct CancelOnDrop<'a> {
    callback: &'a EventCallback,
    armed: bool,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.callback.transition(CallbackState::Cancelled);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use std::time::Instant;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::subscription::SubscriptionHandle;
    use crate::topic::Topic;

    fn payload(value: serde_json::Value) -> Payload {
        Payload::new(
            json!({ "message": value }),
            SubscriptionHandle::new(Topic::SelfState.into(), Weak::new()),
        )
    }

    fn is_done() -> EventCallback {
        EventCallback::from_fn(|p| p.str_at("message.status") == Some("done"))
    }

    #[tokio::test]
    async fn signals_when_predicate_holds() {
        let cb = is_done();
        assert_eq!(cb.state(), CallbackState::Idle);

        assert!(!cb.invoke(payload(json!({ "status": "busy" }))).await);
        assert!(cb.invoke(payload(json!({ "status": "done" }))).await);
        assert!(cb.is_signaled());
        assert_ok!(cb.wait(Some(Duration::from_millis(10))).await);
    }

    #[tokio::test]
    async fn wait_times_out_promptly() {
        let cb = EventCallback::from_fn(|_| false);
        let started = Instant::now();
        let err = cb.wait(Some(Duration::from_millis(10))).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(cb.state(), CallbackState::TimedOut);
    }

    #[tokio::test]
    async fn default_timeout_applies() {
        let cb = EventCallback::from_fn(|_| false).with_timeout(Duration::from_millis(5));
        assert!(cb.wait(None).await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn terminal_state_ignores_invocations_until_cleared() {
        let cb = is_done();
        let _ = cb.wait(Some(Duration::from_millis(1))).await;
        assert_eq!(cb.state(), CallbackState::TimedOut);

        assert!(!cb.invoke(payload(json!({ "status": "done" }))).await);
        assert_eq!(cb.state(), CallbackState::TimedOut);

        cb.clear();
        assert_eq!(cb.state(), CallbackState::Idle);
        assert!(cb.invoke(payload(json!({ "status": "done" }))).await);
    }

    #[tokio::test]
    async fn concurrent_signal_wakes_waiter() {
        let cb = is_done();
        let waiter = {
            let cb = cb.clone();
            tokio::spawn(async move { cb.wait(Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cb.state(), CallbackState::Waiting);

        cb.invoke(payload(json!({ "status": "done" }))).await;
        assert_ok!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn dropped_wait_cancels_other_waiters() {
        let cb = EventCallback::from_fn(|_| false);
        let other = {
            let cb = cb.clone();
            tokio::spawn(async move { cb.wait(None).await })
        };

        // Abandon a second wait mid-flight.
        assert_err!(tokio::time::timeout(Duration::from_millis(10), cb.wait(None)).await);
        assert_eq!(cb.state(), CallbackState::Cancelled);

        let err = tokio::time::timeout(Duration::from_secs(1), other)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, CoreError::WaitCancelled));
    }

    #[tokio::test]
    async fn async_predicate_is_awaited() {
        let cb = EventCallback::new(|p: Payload| async move {
            tokio::task::yield_now().await;
            p.f64_at("message.value").is_some_and(|v| v > 10.0)
        });
        assert!(!cb.invoke(payload(json!({ "value": 3.0 }))).await);
        assert!(cb.invoke(payload(json!({ "value": 12.0 }))).await);
    }
}
