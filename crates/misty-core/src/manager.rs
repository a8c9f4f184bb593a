// ── Connection manager ──
//
// Owns one pub/sub connection per subscription handle. Each subscribe call
// opens a socket, registers the event, and hands the read half to a
// dispatcher task. The live table maps handle id to the write half plus the
// cancellation token of that task; it is the only state `unsubscribe`
// touches.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use misty_api::pubsub::{self, PubSubReader, PubSubWriter};
use misty_api::{ControlFrame, Inbound};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PubSubConfig;
use crate::dispatch::{self, Dispatch};
use crate::error::CoreError;
use crate::payload::{LatestPayloads, Payload};
use crate::subscription::{Handler, SubscriptionHandle, SubscriptionSpec, SubscriptionTarget};
use crate::topic::Topic;

/// Write half and task control for one live subscription.
struct LiveSubscription {
    handle: SubscriptionHandle,
    writer: PubSubWriter,
    cancel: CancellationToken,
}

pub(crate) struct ManagerInner {
    endpoint: Url,
    config: PubSubConfig,
    live: DashMap<u64, LiveSubscription>,
    latest: Arc<LatestPayloads>,
    /// Dispatcher loops and detached cleanup work.
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl ManagerInner {
    pub(crate) fn forget(&self, handle: &SubscriptionHandle) {
        if self.live.remove(&handle.id()).is_some() {
            debug!(handle = handle.id(), "removed handle after connection ended");
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens, tracks, and tears down pub/sub subscriptions for one robot.
///
/// Cheaply cloneable; clones share the live table and the latest-payload
/// cache.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Create a manager for a pub/sub endpoint (`ws://<host>/pubsub`).
    pub fn new(endpoint: Url, config: PubSubConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                endpoint,
                config,
                live: DashMap::new(),
                latest: Arc::new(LatestPayloads::default()),
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Create a manager from the robot's REST base URL.
    pub fn for_robot(base: &Url, config: PubSubConfig) -> Result<Self, CoreError> {
        let endpoint = misty_api::transport::pubsub_url(base)?;
        Ok(Self::new(endpoint, config))
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.inner.config
    }

    // ── Subscribe ────────────────────────────────────────────────────

    /// Open a connection for one spec and start delivering its payloads.
    ///
    /// `debounce` falls back to the configured default. If the connection
    /// cannot be opened no handle is created. If the robot rejects the
    /// registration the half-open connection is unsubscribed and closed
    /// before the error is returned.
    pub async fn subscribe(
        &self,
        spec: SubscriptionSpec,
        handler: Handler,
        debounce: Option<Duration>,
    ) -> Result<SubscriptionHandle, CoreError> {
        let (mut writer, mut reader) =
            pubsub::connect(&self.inner.endpoint)
                .await
                .map_err(|e| CoreError::ConnectionFailed {
                    url: self.inner.endpoint.to_string(),
                    reason: e.to_string(),
                })?;

        let handle = SubscriptionHandle::new(spec, Arc::downgrade(&self.inner));
        let debounce = debounce.unwrap_or(self.inner.config.default_debounce);
        let frame = handle.spec().subscribe_frame(handle.event_name(), debounce);

        if let Err(e) = writer.send(&frame).await {
            let _ = writer.close().await;
            return Err(e.into());
        }

        let first = match self.await_registration(&handle, &mut writer, &mut reader).await {
            Ok(first) => first,
            Err(e) => {
                let _ = writer.close().await;
                return Err(e);
            }
        };

        let cancel = self.inner.cancel.child_token();
        let (ready_tx, ready_rx) = oneshot::channel();
        self.inner.tasks.spawn(dispatch::run(
            Dispatch {
                handle: handle.clone(),
                handler,
                reader,
                first,
                cancel: cancel.clone(),
                latest: Arc::clone(&self.inner.latest),
                owner: Arc::downgrade(&self.inner),
                delivery: self.inner.config.delivery,
            },
            ready_rx,
        ));

        self.inner.live.insert(
            handle.id(),
            LiveSubscription {
                handle: handle.clone(),
                writer,
                cancel,
            },
        );
        // The dispatcher may only remove the handle once it is in the table.
        let _ = ready_tx.send(());

        info!(event_name = %handle.event_name(), handle = handle.id(), "subscribed");
        Ok(handle)
    }

    /// Wait for the robot's answer to a subscribe frame.
    ///
    /// Returns a telemetry body that arrived in place of the acknowledgment,
    /// which the dispatcher delivers first.
    async fn await_registration(
        &self,
        handle: &SubscriptionHandle,
        writer: &mut PubSubWriter,
        reader: &mut PubSubReader,
    ) -> Result<Option<Value>, CoreError> {
        let Some(ack_timeout) = self.inner.config.ack_timeout else {
            return Ok(None);
        };
        let deadline = tokio::time::Instant::now() + ack_timeout;

        loop {
            let Ok(next) = tokio::time::timeout_at(deadline, reader.next_frame()).await else {
                debug!(
                    event_name = %handle.event_name(),
                    "no acknowledgment before timeout, assuming registered"
                );
                return Ok(None);
            };

            match next {
                None => {
                    return Err(CoreError::SubscriptionClosed {
                        reason: format!(
                            "connection closed before {} was acknowledged",
                            handle.event_name()
                        ),
                    });
                }
                Some(Err(misty_api::Error::Deserialization { message, .. })) => {
                    debug!(error = %message, "skipping malformed frame");
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Inbound::Registered { .. })) => return Ok(None),
                Some(Ok(Inbound::Telemetry(body))) => return Ok(Some(body)),
                Some(Ok(Inbound::Rejected { message, .. })) => {
                    warn!(
                        event_name = %handle.event_name(),
                        reason = %message,
                        "robot rejected registration"
                    );
                    send_unsubscribe(writer, handle).await;
                    return Err(CoreError::RegistrationRejected {
                        event_name: handle.event_name(),
                        message,
                    });
                }
            }
        }
    }

    /// Subscribe to every spec a target resolves to, concurrently.
    ///
    /// All-or-nothing: if any member fails, every sibling that did succeed
    /// is unsubscribed before the first error is returned.
    pub async fn subscribe_target(
        &self,
        target: impl Into<SubscriptionTarget>,
        handler: Handler,
        debounce: Option<Duration>,
    ) -> Result<Vec<SubscriptionHandle>, CoreError> {
        let specs = target.into().resolve();
        let results = join_all(
            specs
                .into_iter()
                .map(|spec| self.subscribe(spec, handler.clone(), debounce)),
        )
        .await;

        let mut handles = Vec::with_capacity(results.len());
        let mut first_err = None;
        for result in results {
            match result {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        if let Some(err) = first_err {
            warn!(
                opened = handles.len(),
                error = %err,
                "bulk subscribe failed, closing sibling subscriptions"
            );
            self.unsubscribe_many(&handles).await;
            return Err(err);
        }
        Ok(handles)
    }

    /// Subscribe one handler to every topic, unfiltered.
    ///
    /// Diagnostic entry point. Best effort: topics that fail are logged and
    /// skipped.
    pub async fn subscribe_all(
        &self,
        handler: Handler,
        debounce: Option<Duration>,
    ) -> Vec<SubscriptionHandle> {
        let results = join_all(Topic::all().map(|topic| {
            let handler = handler.clone();
            async move {
                let result = self
                    .subscribe(SubscriptionSpec::new(topic), handler, debounce)
                    .await;
                (topic, result)
            }
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(topic, result)| match result {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(%topic, error = %e, "subscribe_all: skipping topic");
                    None
                }
            })
            .collect()
    }

    /// Subscribe and wrap the handles in a guard that unsubscribes them.
    pub async fn scoped(
        &self,
        target: impl Into<SubscriptionTarget>,
        handler: Handler,
        debounce: Option<Duration>,
    ) -> Result<ScopedSubscription, CoreError> {
        let handles = self.subscribe_target(target, handler, debounce).await?;
        Ok(ScopedSubscription {
            manager: self.clone(),
            handles,
            armed: true,
        })
    }

    // ── Unsubscribe ──────────────────────────────────────────────────

    /// Unsubscribe one handle.
    ///
    /// Returns `false` without touching the network if the handle is not
    /// live (already unsubscribed, or its connection ended).
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let Some((_, mut live)) = self.inner.live.remove(&handle.id()) else {
            return false;
        };

        live.cancel.cancel();
        send_unsubscribe(&mut live.writer, &live.handle).await;
        if let Err(e) = live.writer.close().await {
            debug!(handle = handle.id(), error = %e, "close after unsubscribe failed");
        }

        info!(event_name = %handle.event_name(), handle = handle.id(), "unsubscribed");
        true
    }

    /// Unsubscribe every live handle on `topic`. Returns how many were live.
    pub async fn unsubscribe_topic(&self, topic: Topic) -> usize {
        let handles: Vec<_> = self
            .live_handles()
            .into_iter()
            .filter(|h| h.topic() == topic)
            .collect();
        self.unsubscribe_many(&handles).await
    }

    /// Unsubscribe every live handle. Returns how many were live.
    pub async fn unsubscribe_all(&self) -> usize {
        let handles = self.live_handles();
        self.unsubscribe_many(&handles).await
    }

    pub(crate) async fn unsubscribe_many(&self, handles: &[SubscriptionHandle]) -> usize {
        join_all(handles.iter().map(|h| self.unsubscribe(h)))
            .await
            .into_iter()
            .filter(|removed| *removed)
            .count()
    }

    /// Schedule unsubscription on the tracked task pool without waiting.
    pub(crate) fn spawn_cleanup(&self, handles: Vec<SubscriptionHandle>) {
        if handles.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                count = handles.len(),
                "no async runtime for cleanup, subscriptions left registered"
            );
            return;
        };
        let manager = self.clone();
        self.inner.tasks.spawn_on(
            async move {
                let removed = manager.unsubscribe_many(&handles).await;
                debug!(removed, "deferred unsubscribe finished");
            },
            &runtime,
        );
    }

    /// Unsubscribe everything and wait for dispatchers and deferred
    /// cleanups to finish.
    pub async fn shutdown(&self) {
        let removed = self.unsubscribe_all().await;
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
        info!(removed, "connection manager shut down");
    }

    // ── Inspection ───────────────────────────────────────────────────

    /// Live handles, oldest first.
    pub fn live_handles(&self) -> Vec<SubscriptionHandle> {
        let mut handles: Vec<_> = self
            .inner
            .live
            .iter()
            .map(|entry| entry.value().handle.clone())
            .collect();
        handles.sort_by_key(SubscriptionHandle::id);
        handles
    }

    pub fn is_live(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.live.contains_key(&handle.id())
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.len()
    }

    /// Most recent payload received on `topic` by any subscription.
    pub fn latest(&self, topic: Topic) -> Option<Payload> {
        self.inner.latest.get(topic)
    }

    pub fn latest_payloads(&self) -> &LatestPayloads {
        &self.inner.latest
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("live", &self.inner.live.len())
            .finish_non_exhaustive()
    }
}

async fn send_unsubscribe(writer: &mut PubSubWriter, handle: &SubscriptionHandle) {
    let frame = ControlFrame::Unsubscribe {
        event_name: handle.event_name(),
        message: format!("unsubscribing {handle}"),
    };
    if let Err(e) = writer.send(&frame).await {
        warn!(event_name = %handle.event_name(), error = %e, "failed to send unsubscribe");
    }
}

// ── ScopedSubscription ───────────────────────────────────────────────

/// Handles that are unsubscribed when the scope ends.
///
/// Prefer [`close`](Self::close), which waits for the unsubscribe frames to
/// go out. Dropping the guard instead schedules the same work on the
/// manager's task pool; [`ConnectionManager::shutdown`] drains it.
#[must_use = "dropping the guard immediately unsubscribes"]
pub struct ScopedSubscription {
    manager: ConnectionManager,
    handles: Vec<SubscriptionHandle>,
    armed: bool,
}

impl ScopedSubscription {
    pub fn handles(&self) -> &[SubscriptionHandle] {
        &self.handles
    }

    /// Unsubscribe now and wait for it. Returns how many handles were live.
    pub async fn close(mut self) -> usize {
        self.armed = false;
        let handles = std::mem::take(&mut self.handles);
        self.manager.unsubscribe_many(&handles).await
    }

    /// Keep the subscriptions alive past the scope.
    pub fn detach(mut self) -> Vec<SubscriptionHandle> {
        self.armed = false;
        std::mem::take(&mut self.handles)
    }
}

impl Drop for ScopedSubscription {
    fn drop(&mut self) {
        if self.armed {
            self.manager.spawn_cleanup(std::mem::take(&mut self.handles));
        }
    }
}

impl std::fmt::Debug for ScopedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSubscription")
            .field("handles", &self.handles)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

/// Weak reference used by dispatchers to reach their manager.
pub(crate) type ManagerRef = Weak<ManagerInner>;
