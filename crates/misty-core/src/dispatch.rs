// ── Dispatcher ──
//
// One read loop per connection. Decodes frames, drops acknowledgments,
// records telemetry in the latest-payload cache, and hands each payload to
// the handler without waiting for it.

use std::sync::Arc;

use misty_api::{Inbound, PubSubReader};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::DeliveryMode;
use crate::manager::ManagerRef;
use crate::payload::{LatestPayloads, Payload};
use crate::subscription::{Handler, SubscriptionHandle};

pub(crate) struct Dispatch {
    pub handle: SubscriptionHandle,
    pub handler: Handler,
    pub reader: PubSubReader,
    /// Telemetry that arrived in place of the acknowledgment.
    pub first: Option<Value>,
    pub cancel: CancellationToken,
    pub latest: Arc<LatestPayloads>,
    pub owner: ManagerRef,
    pub delivery: DeliveryMode,
}

/// Read loop. Does nothing until `ready` fires, so the handle is in the
/// live table before the loop can remove it.
pub(crate) async fn run(dispatch: Dispatch, ready: oneshot::Receiver<()>) {
    let Dispatch {
        handle,
        handler,
        mut reader,
        first,
        cancel,
        latest,
        owner,
        delivery,
    } = dispatch;

    if ready.await.is_err() {
        return;
    }

    let sink = Delivery::start(delivery, handler);
    let deliver = |body: Value| {
        let payload = Payload::new(body, handle.clone());
        latest.record(payload.clone());
        sink.deliver(payload);
    };

    if let Some(body) = first {
        deliver(body);
    }

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(handle = handle.id(), "dispatcher cancelled");
                return;
            }

            frame = reader.next_frame() => match frame {
                Some(Ok(Inbound::Telemetry(body))) => {
                    trace!(handle = handle.id(), "telemetry frame");
                    deliver(body);
                }
                Some(Ok(Inbound::Registered { .. })) => {
                    trace!(handle = handle.id(), "duplicate acknowledgment ignored");
                }
                Some(Ok(Inbound::Rejected { message, .. })) => {
                    error!(
                        event_name = %handle.event_name(),
                        reason = %message,
                        "registration failed on live subscription"
                    );
                    handle.unsubscribe().await;
                    return;
                }
                Some(Err(misty_api::Error::Deserialization { message, .. })) => {
                    debug!(handle = handle.id(), error = %message, "skipping malformed frame");
                }
                Some(Err(misty_api::Error::WebSocketClosed { code, reason })) => {
                    info!(
                        event_name = %handle.event_name(),
                        code,
                        reason = %reason,
                        "robot closed pub/sub connection"
                    );
                    break;
                }
                Some(Err(e)) => {
                    warn!(handle = handle.id(), error = %e, "pub/sub read error");
                    break;
                }
                None => {
                    info!(event_name = %handle.event_name(), "pub/sub connection closed");
                    break;
                }
            }
        }
    }

    // Connection ended on its own; no reconnection.
    if let Some(inner) = owner.upgrade() {
        inner.forget(&handle);
    }
}

// ── Delivery ─────────────────────────────────────────────────────────

enum Delivery {
    /// One spawned task per payload.
    Concurrent(Handler),
    /// Single worker draining a per-handle queue.
    Ordered(mpsc::UnboundedSender<Payload>),
}

impl Delivery {
    fn start(mode: DeliveryMode, handler: Handler) -> Self {
        match mode {
            DeliveryMode::Concurrent => Self::Concurrent(handler),
            DeliveryMode::Ordered => {
                let (tx, mut rx) = mpsc::unbounded_channel::<Payload>();
                tokio::spawn(async move {
                    while let Some(payload) = rx.recv().await {
                        handler.call(payload).await;
                    }
                });
                Self::Ordered(tx)
            }
        }
    }

    fn deliver(&self, payload: Payload) {
        match self {
            Self::Concurrent(handler) => {
                tokio::spawn(handler.call(payload));
            }
            Self::Ordered(tx) => {
                if tx.send(payload).is_err() {
                    debug!("ordered delivery worker gone, payload dropped");
                }
            }
        }
    }
}
