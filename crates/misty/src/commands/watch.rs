//! `misty watch`: print payloads as they arrive.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use misty_core::{ConnectionManager, Handler, Payload, SubscriptionHandle};

use crate::cli::WatchArgs;
use crate::commands::Context;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: WatchArgs, ctx: &Context) -> Result<(), CliError> {
    let manager = ctx.manager()?;
    let debounce = args.debounce_ms.map(Duration::from_millis);

    let (tx, mut rx) = mpsc::unbounded_channel::<Payload>();
    let handler = Handler::new(move |payload| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(payload);
        }
    });

    let handles = open(&manager, &args, handler, debounce).await?;
    info!(subscriptions = handles.len(), "watching");

    let timer = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timer);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen = 0usize;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            () = &mut timer => break,
            payload = rx.recv() => {
                let Some(payload) = payload else {
                    warn!("every subscription closed");
                    break;
                };
                let line = if args.json {
                    output::render_payload_json(&payload)
                } else {
                    output::render_payload(&payload, ctx.color)
                };
                output::print_line(&line);

                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
        }
    }

    manager.shutdown().await;
    info!(payloads = seen, "stopped watching");
    Ok(())
}

/// Subscribe to the named topics, or to every topic when none are named.
async fn open(
    manager: &ConnectionManager,
    args: &WatchArgs,
    handler: Handler,
    debounce: Option<Duration>,
) -> Result<Vec<SubscriptionHandle>, CliError> {
    if args.topics.is_empty() {
        let handles = manager.subscribe_all(handler, debounce).await;
        if handles.is_empty() {
            return Err(CliError::SubscriptionClosed {
                reason: "no topic could be subscribed".into(),
            });
        }
        return Ok(handles);
    }

    let mut handles = Vec::new();
    for &topic in &args.topics {
        match manager.subscribe_target(topic, handler.clone(), debounce).await {
            Ok(opened) => handles.extend(opened),
            Err(e) => {
                manager.shutdown().await;
                return Err(e.into());
            }
        }
    }
    Ok(handles)
}
