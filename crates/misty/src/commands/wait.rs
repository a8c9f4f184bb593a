//! `misty wait`: block until a payload matches, optionally after a command.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use misty_core::{EventCallback, PathEquals, Settled};

use crate::cli::WaitArgs;
use crate::commands::{Context, json_or_string, parse_json};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: WaitArgs, ctx: &Context) -> Result<(), CliError> {
    let manager = ctx.manager()?;
    let callback = build_callback(&args);
    let debounce = args.debounce_ms.map(Duration::from_millis);

    // Resolve the command before subscribing so bad input fails fast.
    let command = if let Some(path) = args.post.clone() {
        let body = args
            .body
            .as_deref()
            .map(|raw| parse_json("body", raw))
            .transpose()?;
        Some((ctx.rest()?, path, body))
    } else {
        None
    };

    let wait = async {
        if let Some((rest, path, body)) = command {
            let response = callback
                .scoped_subscribe_with(&manager, args.topic, debounce, async move {
                    rest.post(&path, body.as_ref()).await
                })
                .await?;
            info!(%response, "command accepted");
        } else {
            callback.scoped_subscribe(&manager, args.topic, debounce).await?;
        }
        Ok::<_, CliError>(())
    };

    let outcome = tokio::select! {
        result = wait => result,
        _ = tokio::signal::ctrl_c() => Err(CliError::Interrupted),
    };
    manager.shutdown().await;
    outcome?;

    if let Some(payload) = manager.latest(args.topic) {
        output::print_line(&output::render_payload(&payload, ctx.color));
    }
    Ok(())
}

fn build_callback(args: &WaitArgs) -> EventCallback {
    let callback = if args.settled {
        Arc::new(Settled::new(args.path.clone(), args.samples, args.tolerance)).callback()
    } else {
        let expected = args.equals.as_deref().map_or(Value::Null, json_or_string);
        PathEquals::new(args.path.clone(), expected).callback()
    };
    match args.timeout_ms {
        Some(ms) => callback.with_timeout(Duration::from_millis(ms)),
        None => callback,
    }
}
