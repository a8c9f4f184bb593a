// ── Runtime subscription configuration ──
//
// These types describe *how* subscriptions and actuator reads behave.
// They never touch disk; misty-config builds them from TOML/env and hands
// them in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How payloads are handed to a subscription's handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Spawn one task per payload. Invocation is in receipt order,
    /// completion order is not guaranteed.
    #[default]
    Concurrent,
    /// Queue payloads per handle and run the handler on a single worker,
    /// so handler completions follow receipt order.
    Ordered,
}

/// Pub/sub connection tuning.
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    /// Debounce used when a caller does not pass one.
    pub default_debounce: Duration,
    /// How long `subscribe` waits for the registration acknowledgment.
    /// `None` skips the wait entirely.
    pub ack_timeout: Option<Duration>,
    pub delivery: DeliveryMode,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            default_debounce: Duration::from_millis(250),
            ack_timeout: Some(Duration::from_secs(2)),
            delivery: DeliveryMode::default(),
        }
    }
}

/// Actuator position cache tuning.
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    /// Reads inside this window are served from cache.
    pub cache_ttl: Duration,
    /// Upper bound on a refresh round trip.
    pub refresh_timeout: Option<Duration>,
    /// Debounce for the position subscriptions opened by a refresh.
    pub debounce: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(1),
            refresh_timeout: Some(Duration::from_secs(5)),
            debounce: Duration::from_millis(100),
        }
    }
}
