//! Real-time subscription and synchronization layer between `misty-api` and
//! callers that drive a Misty robot.
//!
//! - **[`ConnectionManager`]**: opens one pub/sub connection per
//!   [`SubscriptionHandle`], registers the event, and tracks live handles.
//!   [`subscribe_target`](ConnectionManager::subscribe_target) expands a
//!   [`Topic`] into its per-sensor specs and subscribes all-or-nothing.
//!   Each connection's read loop stores the latest [`Payload`] per topic and
//!   hands payloads to the [`Handler`] without blocking further reads.
//!
//! - **[`EventCallback`]**: a predicate plus a single-shot signal.
//!   [`scoped_subscribe`](EventCallback::scoped_subscribe) subscribes, waits
//!   for the predicate, and unsubscribes on every exit path. [`Settled`] and
//!   [`PathEquals`] cover the common "it stopped moving" and "it finished"
//!   cases.
//!
//! - **[`ActuatorMonitor`]**: TTL cache of head and arm positions, normalized
//!   through a [`CalibrationTable`] onto the logical -100..=100 range.
//!
//! - **Topic catalog** ([`topic`]): every telemetry [`Topic`] and the
//!   [`Sensor`] families ([`Actuator`], [`Touch`], [`Bump`], ...) that need
//!   per-instance filters.

pub mod actuators;
pub mod calibration;
pub mod callback;
pub mod config;
mod dispatch;
pub mod error;
pub mod manager;
pub mod payload;
pub mod predicates;
pub mod registry;
pub mod subscription;
pub mod topic;

// ── Primary re-exports ──────────────────────────────────────────────
pub use actuators::{ActuatorMonitor, ActuatorReading, ActuatorSnapshot};
pub use calibration::{Calibration, CalibrationTable};
pub use callback::{CallbackState, EventCallback};
pub use config::{ActuatorConfig, DeliveryMode, PubSubConfig};
pub use error::CoreError;
pub use manager::{ConnectionManager, ScopedSubscription};
pub use payload::{LatestPayloads, Payload};
pub use predicates::{PathEquals, Settled};
pub use registry::ManagerRegistry;
pub use subscription::{Handler, SubscriptionHandle, SubscriptionSpec, SubscriptionTarget};
pub use topic::{Actuator, Bump, DriveEncoder, ImuReading, Sensor, Topic, Touch};

// Wire-level filter types callers need to build custom specs.
pub use misty_api::{EventCondition, Inequality};
