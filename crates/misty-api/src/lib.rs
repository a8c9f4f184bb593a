// misty-api: wire layer for Misty robots (pub/sub WebSocket + REST envelope)

pub mod error;
pub mod pubsub;
pub mod rest;
pub mod transport;

pub use error::Error;
pub use pubsub::frames::{ControlFrame, EventCondition, Inbound, Inequality};
pub use pubsub::{PubSubReader, PubSubWriter};
pub use rest::RestClient;
pub use transport::TransportConfig;
