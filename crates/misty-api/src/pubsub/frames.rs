// ── Pub/sub frame model ──
//
// Control frames the client writes and the two shapes of inbound frame the
// robot answers with: a string `message` (registration acknowledgment) or an
// object `message` (telemetry).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Prefix of the acknowledgment the robot sends for an accepted registration.
pub const REGISTRATION_OK_PREFIX: &str = "Registration Status: API event registered";

// ── Inequality ───────────────────────────────────────────────────────

/// Comparison operator of an [`EventCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Inequality {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "empty")]
    Empty,
    #[serde(rename = "exists")]
    Exists,
}

impl Inequality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Empty => "empty",
            Self::Exists => "exists",
        }
    }
}

impl fmt::Display for Inequality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Inequality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            "empty" => Ok(Self::Empty),
            "exists" => Ok(Self::Exists),
            other => Err(format!(
                "invalid inequality '{other}', expected one of = != > < >= <= empty exists"
            )),
        }
    }
}

// ── EventCondition ───────────────────────────────────────────────────

/// A filter narrowing a subscription to one sensor, actuator, or value range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventCondition {
    pub property: String,
    pub inequality: Inequality,
    pub value: String,
}

impl EventCondition {
    pub fn new(
        property: impl Into<String>,
        inequality: Inequality,
        value: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            inequality,
            value: value.into(),
        }
    }

    /// Shorthand for the `property = value` condition used by sensor filters.
    pub fn equals(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(property, Inequality::Eq, value)
    }
}

impl fmt::Display for EventCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.property, self.inequality, self.value)
    }
}

// ── ControlFrame ─────────────────────────────────────────────────────

/// Frames written by the client on a pub/sub connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Operation", rename_all = "lowercase")]
pub enum ControlFrame {
    Subscribe {
        #[serde(rename = "Type")]
        topic: String,
        #[serde(rename = "DebounceMS")]
        debounce_ms: u64,
        #[serde(rename = "EventName")]
        event_name: String,
        #[serde(rename = "EventConditions", skip_serializing_if = "Vec::is_empty")]
        conditions: Vec<EventCondition>,
        #[serde(rename = "ReturnProperty", skip_serializing_if = "Option::is_none")]
        return_property: Option<String>,
    },
    Unsubscribe {
        #[serde(rename = "EventName")]
        event_name: String,
        #[serde(rename = "Message")]
        message: String,
    },
}

impl ControlFrame {
    /// Event name the frame refers to.
    pub fn event_name(&self) -> &str {
        match self {
            Self::Subscribe { event_name, .. } | Self::Unsubscribe { event_name, .. } => {
                event_name
            }
        }
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A classified frame received from the robot.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Acknowledgment of an accepted registration.
    Registered {
        event_name: Option<String>,
        message: String,
    },
    /// A string message that is not a successful acknowledgment.
    Rejected {
        event_name: Option<String>,
        message: String,
    },
    /// A telemetry frame; carries the full decoded frame.
    Telemetry(Value),
}

impl Inbound {
    /// Decode and classify a text frame.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let frame: Value = serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })?;

        let event_name = frame
            .get("eventName")
            .and_then(Value::as_str)
            .map(String::from);

        match frame.get("message") {
            Some(Value::String(message)) if message.starts_with(REGISTRATION_OK_PREFIX) => {
                Ok(Self::Registered {
                    event_name,
                    message: message.clone(),
                })
            }
            Some(Value::String(message)) => Ok(Self::Rejected {
                event_name,
                message: message.clone(),
            }),
            _ => Ok(Self::Telemetry(frame)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn subscribe_frame_wire_shape() {
        let frame = ControlFrame::Subscribe {
            topic: "ActuatorPosition".into(),
            debounce_ms: 250,
            event_name: "ActuatorPosition:sensorId=ahp-0007".into(),
            conditions: vec![EventCondition::equals("sensorId", "ahp")],
            return_property: Some("value".into()),
        };

        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "Operation": "subscribe",
                "Type": "ActuatorPosition",
                "DebounceMS": 250,
                "EventName": "ActuatorPosition:sensorId=ahp-0007",
                "EventConditions": [
                    { "Property": "sensorId", "Inequality": "=", "Value": "ahp" }
                ],
                "ReturnProperty": "value"
            })
        );
    }

    #[test]
    fn subscribe_frame_omits_empty_optionals() {
        let frame = ControlFrame::Subscribe {
            topic: "SelfState".into(),
            debounce_ms: 0,
            event_name: "SelfState-0001".into(),
            conditions: Vec::new(),
            return_property: None,
        };

        let value = serde_json::to_value(&frame).unwrap();
        assert!(value.get("EventConditions").is_none());
        assert!(value.get("ReturnProperty").is_none());
    }

    #[test]
    fn unsubscribe_frame_wire_shape() {
        let frame = ControlFrame::Unsubscribe {
            event_name: "SelfState-0001".into(),
            message: "SelfState (handle 1)".into(),
        };

        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "Operation": "unsubscribe",
                "EventName": "SelfState-0001",
                "Message": "SelfState (handle 1)"
            })
        );
        assert_eq!(frame.event_name(), "SelfState-0001");
    }

    #[test]
    fn inequality_round_trips_through_str() {
        for op in ["=", "!=", ">", "<", ">=", "<=", "empty", "exists"] {
            let parsed: Inequality = op.parse().unwrap();
            assert_eq!(parsed.as_str(), op);
        }
        assert!("~=".parse::<Inequality>().is_err());
    }

    #[test]
    fn condition_display() {
        let ec = EventCondition::new("value", Inequality::Ge, "10");
        assert_eq!(ec.to_string(), "value>=10");
    }

    #[test]
    fn classify_successful_ack() {
        let raw = json!({
            "eventName": "SelfState-0001",
            "message": "Registration Status: API event registered."
        });
        let inbound = Inbound::parse(&raw.to_string()).unwrap();
        assert!(matches!(
            inbound,
            Inbound::Registered { event_name: Some(ref n), .. } if n == "SelfState-0001"
        ));
    }

    #[test]
    fn classify_rejection() {
        let raw = json!({ "message": "Registration Status: API event NOT registered. Bad condition." });
        let inbound = Inbound::parse(&raw.to_string()).unwrap();
        assert!(matches!(inbound, Inbound::Rejected { event_name: None, .. }));
    }

    #[test]
    fn classify_telemetry_keeps_whole_frame() {
        let raw = json!({
            "eventName": "ActuatorPosition-0002",
            "message": { "sensorId": "ahp", "value": -12.5 }
        });
        let Inbound::Telemetry(frame) = Inbound::parse(&raw.to_string()).unwrap() else {
            panic!("expected telemetry");
        };
        assert_eq!(frame, raw);
    }

    #[test]
    fn malformed_frame_is_deserialization_error() {
        let err = Inbound::parse("not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization { ref body, .. } if body == "not json"));
    }
}
