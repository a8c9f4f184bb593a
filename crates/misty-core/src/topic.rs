// ── Topic catalog ──
//
// Static registry of the telemetry topics a robot streams, and of the
// per-instance filters some topics need before the robot will deliver
// anything useful (one actuator, one touch pad, ...).

use strum::{Display, EnumIter, EnumString, IntoStaticStr, IntoEnumIterator};

use misty_api::EventCondition;

use crate::subscription::{SubscriptionSpec, SubscriptionTarget};

// ── Topic ────────────────────────────────────────────────────────────

/// High-level telemetry category. `Display` yields the wire name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Topic {
    #[strum(to_string = "ActuatorPosition", serialize = "actuator_position")]
    ActuatorPosition,
    #[strum(to_string = "AudioPlayComplete", serialize = "audio_play_complete")]
    AudioPlayComplete,
    #[strum(to_string = "BatteryCharge", serialize = "battery_charge")]
    BatteryCharge,
    #[strum(to_string = "BumpSensor", serialize = "bump_sensor")]
    BumpSensor,
    #[strum(to_string = "DriveEncoders", serialize = "drive_encoders")]
    DriveEncoders,
    #[strum(to_string = "FaceRecognition", serialize = "face_recognition")]
    FaceRecognition,
    #[strum(to_string = "FaceTraining", serialize = "face_training")]
    FaceTraining,
    #[strum(to_string = "HaltCommand", serialize = "halt_command")]
    HaltCommand,
    #[strum(to_string = "IMU", serialize = "imu")]
    Imu,
    #[strum(to_string = "KeyPhraseRecognized", serialize = "key_phrase_recognized")]
    KeyPhraseRecognized,
    #[strum(to_string = "LocomotionCommand", serialize = "locomotion_command")]
    LocomotionCommand,
    #[strum(to_string = "SelfState", serialize = "self_state")]
    SelfState,
    #[strum(to_string = "SerialMessage", serialize = "serial_message")]
    SerialMessage,
    #[strum(to_string = "SourceFocusConfigMessage", serialize = "source_focus_config_message")]
    SourceFocusConfigMessage,
    #[strum(to_string = "SourceTrackDataMessage", serialize = "source_track_data_message")]
    SourceTrackDataMessage,
    #[strum(to_string = "TimeOfFlight", serialize = "time_of_flight")]
    TimeOfFlight,
    #[strum(to_string = "TouchSensor", serialize = "touch_sensor")]
    TouchSensor,
    #[strum(to_string = "WorldState", serialize = "world_state")]
    WorldState,
}

impl Topic {
    /// Wire name sent as `Type` in a subscribe frame.
    pub fn wire_name(self) -> &'static str {
        self.into()
    }

    /// Every topic the robot knows about.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// Resolve to the low-level specs a subscription must be opened for.
    ///
    /// Topics without per-instance granularity resolve to a single
    /// unfiltered spec.
    pub fn resolve(self) -> Vec<SubscriptionSpec> {
        match self {
            Self::ActuatorPosition => specs_for::<Actuator>(),
            Self::BumpSensor => specs_for::<Bump>(),
            Self::DriveEncoders => specs_for::<DriveEncoder>(),
            Self::Imu => specs_for::<ImuReading>(),
            Self::TouchSensor => specs_for::<Touch>(),
            _ => vec![SubscriptionSpec::new(self)],
        }
    }
}

fn specs_for<S: Sensor>() -> Vec<SubscriptionSpec> {
    S::ALL.iter().map(|s| s.spec()).collect()
}

// ── Sensor ───────────────────────────────────────────────────────────

/// A family of device instances that share one topic, each selected by a
/// filter on a common property.
pub trait Sensor: Copy + Eq + 'static {
    /// Topic this family is streamed on.
    const TOPIC: Topic;
    /// Frame property the instance identifier is matched against.
    const FILTER_PROPERTY: &'static str;
    /// Every known instance.
    const ALL: &'static [Self];

    /// Device-side identifier of this instance.
    fn sensor_id(self) -> &'static str;

    fn condition(self) -> EventCondition {
        EventCondition::equals(Self::FILTER_PROPERTY, self.sensor_id())
    }

    fn spec(self) -> SubscriptionSpec {
        SubscriptionSpec::new(Self::TOPIC).with_condition(self.condition())
    }

    fn from_sensor_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.sensor_id() == id)
    }

    /// Recover the instance a spec was built for, if any.
    fn from_spec(spec: &SubscriptionSpec) -> Option<Self> {
        if spec.topic() != Self::TOPIC {
            return None;
        }
        spec.condition_value(Self::FILTER_PROPERTY)
            .and_then(Self::from_sensor_id)
    }
}

macro_rules! sensor_family {
    (
        $(#[$meta:meta])*
        $name:ident on $topic:ident by $property:literal {
            $( $variant:ident = $id:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
        )]
        #[strum(serialize_all = "snake_case", ascii_case_insensitive)]
        pub enum $name {
            $( $variant ),+
        }

        impl Sensor for $name {
            const TOPIC: Topic = Topic::$topic;
            const FILTER_PROPERTY: &'static str = $property;
            const ALL: &'static [Self] = &[$( Self::$variant ),+];

            fn sensor_id(self) -> &'static str {
                match self {
                    $( Self::$variant => $id ),+
                }
            }
        }

        impl From<$name> for SubscriptionTarget {
            fn from(sensor: $name) -> Self {
                Self::Spec(sensor.spec())
            }
        }
    };
}

sensor_family! {
    /// Head and arm joints reporting on `ActuatorPosition`.
    Actuator on ActuatorPosition by "sensorId" {
        Pitch = "ahp",
        Yaw = "ahy",
        Roll = "ahr",
        LeftArm = "ala",
        RightArm = "ara",
    }
}

sensor_family! {
    /// Capacitive touch pads, selected by `sensorPosition`.
    Touch on TouchSensor by "sensorPosition" {
        Chin = "Chin",
        ChinLeft = "ChinLeft",
        ChinRight = "ChinRight",
        HeadLeft = "HeadLeft",
        HeadRight = "HeadRight",
        HeadBack = "HeadBack",
        HeadFront = "HeadFront",
        HeadTop = "HeadTop",
        Scruff = "Scruff",
    }
}

sensor_family! {
    /// Bump switches at the four corners of the base.
    Bump on BumpSensor by "sensorId" {
        FrontRight = "bfr",
        FrontLeft = "bfl",
        BackRight = "bbr",
        BackLeft = "bbl",
    }
}

sensor_family! {
    /// Individual readings of the inertial measurement unit.
    ImuReading on Imu by "sensorId" {
        Yaw = "Yaw",
        Pitch = "Pitch",
        Roll = "Roll",
        XAcceleration = "XAcceleration",
        YAcceleration = "YAcceleration",
        ZAcceleration = "ZAcceleration",
        PitchVelocity = "PitchVelocity",
        RollVelocity = "RollVelocity",
        YawVelocity = "YawVelocity",
    }
}

sensor_family! {
    DriveEncoder on DriveEncoders by "sensorId" {
        LeftDistance = "LeftDistance",
        RightDistance = "RightDistance",
        LeftVelocity = "LeftVelocity",
        RightVelocity = "RightVelocity",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unfiltered_topic_resolves_to_single_spec() {
        let specs = Topic::SelfState.resolve();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].topic(), Topic::SelfState);
        assert!(specs[0].conditions().is_empty());
        assert!(specs[0].return_property().is_none());
    }

    #[test]
    fn actuator_topic_resolves_one_spec_per_actuator() {
        let specs = Topic::ActuatorPosition.resolve();
        let ids: Vec<_> = specs
            .iter()
            .map(|s| s.condition_value("sensorId").unwrap())
            .collect();
        assert_eq!(ids, vec!["ahp", "ahy", "ahr", "ala", "ara"]);
        assert!(specs.iter().all(|s| s.topic() == Topic::ActuatorPosition));
    }

    #[test]
    fn touch_filters_on_sensor_position() {
        let specs = Topic::TouchSensor.resolve();
        assert_eq!(specs.len(), Touch::ALL.len());
        assert_eq!(specs[0].to_string(), "TouchSensor:sensorPosition=Chin");
    }

    #[test]
    fn sensor_reverse_lookup() {
        assert_eq!(Actuator::from_sensor_id("ala"), Some(Actuator::LeftArm));
        assert_eq!(Actuator::from_sensor_id("zzz"), None);

        let spec = Bump::BackLeft.spec();
        assert_eq!(Bump::from_spec(&spec), Some(Bump::BackLeft));
        assert_eq!(Actuator::from_spec(&spec), None);
    }

    #[test]
    fn topic_names_parse_loosely() {
        assert_eq!("IMU".parse::<Topic>().unwrap(), Topic::Imu);
        assert_eq!("imu".parse::<Topic>().unwrap(), Topic::Imu);
        assert_eq!("actuator_position".parse::<Topic>().unwrap(), Topic::ActuatorPosition);
        assert_eq!("selfstate".parse::<Topic>().unwrap(), Topic::SelfState);
        assert_eq!(Topic::Imu.wire_name(), "IMU");
        assert_eq!(Topic::all().count(), 18);
    }

    #[test]
    fn actuator_names_are_snake_case() {
        assert_eq!(Actuator::LeftArm.to_string(), "left_arm");
        assert_eq!("right_arm".parse::<Actuator>().unwrap(), Actuator::RightArm);
    }
}
