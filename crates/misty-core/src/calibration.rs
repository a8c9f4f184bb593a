// ── Actuator calibration ──
//
// Maps device-specific joint readings onto the logical -100..=100 range the
// movement commands speak, and back. Each actuator has its own, possibly
// inverted, non-symmetric physical range.

use std::collections::HashMap;

use tracing::warn;

use crate::error::CoreError;
use crate::topic::{Actuator, Sensor};

/// Logical value at either extreme.
pub const LOGICAL_MAX: f64 = 100.0;

/// Physical readings at logical +100, 0, and -100 for one actuator.
///
/// The triplet is strictly monotonic, in either direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pos: f64,
    zero: f64,
    neg: f64,
}

impl Calibration {
    pub fn new(pos: f64, zero: f64, neg: f64) -> Result<Self, CoreError> {
        let finite = pos.is_finite() && zero.is_finite() && neg.is_finite();
        let increasing = pos > zero && zero > neg;
        let decreasing = pos < zero && zero < neg;
        if !finite || !(increasing || decreasing) {
            return Err(CoreError::Config {
                message: format!(
                    "calibration ({pos}, {zero}, {neg}) is not strictly monotonic"
                ),
            });
        }
        Ok(Self { pos, zero, neg })
    }

    pub fn pos(&self) -> f64 {
        self.pos
    }

    pub fn zero(&self) -> f64 {
        self.zero
    }

    pub fn neg(&self) -> f64 {
        self.neg
    }

    /// Physical reading to logical value, clamped to -100..=100.
    pub fn normalize(&self, physical: f64) -> f64 {
        let offset = physical - self.zero;
        let on_positive_side = offset * (self.pos - self.zero) >= 0.0;
        let logical = if on_positive_side {
            LOGICAL_MAX * offset / (self.pos - self.zero)
        } else {
            -LOGICAL_MAX * offset / (self.neg - self.zero)
        };
        logical.clamp(-LOGICAL_MAX, LOGICAL_MAX)
    }

    /// Logical value to physical reading. Never goes past either extreme.
    pub fn denormalize(&self, logical: f64) -> f64 {
        let logical = logical.clamp(-LOGICAL_MAX, LOGICAL_MAX);
        if logical >= 0.0 {
            self.zero + logical / LOGICAL_MAX * (self.pos - self.zero)
        } else {
            self.zero - logical / LOGICAL_MAX * (self.neg - self.zero)
        }
    }
}

// ── CalibrationTable ─────────────────────────────────────────────────

/// Calibration for every actuator.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    entries: HashMap<Actuator, Calibration>,
}

impl CalibrationTable {
    /// Factory extremes measured on a stock robot.
    pub fn default_for(actuator: Actuator) -> Calibration {
        let (pos, zero, neg) = match actuator {
            Actuator::Pitch => (-36.0, -6.0, 22.0),
            Actuator::Roll => (42.0, 1.0, -39.0),
            Actuator::Yaw => (-85.0, -2.0, 80.0),
            Actuator::LeftArm => (-26.0, 2.0, 89.0),
            Actuator::RightArm => (-27.0, -5.0, 89.0),
        };
        Calibration { pos, zero, neg }
    }

    /// Build from raw triplets, falling back to defaults (with a warning)
    /// for any actuator that is missing or invalid.
    pub fn from_raw(raw: &HashMap<Actuator, (f64, f64, f64)>) -> Self {
        let entries = Actuator::ALL
            .iter()
            .map(|&actuator| {
                let calibration = match raw.get(&actuator) {
                    Some(&(pos, zero, neg)) => Calibration::new(pos, zero, neg)
                        .unwrap_or_else(|e| {
                            warn!(%actuator, error = %e, "invalid calibration, using default");
                            Self::default_for(actuator)
                        }),
                    None => {
                        warn!(%actuator, "no calibration configured, using default");
                        Self::default_for(actuator)
                    }
                };
                (actuator, calibration)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, actuator: Actuator) -> Calibration {
        self.entries
            .get(&actuator)
            .copied()
            .unwrap_or_else(|| Self::default_for(actuator))
    }

    pub fn set(&mut self, actuator: Actuator, calibration: Calibration) {
        self.entries.insert(actuator, calibration);
    }

    pub fn normalize(&self, actuator: Actuator, physical: f64) -> f64 {
        self.get(actuator).normalize(physical)
    }

    pub fn denormalize(&self, actuator: Actuator, logical: f64) -> f64 {
        self.get(actuator).denormalize(logical)
    }

    /// Entries in actuator order.
    pub fn iter(&self) -> impl Iterator<Item = (Actuator, Calibration)> + '_ {
        Actuator::ALL.iter().map(|&a| (a, self.get(a)))
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self {
            entries: Actuator::ALL
                .iter()
                .map(|&a| (a, Self::default_for(a)))
                .collect(),
        }
    }
}
