// Reusable payload predicates for `EventCallback`.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::callback::EventCallback;
use crate::payload::Payload;

/// Signals once a numeric value has held steady for `required`
/// consecutive payloads, e.g. a joint that stopped moving.
#[derive(Debug)]
pub struct Settled {
    path: String,
    required: usize,
    tolerance: f64,
    run: Mutex<Run>,
}

#[derive(Debug, Default)]
struct Run {
    last: Option<f64>,
    length: usize,
}

impl Settled {
    /// `required` counts the readings in the steady run, so 2 means
    /// "two payloads in a row with the same value".
    pub fn new(path: impl Into<String>, required: usize, tolerance: f64) -> Self {
        Self {
            path: path.into(),
            required: required.max(1),
            tolerance: tolerance.abs(),
            run: Mutex::new(Run::default()),
        }
    }

    /// Value at `message.value`, compared exactly twice in a row.
    pub fn actuator() -> Self {
        Self::new("message.value", 2, 0.0)
    }

    pub fn check(&self, payload: &Payload) -> bool {
        let Some(value) = payload.f64_at(&self.path) else {
            return false;
        };
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        run.length = match run.last {
            Some(last) if (value - last).abs() <= self.tolerance => run.length + 1,
            _ => 1,
        };
        run.last = Some(value);
        run.length >= self.required
    }

    /// Forget the current run.
    pub fn clear(&self) {
        *self.run.lock().unwrap_or_else(PoisonError::into_inner) = Run::default();
    }

    pub fn callback(self: &Arc<Self>) -> EventCallback {
        let settled = Arc::clone(self);
        EventCallback::from_fn(move |payload| settled.check(payload))
    }
}

/// Signals when the value at a path equals an expected JSON value.
#[derive(Debug, Clone)]
pub struct PathEquals {
    path: String,
    expected: Value,
}

impl PathEquals {
    pub fn new(path: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
        }
    }

    pub fn check(&self, payload: &Payload) -> bool {
        payload.path(&self.path) == Some(&self.expected)
    }

    pub fn callback(self) -> EventCallback {
        EventCallback::from_fn(move |payload| self.check(payload))
    }
}
