// ── Actuator position cache ──
//
// Reads head and arm positions from `ActuatorPosition` telemetry, keeps the
// last full set for a short TTL, and normalizes through the calibration
// table. A refresh always reads every actuator so the cached set is swapped
// as a whole.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::calibration::CalibrationTable;
use crate::callback::EventCallback;
use crate::config::ActuatorConfig;
use crate::error::CoreError;
use crate::manager::ConnectionManager;
use crate::payload::Payload;
use crate::topic::{Actuator, Sensor, Topic};

/// One actuator's position, as reported and as normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorReading {
    pub raw: f64,
    pub normalized: f64,
}

/// A complete set of readings taken by one refresh.
#[derive(Debug, Clone)]
pub struct ActuatorSnapshot {
    refreshed_at: Instant,
    readings: HashMap<Actuator, ActuatorReading>,
}

impl ActuatorSnapshot {
    pub fn refreshed_at(&self) -> Instant {
        self.refreshed_at
    }

    pub fn get(&self, actuator: Actuator) -> Option<ActuatorReading> {
        self.readings.get(&actuator).copied()
    }
}

/// Time-windowed cache of actuator positions backed by pub/sub reads.
pub struct ActuatorMonitor {
    manager: ConnectionManager,
    calibration: CalibrationTable,
    config: ActuatorConfig,
    cache: ArcSwapOption<ActuatorSnapshot>,
    /// Serializes refreshes so concurrent stale reads share one round trip.
    refresh_lock: Mutex<()>,
}

impl ActuatorMonitor {
    pub fn new(
        manager: ConnectionManager,
        calibration: CalibrationTable,
        config: ActuatorConfig,
    ) -> Self {
        Self {
            manager,
            calibration,
            config,
            cache: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// Current snapshot, regardless of age.
    pub fn snapshot(&self) -> Option<Arc<ActuatorSnapshot>> {
        self.cache.load_full()
    }

    /// Drop the cached snapshot so the next read refreshes.
    pub fn invalidate(&self) {
        self.cache.store(None);
    }

    /// Positions for `actuators` (all of them if empty).
    ///
    /// Served from cache while it is younger than the TTL, unless `force`.
    /// Otherwise every actuator is re-read and the cache replaced before
    /// the requested subset is returned. A failed refresh leaves the
    /// previous cache untouched.
    pub async fn get_actuator_values(
        &self,
        actuators: &[Actuator],
        normalize: bool,
        force: bool,
    ) -> Result<HashMap<Actuator, f64>, CoreError> {
        let snapshot = if force {
            let _guard = self.refresh_lock.lock().await;
            self.refresh().await?
        } else if let Some(fresh) = self.fresh() {
            fresh
        } else {
            let _guard = self.refresh_lock.lock().await;
            // Another caller may have refreshed while this one waited.
            match self.fresh() {
                Some(fresh) => fresh,
                None => self.refresh().await?,
            }
        };

        let wanted = if actuators.is_empty() {
            Actuator::ALL
        } else {
            actuators
        };
        wanted
            .iter()
            .map(|&actuator| {
                let reading = snapshot
                    .get(actuator)
                    .ok_or(CoreError::MissingActuatorValue { actuator })?;
                let value = if normalize {
                    reading.normalized
                } else {
                    reading.raw
                };
                Ok((actuator, value))
            })
            .collect()
    }

    fn fresh(&self) -> Option<Arc<ActuatorSnapshot>> {
        self.cache
            .load_full()
            .filter(|s| s.refreshed_at.elapsed() < self.config.cache_ttl)
    }

    async fn refresh(&self) -> Result<Arc<ActuatorSnapshot>, CoreError> {
        debug!("refreshing actuator positions");
        let raw = Arc::new(DashMap::<Actuator, f64>::new());

        let mut callback = {
            let raw = Arc::clone(&raw);
            EventCallback::new(move |payload: Payload| {
                let raw = Arc::clone(&raw);
                async move {
                    let handle = payload.handle();
                    let (Some(actuator), Some(value)) = (
                        Actuator::from_spec(handle.spec()),
                        payload.f64_at("message.value"),
                    ) else {
                        return false;
                    };
                    raw.insert(actuator, value);
                    // One reading per actuator is enough.
                    handle.unsubscribe().await;
                    raw.len() == Actuator::ALL.len()
                }
            })
        };
        if let Some(limit) = self.config.refresh_timeout {
            callback = callback.with_timeout(limit);
        }

        callback
            .scoped_subscribe(
                &self.manager,
                Topic::ActuatorPosition,
                Some(self.config.debounce),
            )
            .await?;

        let mut readings = HashMap::with_capacity(Actuator::ALL.len());
        for &actuator in Actuator::ALL {
            let raw_value = raw
                .get(&actuator)
                .map(|v| *v)
                .ok_or(CoreError::MissingActuatorValue { actuator })?;
            readings.insert(
                actuator,
                ActuatorReading {
                    raw: raw_value,
                    normalized: self.calibration.normalize(actuator, raw_value),
                },
            );
        }

        let snapshot = Arc::new(ActuatorSnapshot {
            refreshed_at: Instant::now(),
            readings,
        });
        self.cache.store(Some(Arc::clone(&snapshot)));
        info!(count = snapshot.readings.len(), "actuator positions refreshed");
        Ok(snapshot)
    }
}

impl std::fmt::Debug for ActuatorMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorMonitor")
            .field("config", &self.config)
            .field("cached", &self.cache.load().is_some())
            .finish_non_exhaustive()
    }
}
