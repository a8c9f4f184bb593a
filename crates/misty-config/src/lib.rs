//! Shared configuration for Misty robot tools.
//!
//! TOML file + `MISTY_` environment overrides, and translation to the
//! runtime types of `misty_core` (`PubSubConfig`, `ActuatorConfig`,
//! `CalibrationTable`) and `misty_api::TransportConfig`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use misty_api::TransportConfig;
use misty_core::{Actuator, ActuatorConfig, CalibrationTable, DeliveryMode, PubSubConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Robot base URL (e.g., "http://10.0.1.160").
    pub robot: Option<String>,

    /// REST request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Accept self-signed certificates from an HTTPS robot address.
    #[serde(default)]
    pub insecure: bool,

    #[serde(default)]
    pub pubsub: PubSubSection,

    #[serde(default)]
    pub actuators: ActuatorSection,

    /// Per-actuator `[positive, zero, negative]` readings, keyed by
    /// actuator name (`pitch`, `left_arm`, ...).
    #[serde(default)]
    pub calibration: BTreeMap<String, [f64; 3]>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            robot: None,
            timeout_secs: default_timeout(),
            insecure: false,
            pubsub: PubSubSection::default(),
            actuators: ActuatorSection::default(),
            calibration: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PubSubSection {
    #[serde(default = "default_pubsub_debounce")]
    pub debounce_ms: u64,

    /// How long to wait for a registration acknowledgment; 0 skips it.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_ms: u64,

    #[serde(default)]
    pub delivery: DeliveryMode,
}

impl Default for PubSubSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_pubsub_debounce(),
            ack_timeout_ms: default_ack_timeout(),
            delivery: DeliveryMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActuatorSection {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_ms: u64,

    /// Upper bound on a position refresh; 0 waits indefinitely.
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_ms: u64,

    #[serde(default = "default_actuator_debounce")]
    pub debounce_ms: u64,
}

impl Default for ActuatorSection {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl(),
            refresh_timeout_ms: default_refresh_timeout(),
            debounce_ms: default_actuator_debounce(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_pubsub_debounce() -> u64 {
    250
}
fn default_ack_timeout() -> u64 {
    2000
}
fn default_cache_ttl() -> u64 {
    1000
}
fn default_refresh_timeout() -> u64 {
    5000
}
fn default_actuator_debounce() -> u64 {
    100
}

fn optional_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then_some(Duration::from_millis(ms))
}

// ── Translation to runtime config ───────────────────────────────────

impl Config {
    /// Parsed robot base URL.
    pub fn robot_url(&self) -> Result<Url, ConfigError> {
        let raw = self.robot.as_deref().ok_or_else(|| ConfigError::Validation {
            field: "robot".into(),
            reason: "no robot address configured (set `robot` or MISTY_ROBOT)".into(),
        })?;
        raw.parse().map_err(|e| ConfigError::Validation {
            field: "robot".into(),
            reason: format!("invalid URL '{raw}': {e}"),
        })
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            accept_invalid_certs: self.insecure,
        }
    }

    pub fn pubsub_config(&self) -> PubSubConfig {
        PubSubConfig {
            default_debounce: Duration::from_millis(self.pubsub.debounce_ms),
            ack_timeout: optional_ms(self.pubsub.ack_timeout_ms),
            delivery: self.pubsub.delivery,
        }
    }

    pub fn actuator_config(&self) -> ActuatorConfig {
        ActuatorConfig {
            cache_ttl: Duration::from_millis(self.actuators.cache_ttl_ms),
            refresh_timeout: optional_ms(self.actuators.refresh_timeout_ms),
            debounce: Duration::from_millis(self.actuators.debounce_ms),
        }
    }

    /// Calibration table; actuators without a valid entry get defaults.
    ///
    /// Unknown actuator names are rejected so typos do not silently fall
    /// back.
    pub fn calibration_table(&self) -> Result<CalibrationTable, ConfigError> {
        let mut raw = HashMap::with_capacity(self.calibration.len());
        for (name, &[pos, zero, neg]) in &self.calibration {
            let actuator: Actuator = name.parse().map_err(|_| ConfigError::Validation {
                field: format!("calibration.{name}"),
                reason: "unknown actuator (expected pitch, yaw, roll, left_arm, or right_arm)"
                    .into(),
            })?;
            raw.insert(actuator, (pos, zero, neg));
        }
        Ok(CalibrationTable::from_raw(&raw))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "misty", "misty").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("misty");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `MISTY_*` variables.
///
/// Nested keys use a double underscore: `MISTY_PUBSUB__DEBOUNCE_MS=100`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MISTY_").split("__"))
}

/// Load from an explicit file. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
