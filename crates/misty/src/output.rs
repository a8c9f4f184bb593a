//! Terminal rendering for payloads, actuator readings and calibration.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::Value;

use misty_core::{Actuator, Calibration, Payload};

use crate::cli::ColorMode;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Write one line to stdout, ignoring broken pipes.
pub fn print_line(line: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
}

// ── Payloads ─────────────────────────────────────────────────────────

/// `HH:MM:SS.mmm  Topic:cond  {message}` on one line.
pub fn render_payload(payload: &Payload, color: bool) -> String {
    let time = payload.received_at().format("%H:%M:%S%.3f").to_string();
    let spec = payload.handle().spec().to_string();
    let message = payload
        .message()
        .map_or_else(|| payload.body().to_string(), Value::to_string);

    if color {
        format!("{}  {}  {message}", time.dimmed(), spec.cyan())
    } else {
        format!("{time}  {spec}  {message}")
    }
}

/// Compact JSON object per payload, for piping into other tools.
pub fn render_payload_json(payload: &Payload) -> String {
    serde_json::json!({
        "received_at": payload.received_at().to_rfc3339(),
        "topic": payload.topic().wire_name(),
        "event_name": payload.handle().event_name(),
        "body": payload.body(),
    })
    .to_string()
}

// ── Actuators ────────────────────────────────────────────────────────

pub fn render_actuator(actuator: Actuator, value: f64, raw: bool, color: bool) -> String {
    let name = format!("{:<10}", actuator.to_string());
    let value = if raw {
        format!("{value:>9.2}")
    } else {
        format!("{value:>7.1} %")
    };
    if color {
        format!("{}{}", name.bold(), value.green())
    } else {
        format!("{name}{value}")
    }
}

// ── Calibration ──────────────────────────────────────────────────────

pub fn render_calibration_header(color: bool) -> String {
    let header = format!("{:<10}{:>10}{:>10}{:>10}", "actuator", "negative", "zero", "positive");
    if color {
        header.dimmed().to_string()
    } else {
        header
    }
}

pub fn render_calibration(actuator: Actuator, calibration: Calibration, color: bool) -> String {
    let name = format!("{:<10}", actuator.to_string());
    let values = format!(
        "{:>10.1}{:>10.1}{:>10.1}",
        calibration.neg(),
        calibration.zero(),
        calibration.pos()
    );
    if color {
        format!("{}{values}", name.bold())
    } else {
        format!("{name}{values}")
    }
}

/// Pretty JSON for REST responses.
pub fn render_json(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}
