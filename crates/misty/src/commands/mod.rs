//! Command handlers and the context they share.

pub mod actuators;
pub mod calibration;
pub mod config_cmd;
pub mod request;
pub mod wait;
pub mod watch;

use std::path::PathBuf;

use url::Url;

use misty_api::RestClient;
use misty_config::Config;
use misty_core::ConnectionManager;

use crate::cli::Command;
use crate::error::CliError;

/// Merged configuration plus presentation settings.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    pub color: bool,
}

impl Context {
    pub fn robot_url(&self) -> Result<Url, CliError> {
        if self.config.robot.is_none() {
            return Err(CliError::NoRobot {
                path: self.config_path.display().to_string(),
            });
        }
        Ok(self.config.robot_url()?)
    }

    pub fn manager(&self) -> Result<ConnectionManager, CliError> {
        let url = self.robot_url()?;
        Ok(ConnectionManager::for_robot(&url, self.config.pubsub_config())?)
    }

    pub fn rest(&self) -> Result<RestClient, CliError> {
        let url = self.robot_url()?;
        Ok(RestClient::new(url, &self.config.transport_config())?)
    }
}

/// Route a parsed command to its handler.
pub async fn dispatch(cmd: Command, ctx: &Context) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, ctx).await,
        Command::Actuators(args) => actuators::handle(args, ctx).await,
        Command::Wait(args) => wait::handle(args, ctx).await,
        Command::Calibration => calibration::handle(ctx),
        Command::Request(args) => request::handle(args, ctx).await,
        Command::Config(args) => config_cmd::handle(&args, ctx),
    }
}

/// Parse a JSON argument; anything that is not JSON is taken as a string.
pub fn json_or_string(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()))
}

/// Parse a JSON argument that must be valid.
pub fn parse_json(field: &str, raw: &str) -> Result<serde_json::Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("invalid JSON: {e}"),
    })
}
