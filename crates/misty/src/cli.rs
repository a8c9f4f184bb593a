//! Clap derive structures for the `misty` CLI.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

use misty_core::{Actuator, Topic};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// misty -- live telemetry and diagnostics for Misty robots
#[derive(Debug, Parser)]
#[command(
    name = "misty",
    version,
    about = "Watch and query a Misty robot from the command line",
    long_about = "Diagnostics over a robot's pub/sub stream and REST API.\n\n\
        Subscribes to telemetry topics, reads calibrated actuator positions,\n\
        and blocks until an event matches a condition.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Robot base URL (overrides config)
    #[arg(long, short = 'r', env = "MISTY_ROBOT", global = true)]
    pub robot: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "MISTY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// REST request timeout in seconds (overrides config)
    #[arg(long, env = "MISTY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "MISTY_INSECURE", global = true)]
    pub insecure: bool,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream telemetry; every topic when none are named
    Watch(WatchArgs),

    /// Read head and arm positions
    #[command(alias = "act")]
    Actuators(ActuatorsArgs),

    /// Block until a payload on a topic matches a condition
    Wait(WaitArgs),

    /// Show the effective calibration table
    #[command(alias = "cal")]
    Calibration,

    /// Issue a raw REST request
    Request(RequestArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Topics to subscribe to (e.g. actuator_position, TouchSensor)
    pub topics: Vec<Topic>,

    /// Device-side debounce in milliseconds
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Exit after this many payloads
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Exit after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Print one compact JSON object per payload
    #[arg(long)]
    pub json: bool,
}

// ── Actuators ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ActuatorsArgs {
    /// Actuators to read (default: all)
    pub actuators: Vec<Actuator>,

    /// Report physical readings instead of the -100..=100 range
    #[arg(long)]
    pub raw: bool,

    /// Bypass the position cache
    #[arg(long, short = 'f')]
    pub force: bool,
}

// ── Wait ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("condition").required(true).args(["equals", "settled"])))]
pub struct WaitArgs {
    /// Topic to subscribe to for the duration of the wait
    pub topic: Topic,

    /// Dotted path into the payload (e.g. message.value)
    #[arg(long, default_value = "message")]
    pub path: String,

    /// Signal when the value at --path equals this (JSON, or a bare string)
    #[arg(long)]
    pub equals: Option<String>,

    /// Signal once the number at --path stops changing
    #[arg(long)]
    pub settled: bool,

    /// Consecutive matching readings required by --settled
    #[arg(long, default_value_t = 2, requires = "settled")]
    pub samples: usize,

    /// Allowed drift between readings for --settled
    #[arg(long, default_value_t = 0.0, requires = "settled")]
    pub tolerance: f64,

    /// Give up after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Device-side debounce in milliseconds
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// POST to this API path after subscribing, then wait
    #[arg(long, value_name = "PATH")]
    pub post: Option<String>,

    /// JSON body for --post
    #[arg(long, requires = "post")]
    pub body: Option<String>,
}

// ── Request ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    #[arg(value_enum, ignore_case = true)]
    pub method: HttpMethod,

    /// Path below /api (e.g. battery, arms/set)
    pub path: String,

    /// JSON request body
    #[arg(long, short = 'd')]
    pub body: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the merged configuration as TOML
    Show,
    /// Print the config file location
    Path,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("misty").chain(args.iter().copied()))
    }

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn watch_parses_topic_names_loosely() {
        let cli = parse(&["watch", "actuator_position", "IMU", "-n", "5"]).unwrap();
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.topics, vec![Topic::ActuatorPosition, Topic::Imu]);
        assert_eq!(args.count, Some(5));
    }

    #[test]
    fn watch_without_topics_is_allowed() {
        let cli = parse(&["watch"]).unwrap();
        assert!(matches!(cli.command, Command::Watch(ref a) if a.topics.is_empty()));
    }

    #[test]
    fn unknown_topic_is_rejected() {
        assert!(parse(&["watch", "teleporter"]).is_err());
    }

    #[test]
    fn actuators_take_snake_case_names() {
        let cli = parse(&["actuators", "left_arm", "pitch", "--raw"]).unwrap();
        let Command::Actuators(args) = cli.command else {
            panic!("expected actuators");
        };
        assert_eq!(args.actuators, vec![Actuator::LeftArm, Actuator::Pitch]);
        assert!(args.raw);
        assert!(!args.force);
    }

    #[test]
    fn wait_requires_a_condition() {
        assert!(parse(&["wait", "audio_play_complete"]).is_err());
        assert!(parse(&["wait", "audio_play_complete", "--equals", "x", "--settled"]).is_err());

        let cli = parse(&["wait", "actuator_position", "--settled", "--samples", "3"]).unwrap();
        let Command::Wait(args) = cli.command else {
            panic!("expected wait");
        };
        assert!(args.settled);
        assert_eq!(args.samples, 3);
        assert_eq!(args.path, "message");
    }

    #[test]
    fn wait_body_requires_post() {
        assert!(parse(&["wait", "self_state", "--equals", "1", "--body", "{}"]).is_err());
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = parse(&["calibration", "-vv", "-k", "--robot", "http://10.0.1.160"]).unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert!(cli.global.insecure);
        assert_eq!(cli.global.robot.as_deref(), Some("http://10.0.1.160"));
    }

    #[test]
    fn request_method_is_case_insensitive() {
        let cli = parse(&["request", "GET", "battery"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Request(RequestArgs {
                method: HttpMethod::Get,
                ..
            })
        ));
    }
}
