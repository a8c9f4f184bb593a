mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::commands::Context;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = build_context(&cli.global)?;
    tracing::debug!(command = ?cli.command, "dispatching command");
    commands::dispatch(cli.command, &ctx).await
}

/// Config file (or defaults), then `MISTY_*` env, then command-line flags.
fn build_context(global: &cli::GlobalOpts) -> Result<Context, CliError> {
    let config_path = global
        .config
        .clone()
        .unwrap_or_else(misty_config::config_path);
    let mut config = misty_config::load_config_from(&config_path)?;

    if let Some(ref robot) = global.robot {
        config.robot = Some(robot.clone());
    }
    if let Some(timeout) = global.timeout {
        config.timeout_secs = timeout;
    }
    if global.insecure {
        config.insecure = true;
    }

    Ok(Context {
        config,
        config_path,
        color: output::should_color(global.color),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn global(args: &[&str]) -> cli::GlobalOpts {
        let argv = std::iter::once("misty")
            .chain(args.iter().copied())
            .chain(std::iter::once("calibration"));
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "robot = \"http://10.0.1.160\"\ntimeout_secs = 10\n").unwrap();
        let path_arg = path.to_str().unwrap();

        let ctx = build_context(&global(&["--config", path_arg, "--color", "never"])).unwrap();
        assert_eq!(ctx.config.robot.as_deref(), Some("http://10.0.1.160"));
        assert_eq!(ctx.config.timeout_secs, 10);
        assert!(!ctx.config.insecure);
        assert_eq!(ctx.config_path, path);
        assert!(!ctx.color);

        let ctx = build_context(&global(&[
            "--config",
            path_arg,
            "--robot",
            "http://robot.local",
            "--timeout",
            "3",
            "--insecure",
        ]))
        .unwrap();
        assert_eq!(ctx.config.robot.as_deref(), Some("http://robot.local"));
        assert_eq!(ctx.config.timeout_secs, 3);
        assert!(ctx.config.transport_config().accept_invalid_certs);
    }

    #[test]
    fn malformed_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timeout_secs = \"soon\"\n").unwrap();

        let err = build_context(&global(&["--config", path.to_str().unwrap()])).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
