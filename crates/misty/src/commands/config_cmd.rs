//! `misty config`: show the merged configuration.

use misty_config::ConfigError;

use crate::cli::{ConfigArgs, ConfigCommand};
use crate::commands::Context;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, ctx: &Context) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(&ctx.config).map_err(ConfigError::from)?;
            output::print_line(rendered.trim_end());
        }
        ConfigCommand::Path => {
            output::print_line(&ctx.config_path.display().to_string());
        }
    }
    Ok(())
}
