//! `misty calibration`: the table in effect after config overrides.

use crate::commands::Context;
use crate::error::CliError;
use crate::output;

pub fn handle(ctx: &Context) -> Result<(), CliError> {
    let table = ctx.config.calibration_table()?;
    output::print_line(&output::render_calibration_header(ctx.color));
    for (actuator, calibration) in table.iter() {
        output::print_line(&output::render_calibration(actuator, calibration, ctx.color));
    }
    Ok(())
}
