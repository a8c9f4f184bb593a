//! `misty actuators`: calibrated head and arm positions.

use misty_core::{Actuator, ActuatorMonitor, Sensor};

use crate::cli::ActuatorsArgs;
use crate::commands::Context;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: ActuatorsArgs, ctx: &Context) -> Result<(), CliError> {
    let manager = ctx.manager()?;
    let calibration = ctx.config.calibration_table()?;
    let monitor = ActuatorMonitor::new(manager.clone(), calibration, ctx.config.actuator_config());

    let values = monitor
        .get_actuator_values(&args.actuators, !args.raw, args.force)
        .await;
    manager.shutdown().await;
    let values = values?;

    let order: &[Actuator] = if args.actuators.is_empty() {
        Actuator::ALL
    } else {
        &args.actuators
    };
    for &actuator in order {
        if let Some(&value) = values.get(&actuator) {
            output::print_line(&output::render_actuator(actuator, value, args.raw, ctx.color));
        }
    }
    Ok(())
}
