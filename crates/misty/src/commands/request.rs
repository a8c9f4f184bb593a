//! `misty request`: raw REST passthrough.

use crate::cli::RequestArgs;
use crate::commands::{Context, parse_json};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: RequestArgs, ctx: &Context) -> Result<(), CliError> {
    let body = args
        .body
        .as_deref()
        .map(|raw| parse_json("body", raw))
        .transpose()?;
    let rest = ctx.rest()?;

    let result = rest
        .request(args.method.into(), &args.path, body.as_ref())
        .await?;
    output::print_line(&output::render_json(&result)?);
    Ok(())
}
