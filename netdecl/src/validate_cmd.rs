use anyhow::{bail, Result};
use netdecl::context::EngineContext;
use netdecl::error::Diagnostic;
use serde::Serialize;

use crate::cli::{OutputFormat, ValidateArgs};
use crate::report::{render_error, render_ok};

#[derive(Debug, Serialize)]
struct ValidateReport {
    valid: bool,
    devices: usize,
    error: Option<Diagnostic>,
}

pub fn run_validate(ctx: &EngineContext, args: ValidateArgs) -> Result<()> {
    let outcome = crate::load_state(ctx);
    let report = match &outcome {
        Ok(state) => ValidateReport {
            valid: true,
            devices: state.len(),
            error: None,
        },
        Err(err) => ValidateReport {
            valid: false,
            devices: 0,
            error: Some(Diagnostic::from(err)),
        },
    };

    match args.format {
        OutputFormat::Text => match &outcome {
            Ok(_) => println!("{}", render_ok(&format!("{} devices", report.devices))),
            Err(err) => eprintln!("{}", render_error(err)),
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if !report.valid {
        bail!("validation failed");
    }
    Ok(())
}
