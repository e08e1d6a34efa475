//! Check command implementation

use crate::{PipelineArgs, options, report};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;

pub fn check(source: &Path, json: bool) -> Result<ExitCode> {
    let options = options::resolve(source, &PipelineArgs::default())?;
    let text = options::read_source(source)?;

    let errors = match sr_driver::check_source(&text, &options) {
        Ok(errors) => errors,
        Err(error) => {
            report::driver_error(error, &options, &text);
            return Ok(ExitCode::FAILURE);
        }
    };

    if json {
        let rendered =
            serde_json::to_string_pretty(&errors).context("Failed to serialize errors")?;
        println!("{rendered}");
    } else if errors.is_empty() {
        println!("{} No errors found in {}", "Success:".green().bold(), source.display());
    } else {
        report::semantic_errors(&errors, &options, &text);
    }

    Ok(if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
