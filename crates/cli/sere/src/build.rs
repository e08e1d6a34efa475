//! Build command implementation

use crate::{PipelineArgs, options, report};
use anyhow::Result;
use colored::Colorize;
use sr_driver::{ArtifactRequest, Target};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

pub fn build(
    source: &Path,
    output: Option<PathBuf>,
    target: Option<Target>,
    opt_level: Option<u8>,
    pipeline: &PipelineArgs,
) -> Result<ExitCode> {
    let start = Instant::now();
    let mut options = options::resolve(source, pipeline)?;
    if let Some(target) = target {
        options.target = target;
    }
    if let Some(opt_level) = opt_level {
        options.opt_level = opt_level;
    }

    println!("{} {}", "Compiling".green().bold(), source.display());
    let text = options::read_source(source)?;

    let analyzed = match sr_driver::analyze_source(&text, &options) {
        Ok(analyzed) => analyzed,
        Err(error) => {
            report::driver_error(error, &options, &text);
            return Ok(ExitCode::FAILURE);
        }
    };
    report::semantic_errors(&analyzed.diagnostics, &options, &text);

    let compilation = match sr_driver::generate(analyzed, &options) {
        Ok(compilation) => compilation,
        Err(error) => {
            report::driver_error(error, &options, &text);
            return Ok(ExitCode::FAILURE);
        }
    };

    let request = ArtifactRequest {
        target: options.target,
        opt_level: options.opt_level,
        basename: output.unwrap_or_else(|| source.with_extension("")),
    };
    let artifact = sr_driver::backend_for(options.target).emit(&compilation.ir, &request)?;

    println!(
        "  {} {} ({}, -O{})",
        "Wrote".bold(),
        artifact.path.display(),
        artifact.target,
        options.opt_level
    );
    println!(
        "  {} in {:.2}s",
        "Finished".green().bold(),
        start.elapsed().as_secs_f64()
    );
    Ok(ExitCode::SUCCESS)
}
