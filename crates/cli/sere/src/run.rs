//! Run command implementation

use crate::{PipelineArgs, options, report};
use anyhow::Result;
use colored::Colorize;
use sr_interpreter::{Interpreter, RtValue};
use std::path::Path;
use std::process::ExitCode;

pub fn run(
    source: &Path,
    function: Option<&str>,
    args: &[i32],
    pipeline: &PipelineArgs,
) -> Result<ExitCode> {
    let options = options::resolve(source, pipeline)?;
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

    let module = &compilation.module;
    let mut interpreter = Interpreter::new(module);
    if let Some(name) = function {
        let args = args.iter().copied().map(RtValue::i32).collect();
        let result = interpreter.call(name, args)?;
        println!("{result}");
        return Ok(ExitCode::SUCCESS);
    }

    interpreter.run_entry()?;
    println!("{}", "Globals:".cyan().bold());
    for global in module.globals.iter().filter(|global| !global.constant) {
        let value = interpreter.global(&global.name)?;
        match interpreter.read_c_string(value) {
            Ok(text) if global.ty.is_ptr() => println!("  {} = {text:?}", global.name),
            _ => println!("  {} = {value}", global.name),
        }
    }
    Ok(ExitCode::SUCCESS)
}
