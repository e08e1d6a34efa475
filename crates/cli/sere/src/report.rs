//! Diagnostic rendering

use colored::Colorize;
use miette::{NamedSource, Report};
use sr_driver::{CompileOptions, DriverError};
use sr_sema::SemanticError;

fn source_code(options: &CompileOptions, source: &str) -> NamedSource<String> {
    NamedSource::new(&options.source_name, source.to_string())
}

/// Prints each semantic error with its source snippet
pub fn semantic_errors(errors: &[SemanticError], options: &CompileOptions, source: &str) {
    for error in errors {
        let report = Report::new(error.clone()).with_source_code(source_code(options, source));
        eprintln!("{report:?}");
    }
    if !errors.is_empty() {
        eprintln!(
            "{} {} semantic error(s) in {}",
            "Found".yellow().bold(),
            errors.len(),
            options.source_name
        );
    }
}

/// Prints a pipeline failure
pub fn driver_error(error: DriverError, options: &CompileOptions, source: &str) {
    let report = match error {
        DriverError::Parse(error) => Report::new(error),
        other => Report::new(other).with_source_code(source_code(options, source)),
    };
    eprintln!("{report:?}");
}
