//! Integration test utilities for the Sere compiler
//!
//! Programs under `test-programs/` carry their expected results in header
//! comments of the form `# expect: name = value`. [`Program::check`] compiles
//! the file through the driver, runs its top-level code with the interpreter
//! and compares every named global against the rendered expectation.

use anyhow::{Context, Result, bail};
use sr_driver::{Compilation, CompileOptions};
use sr_interpreter::{Interpreter, RtValue};
use sr_ssa::Module;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of an expectation line
const EXPECT: &str = "# expect:";

/// A test program and the global values it should leave behind
#[derive(Debug, Clone)]
pub struct Program {
    /// Where the program was loaded from
    pub path: PathBuf,
    /// Source text
    pub source: String,
    /// `(global, rendered value)` pairs in header order
    pub expectations: Vec<(String, String)>,
}

impl Program {
    /// Parses the expectations out of `source`
    ///
    /// # Errors
    ///
    /// Returns an error if an expectation line has no `=`
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let mut expectations = Vec::new();
        for line in source.lines() {
            let Some(rest) = line.strip_prefix(EXPECT) else {
                continue;
            };
            let (name, value) = rest
                .split_once('=')
                .with_context(|| format!("Malformed expectation: {line}"))?;
            expectations.push((name.trim().to_string(), value.trim().to_string()));
        }
        Ok(Self {
            path: path.into(),
            source,
            expectations,
        })
    }

    /// Loads a program file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::new(path, source)
    }

    /// Compiles and runs the program, then checks every expectation
    ///
    /// # Errors
    ///
    /// Returns an error describing the first stage that failed or the first
    /// global whose value differs
    pub fn check(&self) -> Result<()> {
        let compilation = compile(&self.source)
            .with_context(|| format!("Failed to compile {}", self.path.display()))?;
        let globals = run_globals(&compilation.module)?;
        for (name, expected) in &self.expectations {
            let Some((_, actual)) = globals.iter().find(|(global, _)| global == name) else {
                bail!("{}: no global named `{name}`", self.path.display());
            };
            if actual != expected {
                bail!(
                    "{}: `{name}` is {actual}, expected {expected}",
                    self.path.display()
                );
            }
        }
        Ok(())
    }
}

/// Every program in `dir`, sorted by file name
///
/// # Errors
///
/// Returns an error if the directory or a program cannot be read
pub fn programs_in(dir: &Path) -> Result<Vec<Program>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "sr") {
            paths.push(path);
        }
    }
    paths.sort();
    paths.iter().map(|path| Program::load(path)).collect()
}

/// The bundled `test-programs` directory
pub fn test_programs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test-programs")
}

/// Compiles `source` with default options
///
/// # Errors
///
/// Returns the driver's error for the first failing stage
pub fn compile(source: &str) -> Result<Compilation> {
    Ok(sr_driver::compile_source(source, &CompileOptions::default())?)
}

/// Runs the module's top-level code and renders every mutable global.
///
/// Pointers to byte strings render as quoted strings, everything else
/// through the value's `Display`.
///
/// # Errors
///
/// Returns an error if execution fails
pub fn run_globals(module: &Module) -> Result<Vec<(String, String)>> {
    let mut interpreter = Interpreter::new(module);
    interpreter.run_entry()?;
    let mut globals = Vec::new();
    for global in module.globals.iter().filter(|global| !global.constant) {
        let value = interpreter.global(&global.name)?;
        let rendered = match (global.ty.is_ptr(), interpreter.read_c_string(value)) {
            (true, Ok(text)) => format!("{text:?}"),
            _ => value.to_string(),
        };
        globals.push((global.name.clone(), rendered));
    }
    Ok(globals)
}

/// Compiles `source` and calls `function` with integer arguments
///
/// # Errors
///
/// Returns an error if compilation or execution fails
pub fn call(source: &str, function: &str, args: &[i32]) -> Result<RtValue> {
    let compilation = compile(source)?;
    let mut interpreter = Interpreter::new(&compilation.module);
    let args = args.iter().copied().map(RtValue::i32).collect();
    Ok(interpreter.call(function, args)?)
}
