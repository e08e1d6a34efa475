//! Compilation driver
//!
//! Runs the pipeline parse → analyze → gate → generate → verify over one
//! source text. The analyze and generate halves are exposed separately so a
//! caller can report semantic errors before generation starts. The IR is
//! turned into an artifact by a [`Backend`].

pub mod backend;
pub mod config;

pub use backend::{Artifact, ArtifactRequest, Backend, LlcBackend, TextBackend, backend_for};
pub use config::{CONFIG_FILE, CompileOptions, SemanticGate, Target};

use miette::Diagnostic;
use sr_codegen::CodegenError;
use sr_parser::ParseError;
use sr_sema::SemanticError;
use sr_ssa::{Module, VerifyError};
use sr_syntax::SyntaxNode;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A pipeline failure
#[derive(Debug, Error, Diagnostic)]
pub enum DriverError {
    /// The source is not syntactically valid
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    /// Analysis found errors and the gate is set to abort
    #[error("{} semantic error(s); code generation skipped", .errors.len())]
    #[diagnostic(code(driver::semantic_gate))]
    SemanticGate {
        /// Every error the analyzer reported
        #[related]
        errors: Vec<SemanticError>,
    },

    /// The generator hit a construct it cannot lower
    #[error("code generation failed: {0}")]
    #[diagnostic(code(driver::codegen))]
    Codegen(#[from] CodegenError),

    /// The generated module is structurally invalid
    #[error("generated module failed verification: {0}")]
    #[diagnostic(code(driver::verify))]
    Verify(#[from] VerifyError),
}

/// A parsed and analyzed source, ready for generation
#[derive(Debug, Clone)]
pub struct Analyzed {
    /// Syntax tree of the whole unit
    pub tree: SyntaxNode,
    /// Errors found by the analyzer, in source order
    pub diagnostics: Vec<SemanticError>,
}

/// Output of a successful compilation
#[derive(Debug, Clone)]
pub struct Compilation {
    /// Generated module
    pub module: Module,
    /// The module printed as LLVM assembly
    pub ir: String,
    /// Semantic errors that did not stop the pipeline
    pub diagnostics: Vec<SemanticError>,
}

/// Parses and analyzes `source`
///
/// # Errors
/// Returns `DriverError::Parse` if the source does not parse
pub fn analyze_source(source: &str, options: &CompileOptions) -> Result<Analyzed, DriverError> {
    let tree = sr_parser::parse_named_source(&options.source_name, source)?;
    let analysis = sr_sema::analyze(&tree, source);
    for error in &analysis.errors {
        warn!(%error, "semantic error");
    }
    debug!(errors = analysis.errors.len(), "analyzed");
    Ok(Analyzed {
        tree,
        diagnostics: analysis.errors,
    })
}

/// Parses and analyzes `source`, returning only the semantic errors
///
/// # Errors
/// Returns `DriverError::Parse` if the source does not parse
pub fn check_source(
    source: &str,
    options: &CompileOptions,
) -> Result<Vec<SemanticError>, DriverError> {
    analyze_source(source, options).map(|analyzed| analyzed.diagnostics)
}

/// Applies the semantic gate, then generates and verifies the module
///
/// # Errors
/// Returns `DriverError::SemanticGate` when the gate aborts, otherwise the
/// first generation or verification failure
pub fn generate(analyzed: Analyzed, options: &CompileOptions) -> Result<Compilation, DriverError> {
    let Analyzed { tree, diagnostics } = analyzed;
    if !diagnostics.is_empty() && options.semantic_gate == SemanticGate::Abort {
        return Err(DriverError::SemanticGate {
            errors: diagnostics,
        });
    }

    let module = sr_codegen::generate(&tree, &options.module_name)?;
    if options.verify {
        sr_ssa::verify_module(&module)?;
    }
    let ir = module.to_string();
    info!(
        module = %options.module_name,
        functions = module.functions.len(),
        globals = module.globals.len(),
        "compiled"
    );

    Ok(Compilation {
        module,
        ir,
        diagnostics,
    })
}

/// Compiles `source` to an SSA module and its IR text
///
/// # Errors
/// Returns a `DriverError` for the first stage that fails
#[tracing::instrument(level = "debug", skip(source, options), fields(name = %options.source_name))]
pub fn compile_source(source: &str, options: &CompileOptions) -> Result<Compilation, DriverError> {
    let analyzed = analyze_source(source, options)?;
    generate(analyzed, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: &str = "def add(a: int, b: int) -> int:\n    return a + b\nx = add(2, 3)\n";

    #[test]
    fn test_compiles_clean_source() {
        let compilation = compile_source(ADD, &CompileOptions::default()).unwrap();
        assert!(compilation.diagnostics.is_empty());
        assert!(compilation.module.function_by_name("add").is_some());
        assert!(compilation.ir.contains("define i32 @add(i32 %a, i32 %b)"));
        assert!(compilation.ir.contains("@x = internal global i32 0"));
    }

    #[test]
    fn test_gate_proceeds_by_default() {
        let errors = check_source("x = y\n", &CompileOptions::default()).unwrap();
        assert_eq!(errors.len(), 1);

        let compilation = compile_source("x = 1\ndel x\n", &CompileOptions::default());
        assert!(matches!(compilation, Err(DriverError::Codegen(_))));
    }

    #[test]
    fn test_gate_aborts_when_strict() {
        let options = CompileOptions {
            semantic_gate: SemanticGate::Abort,
            ..CompileOptions::default()
        };
        let result = compile_source("x = y\n", &options);
        let Err(DriverError::SemanticGate { errors }) = result else {
            panic!("expected the gate to stop the pipeline");
        };
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("`y`"));
    }

    #[test]
    fn test_errors_pass_through_when_proceeding() {
        let result = compile_source("x = 1\ny = x + z\n", &CompileOptions::default());
        assert!(matches!(result, Err(DriverError::Codegen(CodegenError::UndefinedReference(_)))));
    }

    #[test]
    fn test_diagnostics_survive_generation() {
        let options = CompileOptions::default();
        let analyzed = analyze_source("x = 1\nundefined_name\n", &options);
        let analyzed = analyzed.unwrap();
        assert_eq!(analyzed.diagnostics.len(), 1);
        let compilation = generate(analyzed, &options);
        assert!(matches!(compilation, Err(DriverError::Codegen(_))));
    }

    #[test]
    fn test_parse_errors() {
        let result = compile_source("def (:\n", &CompileOptions::default());
        assert!(matches!(result, Err(DriverError::Parse(_))));
    }

    #[test]
    fn test_module_name_is_used() {
        let options = CompileOptions {
            module_name: "demo".to_string(),
            ..CompileOptions::default()
        };
        let compilation = compile_source("x = 1\n", &options).unwrap();
        assert_eq!(compilation.module.name, "demo");
    }
}
