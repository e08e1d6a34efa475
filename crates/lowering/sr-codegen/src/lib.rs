//! Code generation: syntax tree → SSA module
//!
//! The generator walks the tree once, fail-fast: the first construct it cannot
//! lower aborts the unit with a [`CodegenError`]. Module-level statements go
//! into an implicit [`ENTRY_FUNCTION`]. Variables live in storage cells
//! (internal globals at module scope, entry-block allocas inside functions)
//! that are loaded on read and stored on write, so the builder never has to
//! rename values.

mod error;
mod generator;
mod names;
mod ops;

pub use error::CodegenError;
pub use generator::{Binding, CodeGenerator, DEFAULT_PARAMETER_TYPE};
pub use names::NameAllocator;
pub use sr_ssa::ENTRY_FUNCTION;

use sr_ssa::Module;
use sr_syntax::SyntaxNode;

/// Lowers `root` into a fresh module called `module_name`
pub fn generate(root: &SyntaxNode, module_name: &str) -> Result<Module, CodegenError> {
    CodeGenerator::new(module_name).generate(root)
}
