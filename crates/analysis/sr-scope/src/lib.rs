//! Scope-chained symbol table
//!
//! A [`ScopeTree`] owns every scope of one pass. Lookups walk from the
//! current scope towards the root and never fail loudly; declarations are
//! unique per scope. The analyzer and the code generator each build their own
//! tree, seeded by [`builtins::seed`].

pub mod builtins;
mod error;
mod scope;
mod symbol;

pub use error::{ScopeError, suggestions};
pub use scope::{Scope, ScopeId, ScopeTree};
pub use symbol::{ANY, AUTO, Field, Literal, Symbol, SymbolKind};
