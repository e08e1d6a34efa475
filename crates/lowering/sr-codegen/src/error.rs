//! Code generation faults

use sr_scope::ScopeError;
use sr_ssa::BuildError;
use sr_syntax::SyntaxKind;
use thiserror::Error;

/// Errors that abort code generation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// Augmented assignment to a name without storage
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    /// A name that resolves to nothing usable as a value
    #[error("undefined reference to `{0}`")]
    UndefinedReference(String),

    /// An annotation naming no known type
    #[error("unknown type `{0}`")]
    UnknownType(String),

    /// A type that resolves but has no machine representation
    #[error("type `{0}` has no machine representation")]
    Unrepresentable(String),

    /// An operator the generator cannot lower for these operands
    #[error("unsupported operator {0}")]
    UnsupportedOperator(String),

    /// A construct that parses but is not lowered
    #[error("{0} is not implemented")]
    Unimplemented(String),

    /// A malformed or unresolved field access
    #[error("invalid field access: {0}")]
    Field(ScopeError),

    /// A value whose type does not fit where it is used
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        /// Required type
        expected: String,
        /// Actual type
        found: String,
    },

    /// A call with the wrong number of arguments
    #[error("`{callee}` takes {expected} arguments but {found} were given")]
    Arity {
        /// Called function or class
        callee: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
    },

    /// Assigning to a function, class, type or constant
    #[error("cannot assign to `{0}`")]
    NotAssignable(String),

    /// A node missing the children its production requires
    #[error("malformed `{0:?}` node")]
    Malformed(SyntaxKind),

    /// Calling something that is neither a function nor a class
    #[error("`{0}` is not callable")]
    NotCallable(String),

    /// A reference to a local variable of an enclosing function
    #[error("`{0}` belongs to an enclosing function; closures are not supported")]
    Capture(String),

    /// `break` or `continue` outside a loop
    #[error("`{0}` outside of a loop")]
    OutsideLoop(&'static str),

    /// A numeric literal that does not fit its type
    #[error("invalid numeric literal `{0}`")]
    InvalidLiteral(String),

    /// A second declaration of a name in one scope
    #[error("duplicate symbol `{name}` in scope `{scope}`")]
    DuplicateSymbol {
        /// The redeclared name
        name: String,
        /// The scope already holding it
        scope: String,
    },

    /// IR construction failed
    #[error(transparent)]
    Builder(#[from] BuildError),
}

impl From<ScopeError> for CodegenError {
    fn from(error: ScopeError) -> Self {
        match error {
            ScopeError::DuplicateSymbol { name, scope } => Self::DuplicateSymbol { name, scope },
            other => Self::Field(other),
        }
    }
}

impl CodegenError {
    pub(crate) fn mismatch(expected: impl ToString, found: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
