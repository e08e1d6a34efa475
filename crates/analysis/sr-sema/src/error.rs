//! Semantic error records

use miette::{Diagnostic, LabeledSpan, SourceSpan};
use serde::Serialize;
use sr_span::Span;
use std::fmt;
use thiserror::Error;

/// What went wrong
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticErrorKind {
    /// A name that no enclosing scope declares
    #[error("undefined identifier `{name}`")]
    UndefinedIdentifier {
        /// The unresolved name
        name: String,
        /// Visible names close to it
        suggestions: Vec<String>,
    },

    /// A second declaration of a name in one scope
    #[error("duplicate symbol `{name}` in scope `{scope}`")]
    DuplicateSymbol {
        /// The redeclared name
        name: String,
        /// The scope holding both declarations
        scope: String,
    },
}

/// One accumulated analysis error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemanticError {
    /// Error details
    #[serde(flatten)]
    pub kind: SemanticErrorKind,
    /// Offending source range
    pub span: Span,
    /// One-based line, when the source text was available
    pub line: Option<u32>,
    /// One-based column, when the source text was available
    pub column: Option<u32>,
}

impl SemanticError {
    /// Error message without location
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(formatter, "{line}:{column}: {}", self.kind),
            _ => write!(formatter, "{}", self.kind),
        }
    }
}

impl std::error::Error for SemanticError {}

impl Diagnostic for SemanticError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self.kind {
            SemanticErrorKind::UndefinedIdentifier { .. } => "sema::undefined_identifier",
            SemanticErrorKind::DuplicateSymbol { .. } => "sema::duplicate_symbol",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match &self.kind {
            SemanticErrorKind::UndefinedIdentifier { suggestions, .. }
                if !suggestions.is_empty() =>
            {
                let names: Vec<String> = suggestions
                    .iter()
                    .map(|name| format!("`{name}`"))
                    .collect();
                Some(Box::new(format!("did you mean {}?", names.join(" or "))))
            }
            _ => None,
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let label = match self.kind {
            SemanticErrorKind::UndefinedIdentifier { .. } => "not found in this scope",
            SemanticErrorKind::DuplicateSymbol { .. } => "already declared",
        };
        let span = SourceSpan::from(self.span.range());
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(label.to_string()),
            span,
        ))))
    }
}
