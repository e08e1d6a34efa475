//! Rich error reporting for the parser
//!
//! Note: These struct fields are read by miette's `#[derive(Diagnostic)]` macro
//! for rich error output, which the unused-assignment lint cannot see through.

#![allow(unused_assignments, reason = "fields are read by the miette derive")]

use miette::{Diagnostic, NamedSource, SourceSpan};
use sr_span::Span;
use thiserror::Error;

/// Parse error with rich diagnostic information
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum ParseError {
    /// A token that does not fit the grammar at this point
    #[error("expected {expected}, found `{found}`")]
    #[diagnostic(code(parser::unexpected_token))]
    UnexpectedToken {
        /// What the grammar expected
        expected: String,
        /// What was actually found
        found: String,
        /// Source location
        #[label("unexpected `{found}`")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: NamedSource<String>,
    },

    /// A character that starts no token
    #[error("unexpected character `{character}`")]
    #[diagnostic(code(parser::unexpected_character))]
    UnexpectedCharacter {
        /// Offending character
        character: char,
        /// Source location
        #[label("not valid here")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: NamedSource<String>,
    },

    /// String literal without closing quote
    #[error("unterminated string literal")]
    #[diagnostic(code(parser::unterminated_string), help("close the string with a matching quote"))]
    UnterminatedString {
        /// Location of the opening quote
        #[label("string starts here")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: NamedSource<String>,
    },

    /// Dedent to a column that matches no enclosing block
    #[error("unindent does not match any outer indentation level")]
    #[diagnostic(code(parser::inconsistent_dedent))]
    InconsistentDedent {
        /// Start of the offending line
        #[label("this line")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: NamedSource<String>,
    },

    /// Unclosed delimiter
    #[error("this file contains an unclosed delimiter")]
    #[diagnostic(code(parser::unclosed_delimiter))]
    UnclosedDelimiter {
        /// The opening character
        opening_char: char,
        /// Opening delimiter location
        #[label("unclosed `{opening_char}`")]
        opening: SourceSpan,
        /// Source code for context
        #[source_code]
        src: NamedSource<String>,
    },

    /// Syntax accepted by the lexer that the grammar does not support
    #[error("invalid {construct}")]
    #[diagnostic(code(parser::invalid_syntax))]
    InvalidSyntax {
        /// Type of construct (e.g. "parameter", "call argument")
        construct: String,
        /// Detailed explanation
        #[help]
        suggestion: Option<String>,
        /// Source location
        #[label("{construct} is invalid")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: NamedSource<String>,
    },
}

impl ParseError {
    /// Byte span of the primary label
    pub fn span(&self) -> Span {
        let source_span = match self {
            Self::UnexpectedToken { span, .. }
            | Self::UnexpectedCharacter { span, .. }
            | Self::UnterminatedString { span, .. }
            | Self::InconsistentDedent { span, .. }
            | Self::InvalidSyntax { span, .. } => span,
            Self::UnclosedDelimiter { opening, .. } => opening,
        };
        let start = source_span.offset() as u32;
        Span::new(start, start + source_span.len() as u32)
    }
}

/// Builds errors that all point into one named source
#[derive(Debug, Clone)]
pub(crate) struct ErrorSource {
    src: NamedSource<String>,
}

impl ErrorSource {
    pub(crate) fn new(name: &str, source: &str) -> Self {
        Self {
            src: NamedSource::new(name, source.to_string()),
        }
    }

    fn src(&self) -> NamedSource<String> {
        self.src.clone()
    }

    pub(crate) fn unexpected_token(
        &self,
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span: to_source_span(span),
            src: self.src(),
        }
    }

    pub(crate) fn unexpected_character(&self, character: char, span: Span) -> ParseError {
        ParseError::UnexpectedCharacter {
            character,
            span: to_source_span(span),
            src: self.src(),
        }
    }

    pub(crate) fn unterminated_string(&self, span: Span) -> ParseError {
        ParseError::UnterminatedString {
            span: to_source_span(span),
            src: self.src(),
        }
    }

    pub(crate) fn inconsistent_dedent(&self, span: Span) -> ParseError {
        ParseError::InconsistentDedent {
            span: to_source_span(span),
            src: self.src(),
        }
    }

    pub(crate) fn unclosed_delimiter(&self, opening_char: char, span: Span) -> ParseError {
        ParseError::UnclosedDelimiter {
            opening_char,
            opening: to_source_span(span),
            src: self.src(),
        }
    }

    pub(crate) fn invalid_syntax(
        &self,
        construct: impl Into<String>,
        suggestion: Option<&str>,
        span: Span,
    ) -> ParseError {
        ParseError::InvalidSyntax {
            construct: construct.into(),
            suggestion: suggestion.map(str::to_string),
            span: to_source_span(span),
            src: self.src(),
        }
    }
}

fn to_source_span(span: Span) -> SourceSpan {
    (span.start as usize, span.len() as usize).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reports_primary_span() {
        let errors = ErrorSource::new("test.sr", "x = (1");
        let err = errors.unclosed_delimiter('(', Span::new(4, 5));
        assert_eq!(err.span(), Span::new(4, 5));
        assert_eq!(err.to_string(), "this file contains an unclosed delimiter");
    }

    #[test]
    fn test_unexpected_token_message() {
        let errors = ErrorSource::new("test.sr", "def (");
        let err = errors.unexpected_token("function name", "(", Span::new(4, 5));
        assert_eq!(err.to_string(), "expected function name, found `(`");
    }
}
