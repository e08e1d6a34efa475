//! Tokenizer with significant indentation
//!
//! Produces a flat token vector. Leading whitespace of each logical line is
//! turned into `Indent`/`Dedent` tokens through an indentation stack; blank and
//! comment-only lines produce nothing, and newlines inside brackets are
//! ignored so expressions can span lines.

use crate::error::{ErrorSource, ParseError};
use sr_span::Span;
use std::fmt;

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword
    Name,
    /// Numeric literal
    Number,
    /// String literal, quotes included
    Str,
    /// Operator or delimiter
    Op,
    /// End of a logical line
    Newline,
    /// Indentation increased
    Indent,
    /// Indentation decreased by one level
    Dedent,
    /// End of input
    Eof,
}

/// A token with its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Category
    pub kind: TokenKind,
    /// Exact source text; empty for layout tokens
    pub text: String,
    /// Source location
    pub span: Span,
}

impl Token {
    /// Whether this is the operator or keyword `text`
    pub fn is(&self, text: &str) -> bool {
        matches!(self.kind, TokenKind::Op | TokenKind::Name) && self.text == text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Newline => formatter.write_str("newline"),
            TokenKind::Indent => formatter.write_str("indent"),
            TokenKind::Dedent => formatter.write_str("dedent"),
            TokenKind::Eof => formatter.write_str("end of file"),
            _ => formatter.write_str(&self.text),
        }
    }
}

/// Reserved words that can never be identifiers
pub const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "fn", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Whether `text` is a reserved word
pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

/// Operators, longest first so the first prefix match wins
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "->", "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "<>",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", ":=", "+", "-", "*", "/", "%", "@",
    "&", "|", "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

const TAB_WIDTH: usize = 8;

/// Tokenizes `source`
pub(crate) fn tokenize(source: &str, errors: &ErrorSource) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source, errors).run()
}

struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    /// Open brackets with their positions; indentation is ignored while non-empty
    brackets: Vec<(char, usize)>,
    errors: &'src ErrorSource,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str, errors: &'src ErrorSource) -> Self {
        Self {
            source,
            pos: 0,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
            errors,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut at_line_start = true;
        while self.pos < self.source.len() {
            if at_line_start && self.brackets.is_empty() {
                if self.line_indentation()? {
                    continue;
                }
                at_line_start = false;
            }

            let current = self.first();
            match current {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '\\' if self.second() == '\n' => self.pos += 2,
                '\\' if self.second() == '\r' && self.third() == '\n' => self.pos += 3,
                '#' => self.skip_comment(),
                '\n' => {
                    self.pos += 1;
                    if self.brackets.is_empty() {
                        self.push_layout(TokenKind::Newline, self.pos - 1);
                        at_line_start = true;
                    }
                }
                '"' | '\'' => self.string(current)?,
                digit if digit.is_ascii_digit() => self.number(),
                '.' if self.second().is_ascii_digit() => self.number(),
                start if is_id_start(start) => self.identifier(),
                _ => self.operator(current)?,
            }
        }

        if let Some(&(opening, offset)) = self.brackets.last() {
            return Err(self
                .errors
                .unclosed_delimiter(opening, Span::new(offset as u32, offset as u32 + 1)));
        }

        let end = self.source.len();
        if self
            .tokens
            .last()
            .is_some_and(|token| token.kind != TokenKind::Newline)
        {
            self.push_layout(TokenKind::Newline, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_layout(TokenKind::Dedent, end);
        }
        self.push_layout(TokenKind::Eof, end);
        Ok(self.tokens)
    }

    /// Measures the indentation of the line at `pos`.
    ///
    /// Returns `true` when the line was blank or comment-only and has been
    /// skipped entirely.
    fn line_indentation(&mut self) -> Result<bool, ParseError> {
        let line_start = self.pos;
        let mut width = 0;
        while self.pos < self.source.len() {
            match self.first() {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.first() {
            '#' => {
                self.skip_comment();
                if self.first() == '\n' {
                    self.pos += 1;
                }
                return Ok(true);
            }
            '\n' => {
                self.pos += 1;
                return Ok(true);
            }
            '\r' if self.second() == '\n' => {
                self.pos += 2;
                return Ok(true);
            }
            _ if self.pos >= self.source.len() => return Ok(true),
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push_layout(TokenKind::Indent, self.pos);
        } else if width < current {
            while self.indents.last().is_some_and(|&level| level > width) {
                self.indents.pop();
                self.push_layout(TokenKind::Dedent, self.pos);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(self.errors.inconsistent_dedent(Span::new(
                    line_start as u32,
                    self.pos.max(line_start + 1) as u32,
                )));
            }
        }
        Ok(false)
    }

    fn first(&self) -> char {
        self.rest().chars().next().unwrap_or('\0')
    }

    fn second(&self) -> char {
        self.rest().chars().nth(1).unwrap_or('\0')
    }

    fn third(&self) -> char {
        self.rest().chars().nth(2).unwrap_or('\0')
    }

    fn rest(&self) -> &'src str {
        self.source.get(self.pos..).unwrap_or_default()
    }

    fn eat_while(&mut self, predicate: impl Fn(char) -> bool) {
        let consumed: usize = self
            .rest()
            .chars()
            .take_while(|&character| predicate(character))
            .map(char::len_utf8)
            .sum();
        self.pos += consumed;
    }

    fn skip_comment(&mut self) {
        self.eat_while(|character| character != '\n');
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let text = self.source.get(start..self.pos).unwrap_or_default().to_string();
        self.tokens.push(Token {
            kind,
            text,
            span: Span::new(start as u32, self.pos as u32),
        });
    }

    fn push_layout(&mut self, kind: TokenKind, at: usize) {
        self.tokens.push(Token {
            kind,
            text: String::new(),
            span: Span::new(at as u32, at as u32),
        });
    }

    fn identifier(&mut self) {
        let start = self.pos;
        self.eat_while(is_id_continue);
        self.push(TokenKind::Name, start);
    }

    fn number(&mut self) {
        let start = self.pos;
        let digits = |character: char| character.is_ascii_digit() || character == '_';
        self.eat_while(digits);
        if self.first() == '.' && self.second() != '.' {
            self.pos += 1;
            self.eat_while(digits);
        }
        if matches!(self.first(), 'e' | 'E')
            && (self.second().is_ascii_digit()
                || (matches!(self.second(), '+' | '-') && self.third().is_ascii_digit()))
        {
            self.pos += 2;
            self.eat_while(digits);
        }
        self.push(TokenKind::Number, start);
    }

    fn string(&mut self, quote: char) -> Result<(), ParseError> {
        let start = self.pos;
        let triple = self.second() == quote && self.third() == quote;
        self.pos += if triple { 3 } else { 1 };

        loop {
            let current = self.first();
            if self.pos >= self.source.len() || (current == '\n' && !triple) {
                return Err(self
                    .errors
                    .unterminated_string(Span::new(start as u32, start as u32 + 1)));
            }
            if current == '\\' {
                self.pos += 1;
                self.pos += self.first().len_utf8();
                continue;
            }
            if current == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.second() == quote && self.third() == quote {
                    self.pos += 3;
                    break;
                }
            }
            self.pos += current.len_utf8();
        }

        self.push(TokenKind::Str, start);
        Ok(())
    }

    fn operator(&mut self, current: char) -> Result<(), ParseError> {
        let start = self.pos;
        let Some(operator) = OPERATORS
            .iter()
            .find(|operator| self.rest().starts_with(**operator))
        else {
            let span = Span::new(start as u32, (start + current.len_utf8()) as u32);
            return Err(self.errors.unexpected_character(current, span));
        };
        self.pos += operator.len();

        match current {
            '(' | '[' | '{' => self.brackets.push((current, start)),
            ')' | ']' | '}' => {
                let expected = match current {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    Some((opening, _)) if opening == expected => {}
                    _ => {
                        let span = Span::new(start as u32, self.pos as u32);
                        return Err(self.errors.unexpected_character(current, span));
                    }
                }
            }
            _ => {}
        }

        self.push(TokenKind::Op, start);
        Ok(())
    }
}

fn is_id_start(character: char) -> bool {
    character == '_' || character.is_alphabetic()
}

fn is_id_continue(character: char) -> bool {
    character == '_' || character.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let errors = ErrorSource::new("test", source);
        tokenize(source, &errors)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    fn texts(source: &str) -> Vec<String> {
        let errors = ErrorSource::new("test", source);
        tokenize(source, &errors)
            .unwrap()
            .into_iter()
            .filter(|token| !token.text.is_empty())
            .map(|token| token.text)
            .collect()
    }

    #[test]
    fn test_indent_and_dedent() {
        use TokenKind::*;
        assert_eq!(
            kinds("if x:\n    y\nz\n"),
            vec![Name, Name, Op, Newline, Indent, Name, Newline, Dedent, Name, Newline, Eof]
        );
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        use TokenKind::*;
        assert_eq!(
            kinds("x\n\n   # note\n\ny"),
            vec![Name, Newline, Name, Newline, Eof]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        assert_eq!(texts("f(1,\n  2)\n"), ["f", "(", "1", ",", "2", ")"]);
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(texts("a //= b ** c -> d"), ["a", "//=", "b", "**", "c", "->", "d"]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(texts("1_000 3.25 .5 2e10"), ["1_000", "3.25", ".5", "2e10"]);
    }

    #[test]
    fn test_strings_keep_quotes() {
        assert_eq!(texts(r#"'a' "b\"c" """d""""#), ["'a'", r#""b\"c""#, r#""""d""""#]);
    }

    #[test]
    fn test_unterminated_string() {
        let errors = ErrorSource::new("test", "x = 'abc\n");
        let err = tokenize("x = 'abc\n", &errors).unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedString { .. }));
    }

    #[test]
    fn test_inconsistent_dedent() {
        let source = "if x:\n    y\n  z\n";
        let errors = ErrorSource::new("test", source);
        let err = tokenize(source, &errors).unwrap_err();
        assert!(matches!(err, ParseError::InconsistentDedent { .. }));
    }

    #[test]
    fn test_unclosed_bracket() {
        let errors = ErrorSource::new("test", "f(1, 2");
        let err = tokenize("f(1, 2", &errors).unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnclosedDelimiter {
                opening_char: '(',
                ..
            }
        ));
    }
}
