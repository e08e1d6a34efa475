//! Syntax tree for Sere source files
//!
//! The tree is a generic node shape (kind, text, span, ordered children) over a
//! closed set of grammar productions. Each production gets typed accessors so
//! passes can read their operands by role instead of by child index, and the
//! [`walk`] function drives enter/exit hooks over the whole tree.

mod node;
mod walk;

pub use node::{ExprStmtForm, IfBranch};
pub use walk::{Visitor, walk};

use serde::{Deserialize, Serialize};
use sr_span::Span;
use std::fmt;

/// Generic syntax tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    /// The production this node was built from
    pub kind: SyntaxKind,
    /// Source location
    pub span: Span,
    /// Node text.
    ///
    /// Concatenated token text for most nodes, the defined name for
    /// definitions (`FuncDef`, `Param`, `ClassDef`, `Attribute`) and the
    /// operator for operator nodes (`BinOp`, `Unary`, `AugAssign`, `CompOp`).
    pub text: String,
    /// Child nodes in source order
    pub children: Vec<SyntaxNode>,
}

/// Grammar productions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyntaxKind {
    /// Whole source file; children are statements
    FileInput,
    /// Function definition
    FuncDef,
    /// Parameter list of a function definition
    Parameters,
    /// Single (optionally annotated) parameter
    Param,
    /// Class definition
    ClassDef,
    /// Indented block of statements
    Suite,
    /// Expression statement, possibly an assignment
    ExprStmt,
    /// Comma separated expressions
    TestList,
    /// `: Type [= value]` part of an annotated assignment
    AnnAssign,
    /// `OP= value` part of an augmented assignment
    AugAssign,
    /// `return [value]`
    Return,
    /// `pass`
    Pass,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `if`/`elif`/`else` chain
    If,
    /// `while` loop
    While,
    /// `for` loop
    For,
    /// `del` statement
    Del,
    /// `global` declaration
    Global,
    /// `nonlocal` declaration
    Nonlocal,
    /// `assert` statement
    Assert,
    /// `import` statement
    Import,
    /// Conditional expression `A if C else B`
    IfExpr,
    /// Lambda expression
    Lambda,
    /// `or` chain
    Or,
    /// `and` chain
    And,
    /// `not` prefix
    Not,
    /// Comparison chain
    Comparison,
    /// Comparison operator inside a [`SyntaxKind::Comparison`]
    CompOp,
    /// Binary arithmetic or bitwise operation
    BinOp,
    /// Unary `+`, `-` or `~`
    Unary,
    /// Exponentiation
    Power,
    /// Primary expression followed by trailers
    AtomExpr,
    /// Call trailer
    Call,
    /// Attribute trailer
    Attribute,
    /// Subscript trailer
    Subscript,
    /// Identifier reference
    Name,
    /// Numeric literal
    Number,
    /// One or more adjacent string literals
    Str,
    /// Single string token inside a [`SyntaxKind::Str`]
    StrPart,
    /// `...`
    Ellipsis,
    /// Tuple display
    Tuple,
    /// List display
    List,
    /// Dictionary display
    Dict,
    /// Set display
    Set,
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FileInput => "file_input",
            Self::FuncDef => "funcdef",
            Self::Parameters => "parameters",
            Self::Param => "param",
            Self::ClassDef => "classdef",
            Self::Suite => "suite",
            Self::ExprStmt => "expr_stmt",
            Self::TestList => "testlist",
            Self::AnnAssign => "annassign",
            Self::AugAssign => "augassign",
            Self::Return => "return_stmt",
            Self::Pass => "pass_stmt",
            Self::Break => "break_stmt",
            Self::Continue => "continue_stmt",
            Self::If => "if_stmt",
            Self::While => "while_stmt",
            Self::For => "for_stmt",
            Self::Del => "del_stmt",
            Self::Global => "global_stmt",
            Self::Nonlocal => "nonlocal_stmt",
            Self::Assert => "assert_stmt",
            Self::Import => "import_stmt",
            Self::IfExpr => "conditional expression",
            Self::Lambda => "lambdef",
            Self::Or => "or_test",
            Self::And => "and_test",
            Self::Not => "not_test",
            Self::Comparison => "comparison",
            Self::CompOp => "comp_op",
            Self::BinOp => "binary operation",
            Self::Unary => "factor",
            Self::Power => "power",
            Self::AtomExpr => "atom_expr",
            Self::Call => "call",
            Self::Attribute => "attribute",
            Self::Subscript => "subscript",
            Self::Name => "name",
            Self::Number => "number",
            Self::Str => "string",
            Self::StrPart => "string part",
            Self::Ellipsis => "ellipsis",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Set => "set",
        };
        formatter.write_str(name)
    }
}

/// Decodes the contents of a single quoted string token.
///
/// Supports `\n`, `\t`, `\r`, `\0`, `\\`, `\'` and `\"`; any other escaped
/// character is kept together with its backslash.
pub fn unquote(raw: &str) -> String {
    let inner = ["\"\"\"", "'''"]
        .iter()
        .find_map(|quote| raw.strip_prefix(quote)?.strip_suffix(quote))
        .or_else(|| raw.strip_prefix('"')?.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'')?.strip_suffix('\''))
        .unwrap_or(raw);

    let mut decoded = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(current) = chars.next() {
        if current != '\\' {
            decoded.push(current);
            continue;
        }
        match chars.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('r') => decoded.push('\r'),
            Some('0') => decoded.push('\0'),
            Some('\\') => decoded.push('\\'),
            Some('\'') => decoded.push('\''),
            Some('"') => decoded.push('"'),
            Some(other) => {
                decoded.push('\\');
                decoded.push(other);
            }
            None => decoded.push('\\'),
        }
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote_escapes() {
        assert_eq!(unquote(r#""a\nb""#), "a\nb");
        assert_eq!(unquote(r"'it\'s'"), "it's");
        assert_eq!(unquote(r#""\q""#), "\\q");
    }

    #[test]
    fn test_children_of_kind() {
        let name = SyntaxNode::leaf(SyntaxKind::Name, Span::new(0, 1), "x");
        let number = SyntaxNode::leaf(SyntaxKind::Number, Span::new(2, 3), "1");
        let list = SyntaxNode::new(
            SyntaxKind::TestList,
            Span::new(0, 3),
            "x,1",
            vec![name, number],
        );
        assert_eq!(list.children_of(SyntaxKind::Name).count(), 1);
        assert_eq!(
            list.first_child_of(SyntaxKind::Number).map(|node| node.text.as_str()),
            Some("1")
        );
    }

    #[test]
    fn test_kind_display_uses_production_names() {
        assert_eq!(SyntaxKind::FuncDef.to_string(), "funcdef");
        assert_eq!(SyntaxKind::Power.to_string(), "power");
    }
}
