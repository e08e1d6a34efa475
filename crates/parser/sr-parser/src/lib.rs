//! Parser for Sere source files
//!
//! A hand-written lexer with significant indentation feeds a recursive descent
//! parser that builds the generic [`SyntaxNode`] tree. Parsing stops at the
//! first syntax error, which is reported as a [`miette`] diagnostic.

pub mod error;
mod lexer;
mod parser;

pub use error::ParseError;
pub use lexer::{KEYWORDS, is_keyword};

use error::ErrorSource;
use sr_syntax::SyntaxNode;
use tracing::debug;

/// Parses `source` under the placeholder file name `<input>`
pub fn parse_source(source: &str) -> Result<SyntaxNode, ParseError> {
    parse_named_source("<input>", source)
}

/// Parses `source`, attributing diagnostics to `name`
#[tracing::instrument(level = "debug", skip(source), fields(bytes = source.len()))]
pub fn parse_named_source(name: &str, source: &str) -> Result<SyntaxNode, ParseError> {
    let errors = ErrorSource::new(name, source);
    let tokens = lexer::tokenize(source, &errors)?;
    debug!(tokens = tokens.len(), "tokenized");
    let tree = parser::Parser::new(tokens, &errors).file_input()?;
    debug!(statements = tree.children.len(), "parsed");
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use sr_syntax::{ExprStmtForm, SyntaxKind};
    use std::fmt::Write;

    fn dump(node: &SyntaxNode) -> String {
        fn go(node: &SyntaxNode, depth: usize, out: &mut String) {
            writeln!(out, "{}{:?} {:?}", "  ".repeat(depth), node.kind, node.text).unwrap();
            for child in &node.children {
                go(child, depth + 1, out);
            }
        }
        let mut out = String::new();
        go(node, 0, &mut out);
        out
    }

    fn first_statement(source: &str) -> SyntaxNode {
        parse_source(source).unwrap().children.remove(0)
    }

    #[test]
    fn test_annotated_assignment_tree() {
        let tree = parse_source("x: int = 1 + 2\n").unwrap();
        expect![[r#"
            FileInput "x:int=1+2"
              ExprStmt "x:int=1+2"
                TestList "x"
                  Name "x"
                AnnAssign ":int=1+2"
                  Name "int"
                  BinOp "+"
                    Number "1"
                    Number "2"
        "#]]
        .assert_eq(&dump(&tree));
    }

    #[test]
    fn test_function_definition() {
        let func = first_statement("fn add(a: int, b) -> int:\n    return a + b\n");
        assert_eq!(func.kind, SyntaxKind::FuncDef);
        assert_eq!(func.name(), "add");

        let params: Vec<_> = func.parameters().collect();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name(), "a");
        assert_eq!(params[0].annotation().map(|ann| ann.text.as_str()), Some("int"));
        assert!(params[1].annotation().is_none());

        assert_eq!(func.return_annotation().map(|ann| ann.text.as_str()), Some("int"));
        let body = func.body().unwrap();
        assert_eq!(body.children[0].kind, SyntaxKind::Return);
    }

    #[test]
    fn test_def_keyword_without_return_annotation() {
        let func = first_statement("def f():\n    pass\n");
        assert!(func.return_annotation().is_none());
        assert_eq!(func.body().unwrap().children[0].kind, SyntaxKind::Pass);
    }

    #[test]
    fn test_chained_assignment() {
        let stmt = first_statement("a = b = 5\n");
        match stmt.expr_stmt_form() {
            Some(ExprStmtForm::Assign { targets, value }) => {
                assert_eq!(targets.len(), 2);
                assert_eq!(value.text, "5");
            }
            other => panic!("unexpected form {other:?}"),
        }
    }

    #[test]
    fn test_augmented_assignment() {
        let stmt = first_statement("total += 3\n");
        match stmt.expr_stmt_form() {
            Some(ExprStmtForm::Augmented { operator, target, .. }) => {
                assert_eq!(operator, "+=");
                assert_eq!(target.text, "total");
            }
            other => panic!("unexpected form {other:?}"),
        }
    }

    #[test]
    fn test_semicolon_separated_statements() {
        let tree = parse_source("a = 1; b = 2;\nc = 3").unwrap();
        assert_eq!(tree.children.len(), 3);
    }

    #[test]
    fn test_if_elif_else() {
        let stmt = first_statement("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        assert_eq!(stmt.kind, SyntaxKind::If);
        assert_eq!(stmt.if_branches().count(), 2);
        assert!(stmt.else_body().is_some());
    }

    #[test]
    fn test_conditional_expression() {
        let stmt = first_statement("y = 1 if c else 2\n");
        let Some(ExprStmtForm::Assign { value, .. }) = stmt.expr_stmt_form() else {
            panic!("expected an assignment");
        };
        let conditional = &value.children[0];
        assert_eq!(conditional.kind, SyntaxKind::IfExpr);
        let (then, condition, otherwise) = conditional.conditional_parts().unwrap();
        assert_eq!(
            (then.text.as_str(), condition.text.as_str(), otherwise.text.as_str()),
            ("1", "c", "2")
        );
    }

    #[test]
    fn test_comparison_chain() {
        let stmt = first_statement("a < b <= c\n");
        let comparison = &stmt.children[0].children[0];
        assert_eq!(comparison.kind, SyntaxKind::Comparison);
        assert_eq!(comparison.comparison_operands().count(), 3);
        assert_eq!(
            comparison.comparison_operators().collect::<Vec<_>>(),
            ["<", "<="]
        );
    }

    #[test]
    fn test_not_in_operator() {
        let stmt = first_statement("a not in b\n");
        let comparison = &stmt.children[0].children[0];
        assert_eq!(comparison.comparison_operators().collect::<Vec<_>>(), ["not in"]);
    }

    #[test]
    fn test_boolean_chains() {
        let stmt = first_statement("a or b or c and d\n");
        let or = &stmt.children[0].children[0];
        assert_eq!(or.kind, SyntaxKind::Or);
        assert_eq!(or.children.len(), 3);
        assert_eq!(or.children[2].kind, SyntaxKind::And);
    }

    #[test]
    fn test_binary_precedence() {
        let stmt = first_statement("1 + 2 * 3\n");
        let sum = &stmt.children[0].children[0];
        assert_eq!(sum.text, "+");
        let (_, product) = sum.binary_operands().unwrap();
        assert_eq!(product.text, "*");
    }

    #[test]
    fn test_trailers() {
        let stmt = first_statement("point.x(1, 2)[0]\n");
        let atom_expr = &stmt.children[0].children[0];
        assert_eq!(atom_expr.kind, SyntaxKind::AtomExpr);
        assert_eq!(atom_expr.atom().map(|atom| atom.text.as_str()), Some("point"));
        let kinds: Vec<_> = atom_expr.trailers().iter().map(|trailer| trailer.kind).collect();
        assert_eq!(
            kinds,
            [SyntaxKind::Attribute, SyntaxKind::Call, SyntaxKind::Subscript]
        );
        assert_eq!(atom_expr.trailers()[0].name(), "x");
        assert_eq!(atom_expr.trailers()[1].children.len(), 2);
    }

    #[test]
    fn test_displays() {
        let tree = parse_source("(1, 2)\n[]\n{1: 2, 3: 4}\n{1, 2}\n(7)\n").unwrap();
        let kinds: Vec<_> = tree
            .children
            .iter()
            .map(|stmt| stmt.children[0].children[0].kind)
            .collect();
        assert_eq!(
            kinds,
            [
                SyntaxKind::Tuple,
                SyntaxKind::List,
                SyntaxKind::Dict,
                SyntaxKind::Set,
                SyntaxKind::Number
            ]
        );
    }

    #[test]
    fn test_adjacent_strings() {
        let stmt = first_statement("s = 'ab' \"c\\n\"\n");
        let Some(ExprStmtForm::Assign { value, .. }) = stmt.expr_stmt_form() else {
            panic!("expected an assignment");
        };
        let string = &value.children[0];
        assert_eq!(string.kind, SyntaxKind::Str);
        assert_eq!(string.string_value(), "abc\n");
    }

    #[test]
    fn test_class_definition() {
        let class = first_statement("class Point:\n    x: int\n    y: int\n");
        assert_eq!(class.kind, SyntaxKind::ClassDef);
        assert_eq!(class.name(), "Point");
        assert!(class.bases().is_empty());
        assert_eq!(class.body().unwrap().children.len(), 2);
    }

    #[test]
    fn test_while_loop_and_flow_statements() {
        let stmt = first_statement(concat!(
            "while i < 3:\n",
            "    i += 1\n",
            "    if i == 2:\n",
            "        break\n",
            "    continue\n",
        ));
        assert_eq!(stmt.kind, SyntaxKind::While);
        let body = stmt.loop_body().unwrap();
        assert_eq!(body.children.len(), 3);
        assert_eq!(body.children[2].kind, SyntaxKind::Continue);
    }

    #[test]
    fn test_text_only_statements() {
        let tree =
            parse_source("import os.path as p\nfrom a import (b, c)\nglobal g\ndel x\n").unwrap();
        let kinds: Vec<_> = tree.children.iter().map(|stmt| stmt.kind).collect();
        assert_eq!(
            kinds,
            [
                SyntaxKind::Import,
                SyntaxKind::Import,
                SyntaxKind::Global,
                SyntaxKind::Del
            ]
        );
        assert!(tree.children.iter().all(|stmt| stmt.children.is_empty()));
    }

    #[test]
    fn test_missing_colon_is_reported() {
        let err = parse_source("def f()\n    pass\n").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
        assert_eq!(err.to_string(), "expected `:`, found `newline`");
    }

    #[test]
    fn test_keyword_arguments_are_rejected() {
        let err = parse_source("f(x=1)\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidSyntax { .. }));
    }

    #[test]
    fn test_missing_indented_block() {
        let err = parse_source("if x:\npass\n").unwrap_err();
        assert_eq!(err.to_string(), "expected an indented block, found `pass`");
    }

    #[test]
    fn test_name_spans_map_to_source() {
        let tree = parse_source("x = 1\ny = x\n").unwrap();
        let Some(ExprStmtForm::Assign { value, .. }) = tree.children[1].expr_stmt_form() else {
            panic!("expected an assignment");
        };
        let reference = &value.children[0];
        assert_eq!(reference.kind, SyntaxKind::Name);
        assert_eq!(reference.span.start, 10);
    }
}
