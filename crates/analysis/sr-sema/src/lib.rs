//! Semantic analysis
//!
//! A single enter/exit walk over the syntax tree that declares names into a
//! [`ScopeTree`] and checks that every identifier reference resolves. Problems
//! are collected as [`SemanticError`]s; the walk never stops early.

mod error;

pub use error::{SemanticError, SemanticErrorKind};

use indexmap::IndexMap;
use sr_scope::{ANY, AUTO, Field, ScopeError, ScopeTree, Symbol};
use sr_span::{LineIndex, Span};
use sr_syntax::{ExprStmtForm, SyntaxKind, SyntaxNode, Visitor, walk};
use tracing::{debug, trace, warn};

/// Result of analysing one compilation unit
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Every scope created during the walk
    pub scopes: ScopeTree,
    /// Errors in the order they were found
    pub errors: Vec<SemanticError>,
}

impl Analysis {
    /// Whether any error was reported
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Analyses `root` against a fresh builtin-seeded scope tree.
///
/// `source` is only used to attach line and column numbers to errors.
#[tracing::instrument(level = "debug", skip_all)]
pub fn analyze(root: &SyntaxNode, source: &str) -> Analysis {
    let mut analyzer = Analyzer::new(ScopeTree::with_builtins("global")).with_source(source);
    walk(root, &mut analyzer);
    let analysis = analyzer.finish();
    debug!(
        errors = analysis.errors.len(),
        scopes = analysis.scopes.scope_count(),
        "semantic analysis finished"
    );
    analysis
}

/// Type tag guessed from the text of a right-hand side.
///
/// Only the literal shape is considered: digits give `int`, a leading quote
/// gives `str`, digits around a single `.` give `float`, `True`/`False` give
/// `bool`, and anything else is [`ANY`].
pub fn infer_literal_type(text: &str) -> &'static str {
    let all_digits =
        |text: &str| !text.is_empty() && text.chars().all(|digit| digit.is_ascii_digit());
    if all_digits(text) {
        "int"
    } else if text.starts_with(['"', '\'']) {
        "str"
    } else if all_digits(&text.replacen('.', "", 1)) {
        "float"
    } else if matches!(text, "True" | "False") {
        "bool"
    } else {
        ANY
    }
}

/// Tree visitor declaring names and resolving references
#[derive(Debug)]
pub struct Analyzer {
    scopes: ScopeTree,
    errors: Vec<SemanticError>,
    lines: Option<LineIndex>,
}

impl Analyzer {
    /// Analyzer declaring into `scopes`, starting at its current scope
    pub fn new(scopes: ScopeTree) -> Self {
        Self {
            scopes,
            errors: Vec::new(),
            lines: None,
        }
    }

    /// Attaches line and column numbers from `source` to reported errors
    #[must_use]
    pub fn with_source(mut self, source: &str) -> Self {
        self.lines = Some(LineIndex::new(source));
        self
    }

    /// Errors found so far
    pub fn errors(&self) -> &[SemanticError] {
        &self.errors
    }

    /// Ends the analysis
    pub fn finish(self) -> Analysis {
        Analysis {
            scopes: self.scopes,
            errors: self.errors,
        }
    }

    fn report(&mut self, kind: SemanticErrorKind, span: Span) {
        let position = self.lines.as_ref().map(|lines| lines.line_col(span.start));
        let error = SemanticError {
            kind,
            span,
            line: position.map(|at| at.line),
            column: position.map(|at| at.column),
        };
        trace!(%error, "semantic error");
        self.errors.push(error);
    }

    fn report_scope_error(&mut self, error: ScopeError, span: Span) {
        match error {
            ScopeError::DuplicateSymbol { name, scope } => {
                self.report(SemanticErrorKind::DuplicateSymbol { name, scope }, span);
            }
            other => warn!(error = %other, "unexpected scope error during analysis"),
        }
    }

    fn declare(&mut self, symbol: Symbol, span: Span) {
        if let Err(error) = self.scopes.insert(symbol) {
            self.report_scope_error(error, span);
        }
    }

    fn declare_if_unresolved(&mut self, name: &str, ty: &str, span: Span) {
        if self.scopes.lookup(name).is_none() {
            self.declare(Symbol::variable(name, ty), span);
        }
    }

    fn enter_function(&mut self, node: &SyntaxNode) {
        let params: Vec<String> = node
            .parameters()
            .map(|param| param.name().to_string())
            .collect();
        let return_type = node
            .return_annotation()
            .map_or("NoneType", |annotation| annotation.text.as_str());
        let function = Symbol::function(node.name(), return_type, params);

        let parent = self.scopes.current();
        self.scopes.push(node.name());
        for param in node.parameters() {
            let ty = param
                .annotation()
                .map_or(ANY, |annotation| annotation.text.as_str());
            self.declare(Symbol::parameter(param.name(), ty), param.span);
        }
        if let Err(error) = self.scopes.insert_into(parent, function) {
            self.report_scope_error(error, node.span);
        }
    }

    fn enter_class(&mut self, node: &SyntaxNode) {
        self.declare(Symbol::class(node.name(), class_fields(node)), node.span);
        self.scopes.push(node.name());
    }

    fn enter_name(&mut self, node: &SyntaxNode) {
        if self.scopes.lookup(&node.text).is_some() {
            return;
        }
        let suggestions = self.scopes.suggestions(&node.text);
        self.report(
            SemanticErrorKind::UndefinedIdentifier {
                name: node.text.clone(),
                suggestions,
            },
            node.span,
        );
    }

    fn enter_expr_stmt(&mut self, node: &SyntaxNode) {
        match node.expr_stmt_form() {
            Some(ExprStmtForm::Annotated {
                target, annotation, ..
            }) => {
                self.declare(Symbol::variable(&target.text, &annotation.text), target.span);
            }
            Some(ExprStmtForm::Augmented { target, .. }) => {
                self.declare_if_unresolved(&target.text, AUTO, target.span);
            }
            Some(ExprStmtForm::Assign { targets, value }) => {
                let ty = infer_literal_type(&value.text);
                for target in targets {
                    self.declare_if_unresolved(&target.text, ty, target.span);
                }
            }
            Some(ExprStmtForm::Expr(_)) | None => {}
        }
    }

    fn enter_for(&mut self, node: &SyntaxNode) {
        let Some(targets) = node.child(0) else {
            return;
        };
        for target in targets.children_of(SyntaxKind::Name) {
            self.declare_if_unresolved(&target.text, ANY, target.span);
        }
    }
}

/// Field table of a class body: every `name: Type` statement, in order
fn class_fields(class: &SyntaxNode) -> IndexMap<String, Field> {
    let mut fields = IndexMap::new();
    let Some(body) = class.body() else {
        return fields;
    };
    for statement in &body.children {
        let Some(ExprStmtForm::Annotated {
            target, annotation, ..
        }) = statement.expr_stmt_form()
        else {
            continue;
        };
        if fields.contains_key(&target.text) {
            continue;
        }
        let index = fields.len() as u32;
        fields.insert(
            target.text.clone(),
            Field {
                ty: annotation.text.clone(),
                index,
            },
        );
    }
    fields
}

impl Visitor for Analyzer {
    fn enter(&mut self, node: &SyntaxNode) {
        match node.kind {
            SyntaxKind::FuncDef => self.enter_function(node),
            SyntaxKind::ClassDef => self.enter_class(node),
            SyntaxKind::Name => self.enter_name(node),
            SyntaxKind::ExprStmt => self.enter_expr_stmt(node),
            SyntaxKind::For => self.enter_for(node),
            _ => {}
        }
    }

    fn exit(&mut self, node: &SyntaxNode) {
        if matches!(node.kind, SyntaxKind::FuncDef | SyntaxKind::ClassDef) {
            if let Err(error) = self.scopes.pop() {
                warn!(%error, "unbalanced scope exit");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_parser::parse_source;
    use sr_scope::SymbolKind;

    fn run(source: &str) -> Analysis {
        let tree = parse_source(source).unwrap();
        analyze(&tree, source)
    }

    fn undefined_names(analysis: &Analysis) -> Vec<&str> {
        analysis
            .errors
            .iter()
            .filter_map(|error| match &error.kind {
                SemanticErrorKind::UndefinedIdentifier { name, .. } => Some(name.as_str()),
                SemanticErrorKind::DuplicateSymbol { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_declared_program_has_no_errors() {
        let analysis = run(concat!(
            "x: int = 1\n",
            "y = x + 2\n",
            "fn add(a: int, b: int) -> int:\n",
            "    total = a + b\n",
            "    return total\n",
            "z = add(x, y)\n",
            "if z > 3:\n",
            "    z += 1\n",
        ));
        assert_eq!(analysis.errors, Vec::new());
    }

    #[test]
    fn test_each_undefined_reference_is_reported() {
        let analysis = run("y = q + q\nprint(q)\n");
        assert_eq!(undefined_names(&analysis), vec!["q", "q", "print", "q"]);
    }

    #[test]
    fn test_duplicate_declaration_is_reported_once() {
        let analysis = run("x: int = 1\nx: float = 2.0\n");
        assert_eq!(analysis.errors.len(), 1);
        assert_eq!(
            analysis.errors[0].kind,
            SemanticErrorKind::DuplicateSymbol {
                name: "x".into(),
                scope: "global".into()
            }
        );
    }

    #[test]
    fn test_duplicate_parameter_is_reported() {
        let analysis = run("def f(a, a):\n    pass\n");
        assert_eq!(analysis.errors.len(), 1);
        assert!(matches!(
            analysis.errors[0].kind,
            SemanticErrorKind::DuplicateSymbol { .. }
        ));
    }

    #[test]
    fn test_shadowing_resolves_to_inner_declaration() {
        let analysis = run(concat!(
            "x: int = 1\n",
            "def f() -> float:\n",
            "    x: float = 2.0\n",
            "    return x\n",
        ));
        assert_eq!(analysis.errors, Vec::new());

        let scopes = &analysis.scopes;
        let inner = scopes.scope(scopes.root()).children[0];
        assert_eq!(scopes.scope(inner).name, "f");
        assert_eq!(scopes.lookup_from(inner, "x").unwrap().ty, "float");
        assert_eq!(scopes.lookup_from(scopes.root(), "x").unwrap().ty, "int");
    }

    #[test]
    fn test_function_is_declared_in_enclosing_scope() {
        let analysis = run("def fact(n: int) -> int:\n    return fact(n)\nfact(3)\n");
        assert_eq!(analysis.errors, Vec::new());

        let root = analysis.scopes.scope(analysis.scopes.root());
        let fact = &root.symbols["fact"];
        assert_eq!(fact.params(), Some(&["n".to_string()][..]));
        assert_eq!(fact.ty, "int");
        assert!(root.symbols.get("n").is_none());
    }

    #[test]
    fn test_parameters_are_parameter_symbols() {
        let analysis = run("def f(a: int, b):\n    pass\n");
        let scopes = &analysis.scopes;
        let inner = scopes.scope(scopes.root()).children[0];
        let first = scopes.lookup_from(inner, "a").unwrap();
        assert_eq!(first.kind, SymbolKind::Parameter);
        assert_eq!(first.ty, "int");
        assert_eq!(scopes.lookup_from(inner, "b").unwrap().ty, ANY);
    }

    #[test]
    fn test_augmented_assignment_declares_auto() {
        let analysis = run("counter += 1\n");
        assert_eq!(analysis.errors, Vec::new());
        let root = analysis.scopes.scope(analysis.scopes.root());
        assert_eq!(root.symbols["counter"].ty, AUTO);
    }

    #[test]
    fn test_plain_assignment_uses_literal_shape() {
        let analysis = run("a = 1\nb = 'hi'\nc = 1.5\nd = True\ne = 1 + 2\nf = g = 7\n");
        let root = analysis.scopes.scope(analysis.scopes.root());
        let types: Vec<(&str, &str)> = root
            .symbols
            .values()
            .filter(|symbol| symbol.kind == SymbolKind::Variable)
            .map(|symbol| (symbol.name.as_str(), symbol.ty.as_str()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("a", "int"),
                ("b", "str"),
                ("c", "float"),
                ("d", "bool"),
                ("e", ANY),
                ("f", "int"),
                ("g", "int"),
            ]
        );
    }

    #[test]
    fn test_literal_type_heuristic() {
        assert_eq!(infer_literal_type("42"), "int");
        assert_eq!(infer_literal_type("\"s\""), "str");
        assert_eq!(infer_literal_type("3.25"), "float");
        assert_eq!(infer_literal_type(".5"), "float");
        assert_eq!(infer_literal_type("1.2.3"), ANY);
        assert_eq!(infer_literal_type("-1"), ANY);
        assert_eq!(infer_literal_type("False"), "bool");
        assert_eq!(infer_literal_type(""), ANY);
    }

    #[test]
    fn test_errors_carry_line_and_column() {
        let analysis = run("y = 1\nz = y + missing\n");
        assert_eq!(analysis.errors.len(), 1);
        let error = &analysis.errors[0];
        assert_eq!((error.line, error.column), (Some(2), Some(9)));
        assert_eq!(error.to_string(), "2:9: undefined identifier `missing`");
    }

    #[test]
    fn test_suggestions_for_typos() {
        let analysis = run("total = 1\nx = totl\n");
        assert_eq!(
            analysis.errors[0].kind,
            SemanticErrorKind::UndefinedIdentifier {
                name: "totl".into(),
                suggestions: vec!["total".into()]
            }
        );
    }

    #[test]
    fn test_class_fields_are_indexed() {
        let analysis = run(concat!(
            "class Point:\n",
            "    x: int\n",
            "    y: float\n",
            "p: Point = Point(1, 2.0)\n",
        ));
        assert_eq!(analysis.errors, Vec::new());
        assert_eq!(
            analysis.scopes.field_info("p.y"),
            Ok((1, "float".to_string()))
        );
    }

    #[test]
    fn test_analysis_continues_after_errors() {
        let analysis = run("a = b\nc = d\ne: int = 1\ne: int = 2\n");
        assert_eq!(analysis.errors.len(), 3);
    }

    #[test]
    fn test_errors_serialize_to_json() {
        let analysis = run("x = nope\n");
        let json = serde_json::to_value(&analysis.errors[0]).unwrap();
        assert_eq!(json["kind"], "undefined_identifier");
        assert_eq!(json["name"], "nope");
        assert_eq!(json["line"], 1);
    }
}
