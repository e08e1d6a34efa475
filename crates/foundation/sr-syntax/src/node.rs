//! Construction and per-production accessors for [`SyntaxNode`]

use crate::{SyntaxKind, SyntaxNode};
use sr_span::Span;

/// The four shapes an expression statement can take
#[derive(Debug, Clone, Copy)]
pub enum ExprStmtForm<'tree> {
    /// `target: Type [= value]`
    Annotated {
        /// Target test list
        target: &'tree SyntaxNode,
        /// Annotation expression
        annotation: &'tree SyntaxNode,
        /// Optional initializer
        value: Option<&'tree SyntaxNode>,
    },
    /// `target OP= value`
    Augmented {
        /// Target test list
        target: &'tree SyntaxNode,
        /// Operator text including `=`, e.g. `+=`
        operator: &'tree str,
        /// Right-hand side test list
        value: &'tree SyntaxNode,
    },
    /// `t1 = t2 = ... = value`
    Assign {
        /// Target test lists, left to right
        targets: &'tree [SyntaxNode],
        /// Right-hand side test list
        value: &'tree SyntaxNode,
    },
    /// Bare expression
    Expr(&'tree SyntaxNode),
}

/// One `if`/`elif` arm
#[derive(Debug, Clone, Copy)]
pub struct IfBranch<'tree> {
    /// Branch condition
    pub condition: &'tree SyntaxNode,
    /// Branch body
    pub body: &'tree SyntaxNode,
}

impl SyntaxNode {
    /// Creates a node
    pub fn new(
        kind: SyntaxKind,
        span: Span,
        text: impl Into<String>,
        children: Vec<Self>,
    ) -> Self {
        Self {
            kind,
            span,
            text: text.into(),
            children,
        }
    }

    /// Creates a node without children
    pub fn leaf(kind: SyntaxKind, span: Span, text: impl Into<String>) -> Self {
        Self::new(kind, span, text, Vec::new())
    }

    /// Child at `index`
    pub fn child(&self, index: usize) -> Option<&Self> {
        self.children.get(index)
    }

    /// First child of the given kind
    pub fn first_child_of(&self, kind: SyntaxKind) -> Option<&Self> {
        self.children.iter().find(|child| child.kind == kind)
    }

    /// All children of the given kind, in order
    pub fn children_of(&self, kind: SyntaxKind) -> impl Iterator<Item = &Self> {
        self.children.iter().filter(move |child| child.kind == kind)
    }

    /// Whether this node is a statement production
    pub fn is_statement(&self) -> bool {
        matches!(
            self.kind,
            SyntaxKind::FuncDef
                | SyntaxKind::ClassDef
                | SyntaxKind::ExprStmt
                | SyntaxKind::Return
                | SyntaxKind::Pass
                | SyntaxKind::Break
                | SyntaxKind::Continue
                | SyntaxKind::If
                | SyntaxKind::While
                | SyntaxKind::For
                | SyntaxKind::Del
                | SyntaxKind::Global
                | SyntaxKind::Nonlocal
                | SyntaxKind::Assert
                | SyntaxKind::Import
        )
    }

    /// Defined name of a `FuncDef`, `Param`, `ClassDef` or `Attribute`
    pub fn name(&self) -> &str {
        &self.text
    }

    /// Parameters of a `FuncDef`
    pub fn parameters(&self) -> impl Iterator<Item = &Self> {
        self.first_child_of(SyntaxKind::Parameters)
            .into_iter()
            .flat_map(|params| params.children.iter())
    }

    /// `-> Type` of a `FuncDef`
    pub fn return_annotation(&self) -> Option<&Self> {
        match self.children.as_slice() {
            [_, annotation, body] if body.kind == SyntaxKind::Suite => Some(annotation),
            _ => None,
        }
    }

    /// Annotation of a `Param`
    pub fn annotation(&self) -> Option<&Self> {
        self.children.first()
    }

    /// Trailing body suite of a `FuncDef` or `ClassDef`
    pub fn body(&self) -> Option<&Self> {
        self.children
            .last()
            .filter(|child| child.kind == SyntaxKind::Suite)
    }

    /// Base class expressions of a `ClassDef`
    pub fn bases(&self) -> &[Self] {
        match self.children.split_last() {
            Some((last, bases)) if last.kind == SyntaxKind::Suite => bases,
            _ => &self.children,
        }
    }

    /// Classifies an `ExprStmt`
    pub fn expr_stmt_form(&self) -> Option<ExprStmtForm<'_>> {
        let target = self.children.first()?;
        match self.children.get(1) {
            Some(ann) if ann.kind == SyntaxKind::AnnAssign => Some(ExprStmtForm::Annotated {
                target,
                annotation: ann.children.first()?,
                value: ann.children.get(1),
            }),
            Some(aug) if aug.kind == SyntaxKind::AugAssign => Some(ExprStmtForm::Augmented {
                target,
                operator: &aug.text,
                value: aug.children.first()?,
            }),
            Some(_) => {
                let (value, targets) = self.children.split_last()?;
                Some(ExprStmtForm::Assign { targets, value })
            }
            None => Some(ExprStmtForm::Expr(target)),
        }
    }

    /// `if`/`elif` arms of an `If`
    pub fn if_branches(&self) -> impl Iterator<Item = IfBranch<'_>> {
        self.children.chunks_exact(2).map(|pair| IfBranch {
            condition: &pair[0],
            body: &pair[1],
        })
    }

    /// `else` suite of an `If`
    pub fn else_body(&self) -> Option<&Self> {
        if self.children.len() % 2 == 1 {
            self.children.last()
        } else {
            None
        }
    }

    /// Condition of a `While`
    pub fn loop_condition(&self) -> Option<&Self> {
        self.children.first()
    }

    /// Body of a `While`
    pub fn loop_body(&self) -> Option<&Self> {
        self.children.get(1)
    }

    /// `else` suite of a `While`
    pub fn loop_else(&self) -> Option<&Self> {
        self.children.get(2)
    }

    /// Returned test list of a `Return`
    pub fn return_value(&self) -> Option<&Self> {
        self.children.first()
    }

    /// `(then, condition, otherwise)` of an `IfExpr`
    pub fn conditional_parts(&self) -> Option<(&Self, &Self, &Self)> {
        match self.children.as_slice() {
            [then, condition, otherwise] => Some((then, condition, otherwise)),
            _ => None,
        }
    }

    /// Operands of a `Comparison`, in order
    pub fn comparison_operands(&self) -> impl Iterator<Item = &Self> {
        self.children
            .iter()
            .filter(|child| child.kind != SyntaxKind::CompOp)
    }

    /// Operators of a `Comparison`, in order
    pub fn comparison_operators(&self) -> impl Iterator<Item = &str> {
        self.children_of(SyntaxKind::CompOp)
            .map(|operator| operator.text.as_str())
    }

    /// `(lhs, rhs)` of a `BinOp` or `Power`
    pub fn binary_operands(&self) -> Option<(&Self, &Self)> {
        match self.children.as_slice() {
            [lhs, rhs] => Some((lhs, rhs)),
            _ => None,
        }
    }

    /// Operand of a `Unary` or `Not`
    pub fn operand(&self) -> Option<&Self> {
        self.children.first()
    }

    /// Primary expression of an `AtomExpr`
    pub fn atom(&self) -> Option<&Self> {
        self.children.first()
    }

    /// Trailers of an `AtomExpr`, left to right
    pub fn trailers(&self) -> &[Self] {
        self.children.get(1..).unwrap_or_default()
    }

    /// `(key, value)` pairs of a `Dict`
    pub fn dict_entries(&self) -> impl Iterator<Item = (&Self, &Self)> {
        self.children
            .chunks_exact(2)
            .map(|pair| (&pair[0], &pair[1]))
    }

    /// Decoded contents of a `Str`, adjacent literals concatenated
    pub fn string_value(&self) -> String {
        self.children_of(SyntaxKind::StrPart)
            .map(|part| crate::unquote(&part.text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> SyntaxNode {
        SyntaxNode::leaf(SyntaxKind::Name, Span::default(), text)
    }

    fn testlist(children: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::new(SyntaxKind::TestList, Span::default(), "", children)
    }

    #[test]
    fn test_chained_assignment_form() {
        let stmt = SyntaxNode::new(
            SyntaxKind::ExprStmt,
            Span::default(),
            "a=b=c",
            vec![
                testlist(vec![name("a")]),
                testlist(vec![name("b")]),
                testlist(vec![name("c")]),
            ],
        );
        let Some(ExprStmtForm::Assign { targets, value }) = stmt.expr_stmt_form() else {
            panic!("expected an assignment");
        };
        assert_eq!(targets.len(), 2);
        assert_eq!(value.children[0].text, "c");
    }

    #[test]
    fn test_annotated_form_without_value() {
        let ann = SyntaxNode::new(
            SyntaxKind::AnnAssign,
            Span::default(),
            ":int",
            vec![name("int")],
        );
        let stmt = SyntaxNode::new(
            SyntaxKind::ExprStmt,
            Span::default(),
            "x:int",
            vec![testlist(vec![name("x")]), ann],
        );
        match stmt.expr_stmt_form() {
            Some(ExprStmtForm::Annotated {
                annotation, value, ..
            }) => {
                assert_eq!(annotation.text, "int");
                assert!(value.is_none());
            }
            other => panic!("unexpected form {other:?}"),
        }
    }

    #[test]
    fn test_if_branches_and_else() {
        let suite = || SyntaxNode::new(SyntaxKind::Suite, Span::default(), "", Vec::new());
        let node = SyntaxNode::new(
            SyntaxKind::If,
            Span::default(),
            "",
            vec![name("a"), suite(), name("b"), suite(), suite()],
        );
        assert_eq!(node.if_branches().count(), 2);
        assert!(node.else_body().is_some());
    }
}
