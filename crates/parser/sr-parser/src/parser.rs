//! Recursive descent parser producing the generic syntax tree

use crate::error::{ErrorSource, ParseError};
use crate::lexer::{Token, TokenKind, is_keyword};
use sr_span::Span;
use sr_syntax::{SyntaxKind, SyntaxNode};

type ParseResult<T> = Result<T, ParseError>;

const AUGMENTED_OPERATORS: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "&=", "|=", "^=", "<<=", ">>=", "**=", "@=",
];

const COMPARISON_OPERATORS: &[&str] = &["<", ">", "==", ">=", "<=", "!=", "<>"];

pub(crate) struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    errors: &'src ErrorSource,
}

impl<'src> Parser<'src> {
    pub(crate) fn new(tokens: Vec<Token>, errors: &'src ErrorSource) -> Self {
        Self {
            tokens,
            pos: 0,
            errors,
        }
    }

    // =========================================================================
    // Token management
    // =========================================================================

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn at(&self, text: &str) -> bool {
        self.peek().is(text)
    }

    fn at_kind(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.at(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> ParseResult<Token> {
        if self.at(text) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(format!("`{text}`")))
        }
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        let token = self.peek();
        self.errors
            .unexpected_token(expected, token.to_string(), token.span)
    }

    fn name(&mut self, expected: &str) -> ParseResult<Token> {
        let token = self.peek();
        if token.kind == TokenKind::Name && !is_keyword(&token.text) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn at_simple_statement_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) || self.at(";")
    }

    /// Whether the current token can begin an expression
    fn at_expression_start(&self) -> bool {
        let token = self.peek();
        match token.kind {
            TokenKind::Number | TokenKind::Str => true,
            TokenKind::Name => {
                !is_keyword(&token.text) || token.text == "not" || token.text == "lambda"
            }
            TokenKind::Op => matches!(
                token.text.as_str(),
                "(" | "[" | "{" | "-" | "+" | "~" | "..."
            ),
            _ => false,
        }
    }

    // =========================================================================
    // Node construction
    // =========================================================================

    fn span_since(&self, start: usize) -> Span {
        let first = self
            .tokens
            .get(start)
            .map_or_else(|| self.peek().span, |token| token.span);
        let last = self
            .pos
            .checked_sub(1)
            .filter(|&last| last >= start)
            .and_then(|last| self.tokens.get(last))
            .map_or(first, |token| token.span);
        Span::new(first.start, last.end.max(first.start))
    }

    fn text_since(&self, start: usize) -> String {
        self.tokens
            .get(start..self.pos)
            .unwrap_or_default()
            .iter()
            .map(|token| token.text.as_str())
            .collect()
    }

    /// Node whose text is the concatenated text of its tokens
    fn node(&self, kind: SyntaxKind, start: usize, children: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::new(kind, self.span_since(start), self.text_since(start), children)
    }

    /// Node whose text is a name or operator
    fn named(
        &self,
        kind: SyntaxKind,
        start: usize,
        text: String,
        children: Vec<SyntaxNode>,
    ) -> SyntaxNode {
        SyntaxNode::new(kind, self.span_since(start), text, children)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(crate) fn file_input(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let mut statements = Vec::new();
        while !self.at_kind(TokenKind::Eof) {
            if self.at_kind(TokenKind::Newline) {
                self.bump();
                continue;
            }
            self.statement(&mut statements)?;
        }
        Ok(self.node(SyntaxKind::FileInput, start, statements))
    }

    fn statement(&mut self, out: &mut Vec<SyntaxNode>) -> ParseResult<()> {
        if self.at_kind(TokenKind::Name) {
            let keyword = self.peek().text.clone();
            let compound = match keyword.as_str() {
                "def" | "fn" => Some(self.funcdef()?),
                "class" => Some(self.classdef()?),
                "if" => Some(self.if_statement()?),
                "while" => Some(self.while_statement()?),
                "for" => Some(self.for_statement()?),
                _ => None,
            };
            if let Some(node) = compound {
                out.push(node);
                return Ok(());
            }
        }
        self.simple_statements(out)
    }

    fn simple_statements(&mut self, out: &mut Vec<SyntaxNode>) -> ParseResult<()> {
        loop {
            out.push(self.small_statement()?);
            if !self.eat(";") || matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
        }
        match self.peek().kind {
            TokenKind::Newline => {
                self.bump();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("end of statement")),
        }
    }

    fn small_statement(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let keyword = if self.at_kind(TokenKind::Name) && is_keyword(&self.peek().text) {
            self.peek().text.clone()
        } else {
            return self.expr_statement();
        };

        match keyword.as_str() {
            "pass" | "break" | "continue" => {
                self.bump();
                let kind = match keyword.as_str() {
                    "pass" => SyntaxKind::Pass,
                    "break" => SyntaxKind::Break,
                    _ => SyntaxKind::Continue,
                };
                Ok(self.node(kind, start, Vec::new()))
            }
            "return" => {
                self.bump();
                let mut children = Vec::new();
                if !self.at_simple_statement_end() {
                    children.push(self.testlist()?);
                }
                Ok(self.node(SyntaxKind::Return, start, children))
            }
            "del" => {
                self.bump();
                self.testlist()?;
                Ok(self.node(SyntaxKind::Del, start, Vec::new()))
            }
            "global" | "nonlocal" => {
                self.bump();
                self.name("name")?;
                while self.eat(",") {
                    self.name("name")?;
                }
                let kind = if keyword == "global" {
                    SyntaxKind::Global
                } else {
                    SyntaxKind::Nonlocal
                };
                Ok(self.node(kind, start, Vec::new()))
            }
            "assert" => {
                self.bump();
                let mut children = vec![self.test()?];
                if self.eat(",") {
                    children.push(self.test()?);
                }
                Ok(self.node(SyntaxKind::Assert, start, children))
            }
            "import" => {
                self.bump();
                self.import_names()?;
                Ok(self.node(SyntaxKind::Import, start, Vec::new()))
            }
            "from" => {
                self.bump();
                while self.eat(".") || self.eat("...") {}
                if !self.at("import") {
                    self.dotted_name()?;
                }
                self.expect("import")?;
                if !self.eat("*") {
                    let parenthesized = self.eat("(");
                    self.import_names()?;
                    if parenthesized {
                        self.eat(",");
                        self.expect(")")?;
                    }
                }
                Ok(self.node(SyntaxKind::Import, start, Vec::new()))
            }
            "not" | "lambda" => self.expr_statement(),
            _ => Err(self.unexpected("statement")),
        }
    }

    fn dotted_name(&mut self) -> ParseResult<()> {
        self.name("module name")?;
        while self.eat(".") {
            self.name("module name")?;
        }
        Ok(())
    }

    fn import_names(&mut self) -> ParseResult<()> {
        loop {
            self.dotted_name()?;
            if self.eat("as") {
                self.name("alias")?;
            }
            if !self.eat(",") || !self.at_kind(TokenKind::Name) {
                return Ok(());
            }
        }
    }

    fn expr_statement(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let mut children = vec![self.testlist()?];

        if self.at(":") {
            let ann_start = self.pos;
            self.bump();
            let mut ann_children = vec![self.test()?];
            if self.eat("=") {
                ann_children.push(self.test()?);
            }
            children.push(self.node(SyntaxKind::AnnAssign, ann_start, ann_children));
        } else if self.at_kind(TokenKind::Op)
            && AUGMENTED_OPERATORS.contains(&self.peek().text.as_str())
        {
            let aug_start = self.pos;
            let operator = self.bump().text;
            let value = self.testlist()?;
            children.push(self.named(SyntaxKind::AugAssign, aug_start, operator, vec![value]));
        } else {
            while self.eat("=") {
                children.push(self.testlist()?);
            }
        }

        Ok(self.node(SyntaxKind::ExprStmt, start, children))
    }

    fn funcdef(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        self.bump();
        let name = self.name("function name")?;
        let mut children = vec![self.parameters()?];
        if self.eat("->") {
            children.push(self.test()?);
        }
        self.expect(":")?;
        children.push(self.suite()?);
        Ok(self.named(SyntaxKind::FuncDef, start, name.text, children))
    }

    fn parameters(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        self.expect("(")?;
        let mut params = Vec::new();
        while !self.at(")") {
            let param_start = self.pos;
            if self.at("*") || self.at("**") || self.at("/") {
                return Err(self.errors.invalid_syntax(
                    "parameter",
                    Some("variadic and positional-only parameters are not supported"),
                    self.peek().span,
                ));
            }
            let name = self.name("parameter name")?;
            let mut children = Vec::new();
            if self.eat(":") {
                children.push(self.test()?);
            }
            if self.at("=") {
                return Err(self.errors.invalid_syntax(
                    "parameter",
                    Some("default parameter values are not supported"),
                    self.peek().span,
                ));
            }
            params.push(self.named(SyntaxKind::Param, param_start, name.text, children));
            if !self.eat(",") {
                break;
            }
        }
        self.expect(")")?;
        Ok(self.node(SyntaxKind::Parameters, start, params))
    }

    fn suite(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let mut statements = Vec::new();
        if self.at_kind(TokenKind::Newline) {
            self.bump();
            if !self.at_kind(TokenKind::Indent) {
                return Err(self.unexpected("an indented block"));
            }
            self.bump();
            while !matches!(self.peek().kind, TokenKind::Dedent | TokenKind::Eof) {
                if self.at_kind(TokenKind::Newline) {
                    self.bump();
                    continue;
                }
                self.statement(&mut statements)?;
            }
            if self.at_kind(TokenKind::Dedent) {
                self.bump();
            }
        } else {
            self.simple_statements(&mut statements)?;
        }
        Ok(self.node(SyntaxKind::Suite, start, statements))
    }

    fn classdef(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        self.bump();
        let name = self.name("class name")?;
        let mut children = Vec::new();
        if self.eat("(") {
            while !self.at(")") {
                children.push(self.test()?);
                if !self.eat(",") {
                    break;
                }
            }
            self.expect(")")?;
        }
        self.expect(":")?;
        children.push(self.suite()?);
        Ok(self.named(SyntaxKind::ClassDef, start, name.text, children))
    }

    fn if_statement(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        self.bump();
        let mut children = vec![self.test()?];
        self.expect(":")?;
        children.push(self.suite()?);
        while self.eat("elif") {
            children.push(self.test()?);
            self.expect(":")?;
            children.push(self.suite()?);
        }
        if self.eat("else") {
            self.expect(":")?;
            children.push(self.suite()?);
        }
        Ok(self.node(SyntaxKind::If, start, children))
    }

    fn while_statement(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        self.bump();
        let mut children = vec![self.test()?];
        self.expect(":")?;
        children.push(self.suite()?);
        if self.eat("else") {
            self.expect(":")?;
            children.push(self.suite()?);
        }
        Ok(self.node(SyntaxKind::While, start, children))
    }

    fn for_statement(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        self.bump();
        let targets_start = self.pos;
        let mut targets = vec![self.expr()?];
        while self.eat(",") {
            if self.at("in") {
                break;
            }
            targets.push(self.expr()?);
        }
        let targets = self.node(SyntaxKind::TestList, targets_start, targets);
        self.expect("in")?;
        let mut children = vec![targets, self.testlist()?];
        self.expect(":")?;
        children.push(self.suite()?);
        if self.eat("else") {
            self.expect(":")?;
            children.push(self.suite()?);
        }
        Ok(self.node(SyntaxKind::For, start, children))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn testlist(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let mut items = vec![self.test()?];
        while self.eat(",") {
            if !self.at_expression_start() {
                break;
            }
            items.push(self.test()?);
        }
        Ok(self.node(SyntaxKind::TestList, start, items))
    }

    fn test(&mut self) -> ParseResult<SyntaxNode> {
        if self.at("lambda") {
            return self.lambda();
        }
        let start = self.pos;
        let then = self.or_test()?;
        if !self.eat("if") {
            return Ok(then);
        }
        let condition = self.or_test()?;
        self.expect("else")?;
        let otherwise = self.test()?;
        Ok(self.node(SyntaxKind::IfExpr, start, vec![then, condition, otherwise]))
    }

    fn lambda(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        self.bump();
        while !self.at(":") {
            self.name("parameter name")?;
            if !self.eat(",") {
                break;
            }
        }
        self.expect(":")?;
        let body = self.test()?;
        Ok(self.node(SyntaxKind::Lambda, start, vec![body]))
    }

    fn keyword_chain(
        &mut self,
        kind: SyntaxKind,
        keyword: &str,
        operand: fn(&mut Self) -> ParseResult<SyntaxNode>,
    ) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let first = operand(self)?;
        if !self.at(keyword) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(keyword) {
            operands.push(operand(self)?);
        }
        Ok(self.node(kind, start, operands))
    }

    fn or_test(&mut self) -> ParseResult<SyntaxNode> {
        self.keyword_chain(SyntaxKind::Or, "or", Self::and_test)
    }

    fn and_test(&mut self) -> ParseResult<SyntaxNode> {
        self.keyword_chain(SyntaxKind::And, "and", Self::not_test)
    }

    fn not_test(&mut self) -> ParseResult<SyntaxNode> {
        if !self.at("not") {
            return self.comparison();
        }
        let start = self.pos;
        self.bump();
        let operand = self.not_test()?;
        Ok(self.node(SyntaxKind::Not, start, vec![operand]))
    }

    fn comparison(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let first = self.expr()?;
        let mut children = Vec::new();
        while let Some(operator) = self.comparison_operator() {
            children.push(operator);
            children.push(self.expr()?);
        }
        if children.is_empty() {
            return Ok(first);
        }
        children.insert(0, first);
        Ok(self.node(SyntaxKind::Comparison, start, children))
    }

    fn comparison_operator(&mut self) -> Option<SyntaxNode> {
        let start = self.pos;
        let token = self.peek();
        let operator = if token.kind == TokenKind::Op
            && COMPARISON_OPERATORS.contains(&token.text.as_str())
        {
            token.text.clone()
        } else if token.is("in") {
            "in".to_string()
        } else if token.is("not") && self.peek_at(1).is("in") {
            self.bump();
            "not in".to_string()
        } else if token.is("is") {
            if self.peek_at(1).is("not") {
                self.bump();
                "is not".to_string()
            } else {
                "is".to_string()
            }
        } else {
            return None;
        };
        self.bump();
        Some(self.named(SyntaxKind::CompOp, start, operator, Vec::new()))
    }

    fn binary(
        &mut self,
        operators: &[&str],
        operand: fn(&mut Self) -> ParseResult<SyntaxNode>,
    ) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let mut lhs = operand(self)?;
        while self.at_kind(TokenKind::Op) && operators.contains(&self.peek().text.as_str()) {
            let operator = self.bump().text;
            let rhs = operand(self)?;
            lhs = self.named(SyntaxKind::BinOp, start, operator, vec![lhs, rhs]);
        }
        Ok(lhs)
    }

    fn expr(&mut self) -> ParseResult<SyntaxNode> {
        self.binary(&["|"], Self::xor_expr)
    }

    fn xor_expr(&mut self) -> ParseResult<SyntaxNode> {
        self.binary(&["^"], Self::and_expr)
    }

    fn and_expr(&mut self) -> ParseResult<SyntaxNode> {
        self.binary(&["&"], Self::shift_expr)
    }

    fn shift_expr(&mut self) -> ParseResult<SyntaxNode> {
        self.binary(&["<<", ">>"], Self::arith_expr)
    }

    fn arith_expr(&mut self) -> ParseResult<SyntaxNode> {
        self.binary(&["+", "-"], Self::term)
    }

    fn term(&mut self) -> ParseResult<SyntaxNode> {
        self.binary(&["*", "/", "//", "%", "@"], Self::factor)
    }

    fn factor(&mut self) -> ParseResult<SyntaxNode> {
        let token = self.peek();
        if token.kind == TokenKind::Op && matches!(token.text.as_str(), "+" | "-" | "~") {
            let start = self.pos;
            let operator = self.bump().text;
            let operand = self.factor()?;
            return Ok(self.named(SyntaxKind::Unary, start, operator, vec![operand]));
        }
        self.power()
    }

    fn power(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let base = self.atom_expr()?;
        if !self.eat("**") {
            return Ok(base);
        }
        let exponent = self.factor()?;
        Ok(self.node(SyntaxKind::Power, start, vec![base, exponent]))
    }

    fn atom_expr(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let mut children = vec![self.atom()?];
        loop {
            let trailer_start = self.pos;
            if self.eat("(") {
                let arguments = self.call_arguments()?;
                children.push(self.node(SyntaxKind::Call, trailer_start, arguments));
            } else if self.eat("[") {
                let index = self.test()?;
                if self.at(":") || self.at(",") {
                    return Err(self.errors.invalid_syntax(
                        "subscript",
                        Some("slices and multi-dimensional subscripts are not supported"),
                        self.peek().span,
                    ));
                }
                self.expect("]")?;
                children.push(self.node(SyntaxKind::Subscript, trailer_start, vec![index]));
            } else if self.eat(".") {
                let field = self.name("attribute name")?;
                children.push(self.named(
                    SyntaxKind::Attribute,
                    trailer_start,
                    field.text,
                    Vec::new(),
                ));
            } else {
                break;
            }
        }

        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Ok(self.node(SyntaxKind::AtomExpr, start, children))
    }

    fn call_arguments(&mut self) -> ParseResult<Vec<SyntaxNode>> {
        let mut arguments = Vec::new();
        while !self.at(")") {
            let keyword_argument =
                self.at_kind(TokenKind::Name) && self.peek_at(1).is("=");
            if keyword_argument || self.at("*") || self.at("**") {
                return Err(self.errors.invalid_syntax(
                    "call argument",
                    Some("only positional arguments are supported"),
                    self.peek().span,
                ));
            }
            arguments.push(self.test()?);
            if !self.eat(",") {
                break;
            }
        }
        self.expect(")")?;
        Ok(arguments)
    }

    fn display_items(&mut self, close: &str, first: SyntaxNode) -> ParseResult<Vec<SyntaxNode>> {
        let mut items = vec![first];
        if self.at("for") {
            return Err(self.errors.invalid_syntax(
                "display",
                Some("comprehensions are not supported"),
                self.peek().span,
            ));
        }
        while self.eat(",") {
            if self.at(close) {
                break;
            }
            items.push(self.test()?);
        }
        self.expect(close)?;
        Ok(items)
    }

    fn atom(&mut self) -> ParseResult<SyntaxNode> {
        let start = self.pos;
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => {
                self.bump();
                Ok(self.node(SyntaxKind::Number, start, Vec::new()))
            }
            TokenKind::Str => {
                let mut parts = Vec::new();
                while self.at_kind(TokenKind::Str) {
                    let part_start = self.pos;
                    self.bump();
                    parts.push(self.node(SyntaxKind::StrPart, part_start, Vec::new()));
                }
                Ok(self.node(SyntaxKind::Str, start, parts))
            }
            TokenKind::Name if !is_keyword(&token.text) => {
                self.bump();
                Ok(self.node(SyntaxKind::Name, start, Vec::new()))
            }
            TokenKind::Op => match token.text.as_str() {
                "..." => {
                    self.bump();
                    Ok(self.node(SyntaxKind::Ellipsis, start, Vec::new()))
                }
                "(" => {
                    self.bump();
                    if self.eat(")") {
                        return Ok(self.node(SyntaxKind::Tuple, start, Vec::new()));
                    }
                    let first = self.test()?;
                    if self.eat(")") {
                        return Ok(first);
                    }
                    let items = self.display_items(")", first)?;
                    Ok(self.node(SyntaxKind::Tuple, start, items))
                }
                "[" => {
                    self.bump();
                    if self.eat("]") {
                        return Ok(self.node(SyntaxKind::List, start, Vec::new()));
                    }
                    let first = self.test()?;
                    let items = self.display_items("]", first)?;
                    Ok(self.node(SyntaxKind::List, start, items))
                }
                "{" => {
                    self.bump();
                    if self.eat("}") {
                        return Ok(self.node(SyntaxKind::Dict, start, Vec::new()));
                    }
                    let first = self.test()?;
                    if !self.eat(":") {
                        let items = self.display_items("}", first)?;
                        return Ok(self.node(SyntaxKind::Set, start, items));
                    }
                    let mut entries = vec![first, self.test()?];
                    while self.eat(",") {
                        if self.at("}") {
                            break;
                        }
                        entries.push(self.test()?);
                        self.expect(":")?;
                        entries.push(self.test()?);
                    }
                    self.expect("}")?;
                    Ok(self.node(SyntaxKind::Dict, start, entries))
                }
                _ => Err(self.unexpected("expression")),
            },
            _ => Err(self.unexpected("expression")),
        }
    }
}
