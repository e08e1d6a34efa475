//! Syntax tree to SSA lowering

use crate::error::CodegenError;
use crate::names::NameAllocator;
use crate::ops;
use indexmap::IndexMap;
use sr_scope::{Field, Literal, ScopeError, ScopeTree, Symbol};
use sr_ssa::{
    BinaryOp, BlockId, Builder, CastOp, Constant, ENTRY_FUNCTION, FunctionId, Global, Linkage,
    Module, Param, Type, Value,
};
use sr_syntax::{ExprStmtForm, SyntaxKind, SyntaxNode};
use tracing::{debug, instrument, trace};

/// Type given to parameters without an annotation
pub const DEFAULT_PARAMETER_TYPE: &str = "int";

/// What a symbol is bound to in the module under construction
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Storage cell holding a value of `ty`
    Cell {
        /// Address of the cell
        pointer: Value,
        /// Stored type
        ty: Type,
        /// Function owning a stack cell; `None` for module globals
        owner: Option<FunctionId>,
    },
    /// A defined function
    Function(FunctionId),
    /// A class and its struct type
    Class(Type),
}

/// An addressable location
#[derive(Debug, Clone, PartialEq)]
struct Place {
    pointer: Value,
    ty: Type,
    /// Source-level name, used to name loads
    name: String,
}

/// Result of lowering an expression
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Value(Value),
    Place(Place),
    Function(FunctionId),
    Class(String),
    /// `None`, `()` and the result of `void` calls
    Unit,
}

#[derive(Debug, Clone, Copy)]
struct LoopTarget {
    condition: BlockId,
    end: BlockId,
}

/// A value flowing into the merge block of an `or`/`and` chain
struct Edge {
    value: Value,
    truth: Value,
    block: BlockId,
}

/// Lowers one compilation unit into a [`Module`].
///
/// A generator owns its scope tree and name counters, so it is consumed by
/// [`CodeGenerator::generate`]; each unit needs a fresh one.
#[derive(Debug)]
pub struct CodeGenerator {
    builder: Builder,
    scopes: ScopeTree<Binding>,
    names: NameAllocator,
    loops: Vec<LoopTarget>,
    entry: Option<FunctionId>,
}

impl CodeGenerator {
    /// Creates a generator for a module called `module_name`
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            builder: Builder::new(module_name),
            scopes: ScopeTree::with_builtins("global"),
            names: NameAllocator::new(),
            loops: Vec::new(),
            entry: None,
        }
    }

    /// Lowers the `FileInput` tree `root`, stopping at the first fault
    #[instrument(skip_all)]
    pub fn generate(mut self, root: &SyntaxNode) -> Result<Module, CodegenError> {
        let entry = self.builder.add_function(
            ENTRY_FUNCTION,
            Vec::new(),
            Type::Void,
            Linkage::External,
        )?;
        let block = self.builder.append_block(entry, "entry")?;
        self.builder.position_at_end(entry, block);
        self.entry = Some(entry);

        self.statements(&root.children)?;
        self.finish_entry()?;

        let module = self.builder.finish();
        debug!(
            module = %module.name,
            functions = module.functions.len(),
            globals = module.globals.len(),
            "generated module"
        );
        Ok(module)
    }

    /// Closes the module entry function unless it already returned
    fn finish_entry(&mut self) -> Result<(), CodegenError> {
        if !self.builder.is_terminated() {
            self.builder.ret(None)?;
        }
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn current_function(&self) -> Result<FunctionId, CodegenError> {
        Ok(self
            .builder
            .current_function()
            .ok_or(sr_ssa::BuildError::NoInsertionPoint)?)
    }

    fn current_block(&self) -> Result<BlockId, CodegenError> {
        Ok(self
            .builder
            .current_block()
            .ok_or(sr_ssa::BuildError::NoInsertionPoint)?)
    }

    fn at_module_scope(&self) -> bool {
        self.entry.is_some()
            && self.builder.current_function() == self.entry
            && self.scopes.current() == self.scopes.root()
    }

    fn duplicate(&self, name: &str) -> CodegenError {
        CodegenError::DuplicateSymbol {
            name: name.to_string(),
            scope: self.scopes.scope(self.scopes.current()).name.clone(),
        }
    }

    /// `base`, or `base.N` when the module already uses `base`
    fn unique_symbol(&self, base: &str) -> String {
        let module = self.builder.module();
        if !module.symbol_exists(base) {
            return base.to_string();
        }
        (1_u32..)
            .map(|suffix| format!("{base}.{suffix}"))
            .find(|candidate| !module.symbol_exists(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Machine type for a type annotation
    fn resolve_type(&self, name: &str) -> Result<Type, CodegenError> {
        let symbol = self
            .scopes
            .lookup(name)
            .ok_or_else(|| CodegenError::UnknownType(name.to_string()))?;
        if let Some(Binding::Class(ty)) = &symbol.storage {
            return Ok(ty.clone());
        }
        // `-> None` reads as `-> NoneType`
        if symbol.literal == Some(Literal::None) {
            return Ok(Type::Void);
        }
        if !symbol.is_type() {
            return Err(CodegenError::UnknownType(name.to_string()));
        }
        match name {
            "int" => Ok(Type::I32),
            "float" => Ok(Type::Float),
            "bool" => Ok(Type::BOOL),
            "str" => Ok(Type::Ptr),
            "NoneType" => Ok(Type::Void),
            _ => Err(CodegenError::Unrepresentable(name.to_string())),
        }
    }

    /// Like [`Self::resolve_type`], rejecting `void`
    fn resolve_value_type(&self, name: &str) -> Result<Type, CodegenError> {
        let ty = self.resolve_type(name)?;
        if ty.is_void() {
            return Err(CodegenError::Unrepresentable(name.to_string()));
        }
        Ok(ty)
    }

    /// Declares `name` in the current scope with fresh storage.
    ///
    /// Module-level variables live in internal globals so every function
    /// can reach them; everything else gets a stack cell.
    fn declare_variable(
        &mut self,
        name: &str,
        ty: Type,
        type_name: &str,
    ) -> Result<Value, CodegenError> {
        if self.scopes.contains_local(name) {
            return Err(self.duplicate(name));
        }
        let (pointer, owner) = if self.at_module_scope() {
            let initializer = Constant::zero_of(&ty)
                .ok_or_else(|| CodegenError::Unrepresentable(type_name.to_string()))?;
            let symbol = self.unique_symbol(name);
            let id = self.builder.add_global(Global {
                name: symbol,
                ty: ty.clone(),
                initializer,
                constant: false,
                linkage: Linkage::Internal,
                unnamed_addr: false,
            })?;
            (Value::global(id), None)
        } else {
            let cell = self.builder.alloca(ty.clone(), &self.names.cell(name))?;
            (cell, self.builder.current_function())
        };
        trace!(name, %ty, global = owner.is_none(), "declare variable");
        self.scopes
            .insert(Symbol::variable(name, type_name).with_storage(Binding::Cell {
                pointer: pointer.clone(),
                ty,
                owner,
            }))?;
        Ok(pointer)
    }

    /// Storage of the variable `name`, if it has any
    fn lookup_cell(&self, name: &str) -> Result<Option<Place>, CodegenError> {
        let Some(symbol) = self.scopes.lookup(name) else {
            return Ok(None);
        };
        let Some(Binding::Cell { pointer, ty, owner }) = &symbol.storage else {
            return Ok(None);
        };
        let current = self.builder.current_function();
        if owner.is_some_and(|function| Some(function) != current) {
            return Err(CodegenError::Capture(name.to_string()));
        }
        Ok(Some(Place {
            pointer: pointer.clone(),
            ty: ty.clone(),
            name: name.to_string(),
        }))
    }

    /// Materializes an operand as a first-class value
    fn rvalue(&mut self, operand: Operand) -> Result<Value, CodegenError> {
        match operand {
            Operand::Value(value) => Ok(value),
            Operand::Place(place) => {
                let name = self.names.load(&place.name);
                Ok(self.builder.load(place.ty, place.pointer, &name)?)
            }
            Operand::Function(function) => Ok(Value::function(function)),
            Operand::Class(class) => Err(CodegenError::mismatch(
                "a value",
                format!("class {class}"),
            )),
            Operand::Unit => Err(CodegenError::mismatch("a value", "NoneType")),
        }
    }

    fn evaluate(&mut self, node: &SyntaxNode) -> Result<Value, CodegenError> {
        let operand = self.expression(node)?;
        self.rvalue(operand)
    }

    /// Converts `value` to `to`: `i1` widens by zero extension and integers
    /// become floats by signed conversion
    fn coerce(&mut self, value: Value, to: &Type) -> Result<Value, CodegenError> {
        if &value.ty == to {
            return Ok(value);
        }
        match (&value.ty, to) {
            (Type::Int(from), Type::Int(into)) if from < into => {
                if let Some(Constant::Int { bits, value: number }) = value.as_constant() {
                    let mask = if *bits >= 64 { u64::MAX } else { (1_u64 << bits) - 1 };
                    return Ok(Value::int(*into, (*number as u64 & mask) as i64));
                }
                let name = self.names.temporary("zext");
                Ok(self.builder.cast(CastOp::ZExt, value, to.clone(), &name)?)
            }
            (Type::Int(bits), Type::Float) => {
                let value = if *bits == 1 {
                    self.coerce(value, &Type::I32)?
                } else {
                    value
                };
                if let Some(Constant::Int { value: number, .. }) = value.as_constant() {
                    return Ok(Value::float(*number as f64));
                }
                let name = self.names.temporary("sitofp");
                Ok(self.builder.cast(CastOp::SIToFP, value, Type::Float, &name)?)
            }
            _ => Err(CodegenError::mismatch(to, &value.ty)),
        }
    }

    /// Brings two numeric operands to their common type
    fn unify(
        &mut self,
        lhs: Value,
        rhs: Value,
        operator: &str,
    ) -> Result<(Value, Value), CodegenError> {
        let ty = common_type(&lhs.ty, &rhs.ty)
            .filter(|ty| ty.is_int() || ty.is_float())
            .ok_or_else(|| unsupported(operator, &lhs.ty, &rhs.ty))?;
        Ok((self.coerce(lhs, &ty)?, self.coerce(rhs, &ty)?))
    }

    /// Truth value of `value` as an `i1`
    fn truthiness(&mut self, value: Value) -> Result<Value, CodegenError> {
        let zero = match &value.ty {
            Type::Int(1) => return Ok(value),
            Type::Int(bits) => Value::int(*bits, 0),
            Type::Float => {
                let name = self.names.temporary("cond");
                let truth = self.builder.fcmp(
                    sr_ssa::FloatPredicate::One,
                    value,
                    Value::float(0.0),
                    &name,
                )?;
                return Ok(truth);
            }
            Type::Ptr => Value::constant(Constant::Null),
            other => return Err(CodegenError::mismatch("bool", other)),
        };
        let name = self.names.temporary("cond");
        Ok(self
            .builder
            .icmp(sr_ssa::IntPredicate::Ne, value, zero, &name)?)
    }

    fn condition(&mut self, node: &SyntaxNode) -> Result<Value, CodegenError> {
        let value = self.evaluate(node)?;
        self.truthiness(value)
    }

    /// Aggregate of `ty` holding `values`; a constant when every value is
    fn aggregate(&mut self, ty: Type, values: Vec<Value>) -> Result<Value, CodegenError> {
        let constants: Option<Vec<Constant>> = values
            .iter()
            .map(|value| value.as_constant().cloned())
            .collect();
        if let Some(constants) = constants {
            let constant = match &ty {
                Type::Array { element, .. } => Constant::Array {
                    element: element.as_ref().clone(),
                    elements: constants,
                },
                _ => Constant::Struct {
                    ty,
                    fields: constants,
                },
            };
            return Ok(Value::constant(constant));
        }

        let mut aggregate = Value::constant(Constant::Undef(ty));
        for (index, value) in (0_u32..).zip(values) {
            let name = self.names.temporary("insert");
            aggregate = self
                .builder
                .insert_element(aggregate, value, index, &name)?;
        }
        Ok(aggregate)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn statements(&mut self, statements: &[SyntaxNode]) -> Result<(), CodegenError> {
        for (index, statement) in statements.iter().enumerate() {
            if self.builder.is_terminated() {
                trace!(skipped = statements.len() - index, "unreachable statements");
                break;
            }
            self.statement(statement)?;
        }
        Ok(())
    }

    fn statement(&mut self, node: &SyntaxNode) -> Result<(), CodegenError> {
        trace!(kind = ?node.kind, "lower statement");
        match node.kind {
            SyntaxKind::Suite => self.statements(&node.children),
            SyntaxKind::FuncDef => self.function_def(node),
            SyntaxKind::ClassDef => self.class_def(node),
            SyntaxKind::ExprStmt => self.expr_stmt(node),
            SyntaxKind::Return => self.return_stmt(node),
            SyntaxKind::If => self.if_stmt(node),
            SyntaxKind::While => self.while_stmt(node),
            SyntaxKind::Break => self.loop_jump("break"),
            SyntaxKind::Continue => self.loop_jump("continue"),
            SyntaxKind::Pass => Ok(()),
            SyntaxKind::For
            | SyntaxKind::Del
            | SyntaxKind::Global
            | SyntaxKind::Nonlocal
            | SyntaxKind::Assert
            | SyntaxKind::Import => Err(unimplemented(node.kind)),
            _ => Err(CodegenError::Malformed(node.kind)),
        }
    }

    fn expr_stmt(&mut self, node: &SyntaxNode) -> Result<(), CodegenError> {
        let form = node
            .expr_stmt_form()
            .ok_or(CodegenError::Malformed(node.kind))?;
        match form {
            ExprStmtForm::Annotated {
                target,
                annotation,
                value,
            } => {
                self.annotated(target, annotation, value)?;
            }
            ExprStmtForm::Augmented {
                target,
                operator,
                value,
            } => {
                self.augmented(target, operator, value)?;
            }
            ExprStmtForm::Assign { targets, value } => {
                self.assign(targets, value)?;
            }
            ExprStmtForm::Expr(expression) => {
                self.expression(expression)?;
            }
        }
        Ok(())
    }

    /// `x: T [= value]`
    fn annotated(
        &mut self,
        target: &SyntaxNode,
        annotation: &SyntaxNode,
        value: Option<&SyntaxNode>,
    ) -> Result<Value, CodegenError> {
        let target = single_target(target)?;
        if target.kind != SyntaxKind::Name {
            return Err(CodegenError::Unimplemented(
                "annotated assignment to an expression".to_string(),
            ));
        }
        let ty = self.resolve_value_type(&annotation.text)?;
        let initial = match value {
            Some(value) => {
                let initial = self.evaluate(value)?;
                self.coerce(initial, &ty)?
            }
            None => Value::constant(
                Constant::zero_of(&ty)
                    .ok_or_else(|| CodegenError::Unrepresentable(annotation.text.clone()))?,
            ),
        };
        let pointer = self.declare_variable(&target.text, ty, &annotation.text)?;
        self.builder.store(initial.clone(), pointer)?;
        Ok(initial)
    }

    /// `target op= value`, returning the stored result
    fn augmented(
        &mut self,
        target: &SyntaxNode,
        operator: &str,
        value: &SyntaxNode,
    ) -> Result<Value, CodegenError> {
        let target = single_target(target)?;
        let undefined = || CodegenError::UndefinedVariable(target.text.clone());
        let place = if target.kind == SyntaxKind::Name {
            self.lookup_cell(&target.text)?.ok_or_else(undefined)?
        } else {
            match self.expression(target)? {
                Operand::Place(place) => place,
                _ => return Err(undefined()),
            }
        };

        let name = self.names.load(&place.name);
        let current = self
            .builder
            .load(place.ty.clone(), place.pointer.clone(), &name)?;
        let rhs = self.evaluate(value)?;
        let result = self.arithmetic(ops::augmented_operator(operator), current, rhs)?;
        let result = self.coerce(result, &place.ty)?;
        self.builder.store(result.clone(), place.pointer)?;
        Ok(result)
    }

    /// `t1 = t2 = value`: one evaluation, then each target left to right,
    /// reloading after every store
    fn assign(
        &mut self,
        targets: &[SyntaxNode],
        value: &SyntaxNode,
    ) -> Result<Value, CodegenError> {
        let mut value = self.evaluate(value)?;
        for target in targets {
            let target = single_target(target)?;
            value = self.assign_to(target, value)?;
        }
        Ok(value)
    }

    fn assign_to(&mut self, target: &SyntaxNode, value: Value) -> Result<Value, CodegenError> {
        let place = if target.kind == SyntaxKind::Name {
            if let Some(place) = self.lookup_cell(&target.text)? {
                place
            } else if self.scopes.lookup(&target.text).is_some() {
                return Err(CodegenError::NotAssignable(target.text.clone()));
            } else {
                let ty = value.ty.clone();
                let pointer = self.declare_variable(&target.text, ty.clone(), &type_name(&ty))?;
                Place {
                    pointer,
                    ty,
                    name: target.text.clone(),
                }
            }
        } else {
            match self.expression(target)? {
                Operand::Place(place) => place,
                _ => return Err(CodegenError::NotAssignable(target.text.clone())),
            }
        };

        let stored = self.coerce(value, &place.ty)?;
        self.builder.store(stored, place.pointer.clone())?;
        let name = self.names.load(&place.name);
        Ok(self.builder.load(place.ty, place.pointer, &name)?)
    }

    fn return_stmt(&mut self, node: &SyntaxNode) -> Result<(), CodegenError> {
        let function = self.current_function()?;
        let return_type = self.builder.function(function)?.return_type.clone();
        let Some(expression) = node.return_value() else {
            if !return_type.is_void() {
                return Err(CodegenError::mismatch(return_type, "NoneType"));
            }
            self.builder.ret(None)?;
            return Ok(());
        };

        let operand = self.expression(expression)?;
        if return_type.is_void() {
            if operand == Operand::Unit {
                self.builder.ret(None)?;
                return Ok(());
            }
            let value = self.rvalue(operand)?;
            return Err(CodegenError::mismatch("NoneType", value.ty));
        }
        let value = self.rvalue(operand)?;
        let value = self.coerce(value, &return_type)?;
        self.builder.ret(Some(value))?;
        Ok(())
    }

    fn loop_jump(&mut self, keyword: &'static str) -> Result<(), CodegenError> {
        let target = self
            .loops
            .last()
            .copied()
            .ok_or(CodegenError::OutsideLoop(keyword))?;
        let block = if keyword == "break" {
            target.end
        } else {
            target.condition
        };
        self.builder.br(block)?;
        Ok(())
    }

    fn if_stmt(&mut self, node: &SyntaxNode) -> Result<(), CodegenError> {
        let function = self.current_function()?;
        // Blocks that fall through to `if.end`, branched once it exists
        let mut open = Vec::new();

        for branch in node.if_branches() {
            let condition = self.condition(branch.condition)?;
            let then_block = self.builder.append_block(function, "if.then")?;
            let else_block = self.builder.append_block(function, "if.else")?;
            self.builder.cond_br(condition, then_block, else_block)?;

            self.builder.position_at_end(function, then_block);
            self.statement(branch.body)?;
            if !self.builder.is_terminated() {
                open.push(self.current_block()?);
            }
            self.builder.position_at_end(function, else_block);
        }

        if let Some(body) = node.else_body() {
            self.statement(body)?;
        }
        if !self.builder.is_terminated() {
            open.push(self.current_block()?);
        }
        if open.is_empty() {
            // Every path returned or jumped; the rest of the suite is dead
            return Ok(());
        }

        let end = self.builder.append_block(function, "if.end")?;
        for block in open {
            self.builder.position_at_end(function, block);
            self.builder.br(end)?;
        }
        self.builder.position_at_end(function, end);
        Ok(())
    }

    fn while_stmt(&mut self, node: &SyntaxNode) -> Result<(), CodegenError> {
        if node.loop_else().is_some() {
            return Err(CodegenError::Unimplemented("`while ... else`".to_string()));
        }
        let (Some(condition), Some(body)) = (node.loop_condition(), node.loop_body()) else {
            return Err(CodegenError::Malformed(node.kind));
        };

        let function = self.current_function()?;
        let condition_block = self.builder.append_block(function, "while.cond")?;
        self.builder.br(condition_block)?;
        self.builder.position_at_end(function, condition_block);
        let truth = self.condition(condition)?;
        let body_block = self.builder.append_block(function, "while.body")?;
        let end = self.builder.append_block(function, "while.end")?;
        self.builder.cond_br(truth, body_block, end)?;

        self.builder.position_at_end(function, body_block);
        self.loops.push(LoopTarget {
            condition: condition_block,
            end,
        });
        self.statement(body)?;
        self.loops.pop();
        if !self.builder.is_terminated() {
            self.builder.br(condition_block)?;
        }
        self.builder.position_at_end(function, end);
        Ok(())
    }

    fn function_def(&mut self, node: &SyntaxNode) -> Result<(), CodegenError> {
        let name = node.name();
        if self.scopes.contains_local(name) {
            return Err(self.duplicate(name));
        }

        let mut params = Vec::new();
        let mut param_types = Vec::new();
        for param in node.parameters() {
            let annotation = param
                .annotation()
                .map_or(DEFAULT_PARAMETER_TYPE, |annotation| annotation.text.as_str());
            params.push(Param {
                name: param.name().to_string(),
                ty: self.resolve_value_type(annotation)?,
            });
            param_types.push(annotation.to_string());
        }
        let return_annotation = node
            .return_annotation()
            .map_or("NoneType", |annotation| annotation.text.as_str());
        let return_type = self.resolve_type(return_annotation)?;

        let symbol = self.unique_symbol(name);
        debug!(name, symbol = %symbol, params = params.len(), "lower function");
        let function = self.builder.add_function(
            &symbol,
            params.clone(),
            return_type.clone(),
            Linkage::External,
        )?;
        // Visible to its own body and to later siblings
        let param_names = params.iter().map(|param| param.name.clone()).collect();
        self.scopes.insert(
            Symbol::function(name, return_annotation, param_names)
                .with_storage(Binding::Function(function)),
        )?;

        let saved_position = self.builder.position();
        let saved_loops = std::mem::take(&mut self.loops);
        let entry = self.builder.append_block(function, "entry")?;
        self.builder.position_at_end(function, entry);
        self.scopes.push(name);

        for ((index, param), annotation) in (0_u32..).zip(&params).zip(&param_types) {
            let cell = self
                .builder
                .alloca(param.ty.clone(), &self.names.argument(&param.name))?;
            let incoming = self.builder.param(index)?;
            self.builder.store(incoming, cell.clone())?;
            self.scopes.insert(
                Symbol::parameter(&param.name, annotation).with_storage(Binding::Cell {
                    pointer: cell,
                    ty: param.ty.clone(),
                    owner: Some(function),
                }),
            )?;
        }

        if let Some(body) = node.body() {
            self.statement(body)?;
        }
        if !self.builder.is_terminated() {
            if return_type.is_void() {
                self.builder.ret(None)?;
            } else {
                self.builder.unreachable()?;
            }
        }

        self.scopes.pop()?;
        self.loops = saved_loops;
        self.builder.set_position(saved_position);
        Ok(())
    }

    /// A class becomes a named struct of its annotated fields
    fn class_def(&mut self, node: &SyntaxNode) -> Result<(), CodegenError> {
        let name = node.name();
        if !node.bases().is_empty() {
            return Err(CodegenError::Unimplemented("class inheritance".to_string()));
        }
        if self.scopes.contains_local(name) {
            return Err(self.duplicate(name));
        }

        let mut fields = IndexMap::new();
        let mut types = Vec::new();
        let body = node.body().map_or(&[][..], |body| body.children.as_slice());
        for statement in body {
            let declaration = match statement.kind {
                SyntaxKind::Pass => continue,
                SyntaxKind::ExprStmt => statement.expr_stmt_form(),
                _ => None,
            };
            let (target, annotation) = match declaration {
                Some(ExprStmtForm::Annotated {
                    target,
                    annotation,
                    value: None,
                }) => (single_target(target)?, annotation),
                Some(ExprStmtForm::Expr(expression)) if is_docstring(expression) => continue,
                _ => {
                    return Err(CodegenError::Unimplemented(
                        "class members other than field declarations".to_string(),
                    ));
                }
            };
            if target.kind != SyntaxKind::Name {
                return Err(CodegenError::Malformed(target.kind));
            }
            if fields.contains_key(&target.text) {
                return Err(CodegenError::DuplicateSymbol {
                    name: target.text.clone(),
                    scope: name.to_string(),
                });
            }
            let index = types.len() as u32;
            types.push(self.resolve_value_type(&annotation.text)?);
            fields.insert(
                target.text.clone(),
                Field {
                    ty: annotation.text.clone(),
                    index,
                },
            );
        }

        debug!(name, fields = types.len(), "lower class");
        let ty = self.builder.declare_struct(name, types)?;
        self.scopes
            .insert(Symbol::class(name, fields).with_storage(Binding::Class(ty)))?;
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expression(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        trace!(kind = ?node.kind, text = %node.text, "lower expression");
        match node.kind {
            SyntaxKind::TestList => match node.children.as_slice() {
                [only] => self.expression(only),
                items => self.tuple(items),
            },
            SyntaxKind::Name => self.name(node),
            SyntaxKind::Number => ops::parse_number(&node.text)
                .map(|constant| Operand::Value(Value::constant(constant)))
                .ok_or_else(|| CodegenError::InvalidLiteral(node.text.clone())),
            SyntaxKind::Str => self.string(node),
            SyntaxKind::Ellipsis => Ok(Operand::Value(Value::int(32, 0))),
            SyntaxKind::Tuple if node.children.is_empty() => Ok(Operand::Unit),
            SyntaxKind::Tuple => self.tuple(&node.children),
            SyntaxKind::List => self.list(&node.children),
            SyntaxKind::Dict => self.dict(node),
            SyntaxKind::IfExpr => self.conditional(node),
            SyntaxKind::Or | SyntaxKind::And => self.short_circuit(node),
            SyntaxKind::Not => self.not(node),
            SyntaxKind::Comparison => self.comparison(node),
            SyntaxKind::BinOp => self.binary(node),
            SyntaxKind::Unary => self.unary(node),
            SyntaxKind::Power => Err(CodegenError::UnsupportedOperator("`**`".to_string())),
            SyntaxKind::AtomExpr => self.atom_expr(node),
            SyntaxKind::Lambda | SyntaxKind::Set => Err(unimplemented(node.kind)),
            _ => Err(CodegenError::Malformed(node.kind)),
        }
    }

    fn name(&self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let name = node.text.as_str();
        if let Some(place) = self.lookup_cell(name)? {
            return Ok(Operand::Place(place));
        }
        let undefined = || CodegenError::UndefinedReference(name.to_string());
        let symbol = self.scopes.lookup(name).ok_or_else(undefined)?;
        match (&symbol.literal, &symbol.storage) {
            (Some(Literal::Bool(value)), _) => Ok(Operand::Value(Value::bool(*value))),
            (Some(Literal::None), _) => Ok(Operand::Unit),
            (None, Some(Binding::Function(function))) => Ok(Operand::Function(*function)),
            (None, Some(Binding::Class(_))) => Ok(Operand::Class(name.to_string())),
            _ => Err(undefined()),
        }
    }

    /// String literal as a pointer to a private NUL-terminated global
    fn string(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let mut bytes = node.string_value().into_bytes();
        bytes.push(0);
        let base = self.names.next("strtmp");
        let symbol = self.unique_symbol(&base);
        let initializer = Constant::Bytes(bytes);
        let id = self.builder.add_global(Global {
            name: symbol,
            ty: initializer.ty(),
            initializer,
            constant: true,
            linkage: Linkage::Private,
            unnamed_addr: true,
        })?;
        Ok(Operand::Value(Value::global(id)))
    }

    fn tuple(&mut self, items: &[SyntaxNode]) -> Result<Operand, CodegenError> {
        let values = items
            .iter()
            .map(|item| self.evaluate(item))
            .collect::<Result<Vec<_>, _>>()?;
        let ty = Type::Struct(values.iter().map(|value| value.ty.clone()).collect());
        Ok(Operand::Value(self.aggregate(ty, values)?))
    }

    fn list(&mut self, items: &[SyntaxNode]) -> Result<Operand, CodegenError> {
        let values = items
            .iter()
            .map(|item| self.evaluate(item))
            .collect::<Result<Vec<_>, _>>()?;
        let element = values.first().map_or(Type::I32, |first| first.ty.clone());
        if let Some(other) = values.iter().find(|value| value.ty != element) {
            return Err(CodegenError::mismatch(&element, &other.ty));
        }
        let ty = Type::array(element, values.len() as u64);
        Ok(Operand::Value(self.aggregate(ty, values)?))
    }

    /// Dict literals flatten to a struct of the keys followed by the values
    fn dict(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for (key, value) in node.dict_entries() {
            keys.push(self.evaluate(key)?);
            values.push(self.evaluate(value)?);
        }
        keys.append(&mut values);
        let ty = Type::Struct(keys.iter().map(|value| value.ty.clone()).collect());
        Ok(Operand::Value(self.aggregate(ty, keys)?))
    }

    /// `then if condition else otherwise`
    fn conditional(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let (then_node, condition, else_node) = node
            .conditional_parts()
            .ok_or(CodegenError::Malformed(node.kind))?;
        let function = self.current_function()?;
        let truth = self.condition(condition)?;
        let then_block = self.builder.append_block(function, "ifexp.then")?;
        let else_block = self.builder.append_block(function, "ifexp.else")?;
        self.builder.cond_br(truth, then_block, else_block)?;

        self.builder.position_at_end(function, then_block);
        let then_value = self.evaluate(then_node)?;
        let then_end = self.current_block()?;

        self.builder.position_at_end(function, else_block);
        let else_value = self.evaluate(else_node)?;
        let ty = common_type(&then_value.ty, &else_value.ty)
            .ok_or_else(|| CodegenError::mismatch(&then_value.ty, &else_value.ty))?;
        let else_value = self.coerce(else_value, &ty)?;
        let else_end = self.current_block()?;
        let end = self.builder.append_block(function, "ifexp.end")?;
        self.builder.br(end)?;

        self.builder.position_at_end(function, then_end);
        let then_value = self.coerce(then_value, &ty)?;
        self.builder.br(end)?;

        self.builder.position_at_end(function, end);
        let name = self.names.temporary("ifexp");
        let merged = self
            .builder
            .phi(ty, vec![(then_value, then_end), (else_value, else_end)], &name)?;
        Ok(Operand::Value(merged))
    }

    /// `a or b or c` and `a and b and c`.
    ///
    /// Each further operand is evaluated in its own block, reached only when
    /// the running value does not decide the result. The merge selects the
    /// deciding operand's value; when the operand types differ it selects
    /// their truth values instead.
    fn short_circuit(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let is_or = node.kind == SyntaxKind::Or;
        let keyword = if is_or { "or" } else { "and" };
        let (first, rest) = node
            .children
            .split_first()
            .ok_or(CodegenError::Malformed(node.kind))?;
        let mut value = self.evaluate(first)?;
        if rest.is_empty() {
            return Ok(Operand::Value(value));
        }

        let function = self.current_function()?;
        let mut edges = Vec::new();
        let mut branches = Vec::new();
        for operand in rest {
            let truth = self.truthiness(value.clone())?;
            let block = self.current_block()?;
            let next = self
                .builder
                .append_block(function, &format!("{keyword}.rhs"))?;
            branches.push((block, truth.clone(), next));
            edges.push(Edge {
                value,
                truth,
                block,
            });
            self.builder.position_at_end(function, next);
            value = self.evaluate(operand)?;
        }

        let uniform = edges.iter().all(|edge| edge.value.ty == value.ty);
        let last = if uniform {
            value
        } else {
            self.truthiness(value)?
        };
        let last_block = self.current_block()?;
        let end = self
            .builder
            .append_block(function, &format!("{keyword}.end"))?;
        self.builder.br(end)?;
        for (block, truth, next) in branches {
            self.builder.position_at_end(function, block);
            if is_or {
                self.builder.cond_br(truth, end, next)?;
            } else {
                self.builder.cond_br(truth, next, end)?;
            }
        }

        self.builder.position_at_end(function, end);
        let ty = last.ty.clone();
        let mut incoming: Vec<(Value, BlockId)> = edges
            .into_iter()
            .map(|edge| {
                let merged = if uniform { edge.value } else { edge.truth };
                (merged, edge.block)
            })
            .collect();
        incoming.push((last, last_block));
        let name = self.names.temporary(keyword);
        Ok(Operand::Value(self.builder.phi(ty, incoming, &name)?))
    }

    fn not(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let operand = node.operand().ok_or(CodegenError::Malformed(node.kind))?;
        let value = self.evaluate(operand)?;
        let truth = self.truthiness(value)?;
        if let Some(Constant::Int { value: number, .. }) = truth.as_constant() {
            return Ok(Operand::Value(Value::bool(*number == 0)));
        }
        let name = self.names.temporary("not");
        let inverted = self
            .builder
            .binary(BinaryOp::Xor, truth, Value::bool(true), &name)?;
        Ok(Operand::Value(inverted))
    }

    /// `a < b < c` compares each adjacent pair and ANDs the results
    fn comparison(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let mut operands = node.comparison_operands();
        let operators: Vec<&str> = node.comparison_operators().collect();
        let first = operands.next().ok_or(CodegenError::Malformed(node.kind))?;
        let operand = self.expression(first)?;
        if operators.is_empty() {
            return Ok(operand);
        }

        let mut left = self.rvalue(operand)?;
        let mut result: Option<Value> = None;
        for (operator, right_node) in operators.into_iter().zip(operands) {
            let right = self.evaluate(right_node)?;
            let compared = self.compare(operator, left, right.clone())?;
            result = Some(match result {
                None => compared,
                Some(previous) => {
                    let name = self.names.temporary("and");
                    self.builder
                        .binary(BinaryOp::And, previous, compared, &name)?
                }
            });
            left = right;
        }
        result
            .map(Operand::Value)
            .ok_or(CodegenError::Malformed(node.kind))
    }

    fn compare(&mut self, operator: &str, lhs: Value, rhs: Value) -> Result<Value, CodegenError> {
        if lhs.ty.is_ptr() && rhs.ty.is_ptr() {
            let predicate = ops::pointer_predicate(operator)
                .ok_or_else(|| unsupported(operator, &lhs.ty, &rhs.ty))?;
            let name = self.names.temporary("cmp");
            return Ok(self.builder.icmp(predicate, lhs, rhs, &name)?);
        }
        let (lhs, rhs) = self.unify(lhs, rhs, operator)?;
        let name = self.names.temporary("cmp");
        if lhs.ty.is_float() {
            let predicate = ops::float_predicate(operator)
                .ok_or_else(|| unsupported(operator, &lhs.ty, &rhs.ty))?;
            Ok(self.builder.fcmp(predicate, lhs, rhs, &name)?)
        } else {
            let predicate = ops::int_predicate(operator)
                .ok_or_else(|| unsupported(operator, &lhs.ty, &rhs.ty))?;
            Ok(self.builder.icmp(predicate, lhs, rhs, &name)?)
        }
    }

    fn binary(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let (lhs, rhs) = node
            .binary_operands()
            .ok_or(CodegenError::Malformed(node.kind))?;
        let lhs = self.evaluate(lhs)?;
        let rhs = self.evaluate(rhs)?;
        Ok(Operand::Value(self.arithmetic(&node.text, lhs, rhs)?))
    }

    fn arithmetic(
        &mut self,
        operator: &str,
        lhs: Value,
        rhs: Value,
    ) -> Result<Value, CodegenError> {
        let (lhs, rhs) = self.unify(lhs, rhs, operator)?;
        let entry = if lhs.ty.is_float() {
            ops::float_arithmetic(operator)
        } else {
            ops::int_arithmetic(operator)
        };
        let (op, tag) = entry.ok_or_else(|| unsupported(operator, &lhs.ty, &rhs.ty))?;
        let folded = lhs
            .as_constant()
            .zip(rhs.as_constant())
            .and_then(|(left, right)| ops::fold_binary(op, left, right));
        if let Some(folded) = folded {
            return Ok(Value::constant(folded));
        }
        let name = self.names.temporary(tag);
        Ok(self.builder.binary(op, lhs, rhs, &name)?)
    }

    fn unary(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let operand = node.operand().ok_or(CodegenError::Malformed(node.kind))?;
        if node.text == "-" && operand.kind == SyntaxKind::Number {
            // Negated as one literal so `i32::MIN` stays in range
            let text = format!("-{}", operand.text);
            return ops::parse_number(&text)
                .map(|constant| Operand::Value(Value::constant(constant)))
                .ok_or(CodegenError::InvalidLiteral(text));
        }
        let value = self.evaluate(operand)?;
        let result = match (node.text.as_str(), &value.ty) {
            ("+", Type::Int(_) | Type::Float) => value,
            ("-", Type::Float) => {
                if let Some(Constant::Float(number)) = value.as_constant() {
                    Value::float(-number)
                } else {
                    let name = self.names.temporary("neg");
                    self.builder.fneg(value, &name)?
                }
            }
            ("-", Type::Int(bits)) => {
                let zero = Value::int(*bits, 0);
                self.arithmetic("-", zero, value)?
            }
            ("~", Type::Int(bits)) => {
                let ones = Value::int(*bits, -1);
                self.arithmetic("^", value, ones)?
            }
            (operator, ty) => {
                return Err(CodegenError::UnsupportedOperator(format!(
                    "`{operator}` for `{ty}`"
                )));
            }
        };
        Ok(Operand::Value(result))
    }

    /// A primary expression followed by calls, attributes and subscripts,
    /// applied left to right
    fn atom_expr(&mut self, node: &SyntaxNode) -> Result<Operand, CodegenError> {
        let atom = node.atom().ok_or(CodegenError::Malformed(node.kind))?;
        let mut operand = self.expression(atom)?;
        let mut label = atom.text.clone();
        for trailer in node.trailers() {
            operand = match trailer.kind {
                SyntaxKind::Call => self.call(operand, &label, &trailer.children)?,
                SyntaxKind::Attribute => self.attribute(operand, &label, trailer.name())?,
                SyntaxKind::Subscript => self.subscript(operand, trailer)?,
                other => return Err(CodegenError::Malformed(other)),
            };
            label = match trailer.kind {
                SyntaxKind::Attribute => format!("{label}.{}", trailer.name()),
                SyntaxKind::Call => format!("{label}()"),
                _ => format!("{label}[]"),
            };
        }
        Ok(operand)
    }

    fn call(
        &mut self,
        callee: Operand,
        label: &str,
        arguments: &[SyntaxNode],
    ) -> Result<Operand, CodegenError> {
        let (params, constructed) = match &callee {
            Operand::Function(function) => {
                let signature = self.builder.function(*function)?;
                let params: Vec<Type> = signature
                    .params
                    .iter()
                    .map(|param| param.ty.clone())
                    .collect();
                (params, None)
            }
            Operand::Class(class) => {
                let ty = self.resolve_type(class)?;
                let fields = self
                    .builder
                    .module()
                    .struct_types
                    .get(class)
                    .cloned()
                    .unwrap_or_default();
                (fields, Some(ty))
            }
            _ => return Err(CodegenError::NotCallable(label.to_string())),
        };
        if params.len() != arguments.len() {
            return Err(CodegenError::Arity {
                callee: label.to_string(),
                expected: params.len(),
                found: arguments.len(),
            });
        }

        let mut values = Vec::with_capacity(arguments.len());
        for (argument, ty) in arguments.iter().zip(&params) {
            let value = self.evaluate(argument)?;
            values.push(self.coerce(value, ty)?);
        }

        match (callee, constructed) {
            (Operand::Function(function), _) => {
                let name = self.names.temporary("call");
                let result = self.builder.call(function, values, &name)?;
                Ok(result.map_or(Operand::Unit, Operand::Value))
            }
            (_, Some(ty)) => Ok(Operand::Value(self.aggregate(ty, values)?)),
            _ => Err(CodegenError::NotCallable(label.to_string())),
        }
    }

    fn attribute(
        &mut self,
        operand: Operand,
        label: &str,
        field: &str,
    ) -> Result<Operand, CodegenError> {
        let not_a_structure = || CodegenError::Field(ScopeError::NotAStructure(label.to_string()));
        match operand {
            Operand::Place(place) => {
                let class = struct_name(&place.ty).ok_or_else(not_a_structure)?;
                let (index, field_type) = self.scopes.field_info(&format!("{class}.{field}"))?;
                let ty = self.resolve_value_type(&field_type)?;
                let name = self.names.temporary("gep");
                let pointer = self.builder.gep(
                    place.ty.clone(),
                    place.pointer,
                    vec![Value::int(32, 0), Value::int(32, i64::from(index))],
                    &name,
                )?;
                Ok(Operand::Place(Place {
                    pointer,
                    ty,
                    name: format!("{}.{field}", place.name),
                }))
            }
            Operand::Value(value) => {
                let class = struct_name(&value.ty).ok_or_else(not_a_structure)?;
                let (index, _) = self.scopes.field_info(&format!("{class}.{field}"))?;
                let name = self.names.temporary("field");
                Ok(Operand::Value(self.builder.extract_value(value, index, &name)?))
            }
            _ => Err(not_a_structure()),
        }
    }

    fn subscript(
        &mut self,
        operand: Operand,
        trailer: &SyntaxNode,
    ) -> Result<Operand, CodegenError> {
        let index_node = trailer
            .children
            .first()
            .ok_or(CodegenError::Malformed(trailer.kind))?;
        let index = self.evaluate(index_node)?;
        if !index.ty.is_int() {
            return Err(CodegenError::mismatch(Type::I32, &index.ty));
        }
        let index = self.coerce(index, &Type::I32)?;
        let constant_index = match index.as_constant() {
            Some(Constant::Int { value, .. }) => u32::try_from(*value).ok(),
            _ => None,
        };

        let place = match operand {
            Operand::Place(place) => place,
            Operand::Value(value) => {
                if let Some(position) = constant_index.filter(|_| value.ty.is_aggregate()) {
                    let name = self.names.temporary("item");
                    return Ok(Operand::Value(
                        self.builder.extract_value(value, position, &name)?,
                    ));
                }
                if !matches!(value.ty, Type::Array { .. }) {
                    return Err(CodegenError::mismatch("a subscriptable value", &value.ty));
                }
                // Dynamic indexing needs an address
                let cell = self
                    .builder
                    .alloca(value.ty.clone(), &self.names.temporary("spill"))?;
                self.builder.store(value.clone(), cell.clone())?;
                Place {
                    pointer: cell,
                    ty: value.ty,
                    name: "item".to_string(),
                }
            }
            _ => return Err(CodegenError::mismatch("a subscriptable value", "NoneType")),
        };

        let element = match &place.ty {
            Type::Array { element, .. } => element.as_ref().clone(),
            Type::Struct(_) | Type::Named(_) => {
                let position = constant_index
                    .ok_or_else(|| CodegenError::mismatch("a constant index", &index.ty))?;
                self.builder
                    .module()
                    .element_type(&place.ty, u64::from(position))
                    .ok_or(sr_ssa::BuildError::NoSuchElement {
                        ty: place.ty.to_string(),
                        index: position,
                    })?
            }
            other => return Err(CodegenError::mismatch("a subscriptable value", other)),
        };
        let name = self.names.temporary("gep");
        let pointer = self.builder.gep(
            place.ty.clone(),
            place.pointer,
            vec![Value::int(32, 0), index],
            &name,
        )?;
        Ok(Operand::Place(Place {
            pointer,
            ty: element,
            name: format!("{}.item", place.name),
        }))
    }
}

/// The lone element of an assignment target list
fn single_target(target: &SyntaxNode) -> Result<&SyntaxNode, CodegenError> {
    if target.kind != SyntaxKind::TestList {
        return Ok(target);
    }
    match target.children.as_slice() {
        [only] => Ok(only),
        [] => Err(CodegenError::Malformed(target.kind)),
        _ => Err(CodegenError::Unimplemented("tuple unpacking".to_string())),
    }
}

fn is_docstring(expression: &SyntaxNode) -> bool {
    match expression.children.as_slice() {
        [only] => only.kind == SyntaxKind::Str,
        _ => expression.kind == SyntaxKind::Str,
    }
}

/// Type both operands convert to, if any
fn common_type(lhs: &Type, rhs: &Type) -> Option<Type> {
    match (lhs, rhs) {
        _ if lhs == rhs => Some(lhs.clone()),
        (Type::Int(left), Type::Int(right)) => Some(Type::Int(*left.max(right))),
        (Type::Int(_), Type::Float) | (Type::Float, Type::Int(_)) => Some(Type::Float),
        _ => None,
    }
}

fn struct_name(ty: &Type) -> Option<&str> {
    match ty {
        Type::Named(name) => Some(name),
        _ => None,
    }
}

/// Source-level name of an inferred type
fn type_name(ty: &Type) -> String {
    match ty {
        Type::Int(1) => "bool".to_string(),
        Type::Int(_) => "int".to_string(),
        Type::Float => "float".to_string(),
        Type::Ptr => "str".to_string(),
        Type::Named(name) => name.clone(),
        other => other.to_string(),
    }
}

fn unsupported(operator: &str, lhs: &Type, rhs: &Type) -> CodegenError {
    CodegenError::UnsupportedOperator(format!("`{operator}` between `{lhs}` and `{rhs}`"))
}

fn unimplemented(kind: SyntaxKind) -> CodegenError {
    let construct = match kind {
        SyntaxKind::For => "`for` loop",
        SyntaxKind::Del => "`del`",
        SyntaxKind::Global => "`global`",
        SyntaxKind::Nonlocal => "`nonlocal`",
        SyntaxKind::Assert => "`assert`",
        SyntaxKind::Import => "`import`",
        SyntaxKind::Lambda => "`lambda`",
        SyntaxKind::Set => "set literal",
        _ => "this construct",
    };
    CodegenError::Unimplemented(construct.to_string())
}
