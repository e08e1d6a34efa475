//! Structural verifier
//!
//! Checks that every block of a defined function is terminated, that every
//! reference points at something that exists, and that operand types agree
//! with what each instruction expects. Dominance is not checked.

use crate::{
    BasicBlock, BlockId, CastOp, Function, Instruction, InstructionKind, Module, Terminator,
    Type, Value, ValueKind,
};
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::debug;

/// Structural problems found in a module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// A block without a terminator
    #[error("block `{block}` in `{function}` has no terminator")]
    MissingTerminator {
        /// Function name
        function: String,
        /// Block label
        block: String,
    },

    /// A reference to a block, register, parameter, global or function that
    /// does not exist
    #[error("dangling {what} in `{function}`")]
    Dangling {
        /// Function name
        function: String,
        /// Description of the reference
        what: String,
    },

    /// A register defined by more than one instruction
    #[error("register `{name}` in `{function}` is defined more than once")]
    Redefined {
        /// Function name
        function: String,
        /// Register name
        name: String,
    },

    /// Operand types that do not fit the instruction
    #[error("type error in `{function}`, block `{block}`: {message}")]
    Type {
        /// Function name
        function: String,
        /// Block label
        block: String,
        /// Description
        message: String,
    },

    /// A `phi` that is misplaced or disagrees with the block's predecessors
    #[error("malformed phi in `{function}`, block `{block}`: {message}")]
    Phi {
        /// Function name
        function: String,
        /// Block label
        block: String,
        /// Description
        message: String,
    },

    /// Two functions or globals sharing a symbol name
    #[error("symbol `{0}` is defined more than once")]
    DuplicateSymbol(String),
}

/// Verifies every function of `module`, stopping at the first problem
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    let mut symbols = FxHashSet::default();
    for name in module
        .globals
        .iter()
        .map(|global| &global.name)
        .chain(module.functions.iter().map(|function| &function.name))
    {
        if !symbols.insert(name.as_str()) {
            return Err(VerifyError::DuplicateSymbol(name.clone()));
        }
    }

    for global in &module.globals {
        if global.initializer.ty() != global.ty {
            return Err(VerifyError::Type {
                function: global.name.clone(),
                block: String::new(),
                message: format!(
                    "initializer of type `{}` for global of type `{}`",
                    global.initializer.ty(),
                    global.ty
                ),
            });
        }
    }

    for function in &module.functions {
        FunctionVerifier::new(module, function).verify()?;
    }
    debug!(functions = module.functions.len(), "module verified");
    Ok(())
}

struct FunctionVerifier<'a> {
    module: &'a Module,
    function: &'a Function,
    block: &'a str,
}

impl<'a> FunctionVerifier<'a> {
    fn new(module: &'a Module, function: &'a Function) -> Self {
        Self {
            module,
            function,
            block: "",
        }
    }

    fn dangling(&self, what: String) -> VerifyError {
        VerifyError::Dangling {
            function: self.function.name.clone(),
            what,
        }
    }

    fn type_error(&self, message: String) -> VerifyError {
        VerifyError::Type {
            function: self.function.name.clone(),
            block: self.block.to_string(),
            message,
        }
    }

    fn phi_error(&self, message: &str) -> VerifyError {
        VerifyError::Phi {
            function: self.function.name.clone(),
            block: self.block.to_string(),
            message: message.to_string(),
        }
    }

    fn verify(mut self) -> Result<(), VerifyError> {
        if self.function.is_declaration() {
            return Ok(());
        }

        let mut defined = FxHashSet::default();
        for block in &self.function.blocks {
            for instruction in &block.instructions {
                if let Some(result) = instruction.result {
                    let local = self
                        .function
                        .local(result)
                        .ok_or_else(|| self.dangling(format!("register #{}", result.0)))?;
                    if !defined.insert(result) {
                        return Err(VerifyError::Redefined {
                            function: self.function.name.clone(),
                            name: local.name.clone(),
                        });
                    }
                }
            }
        }

        let function = self.function;
        for (index, block) in function.blocks.iter().enumerate() {
            self.block = &block.label;
            self.verify_block(BlockId(index as u32), block)?;
        }
        Ok(())
    }

    fn verify_block(&self, id: BlockId, block: &BasicBlock) -> Result<(), VerifyError> {
        let terminator = block
            .terminator
            .as_ref()
            .ok_or_else(|| VerifyError::MissingTerminator {
                function: self.function.name.clone(),
                block: block.label.clone(),
            })?;

        let mut leading_phis = true;
        for instruction in &block.instructions {
            let is_phi = matches!(instruction.kind, InstructionKind::Phi { .. });
            if is_phi && !leading_phis {
                return Err(self.phi_error("phi after a non-phi instruction"));
            }
            leading_phis &= is_phi;
            self.verify_instruction(id, instruction)?;
        }
        self.verify_terminator(terminator)
    }

    fn check_block(&self, id: BlockId) -> Result<(), VerifyError> {
        self.function
            .block(id)
            .map(|_| ())
            .ok_or_else(|| self.dangling(format!("block #{}", id.0)))
    }

    /// Checks that `value` refers to something that exists and has the type
    /// it claims
    fn check_value(&self, value: &Value) -> Result<(), VerifyError> {
        let actual = match &value.kind {
            ValueKind::Constant(constant) => constant.ty(),
            ValueKind::Local(id) => self
                .function
                .local(*id)
                .ok_or_else(|| self.dangling(format!("register #{}", id.0)))?
                .ty
                .clone(),
            ValueKind::Param(index) => self
                .function
                .params
                .get(*index as usize)
                .ok_or_else(|| self.dangling(format!("parameter #{index}")))?
                .ty
                .clone(),
            ValueKind::Global(id) => {
                self.module
                    .global(*id)
                    .ok_or_else(|| self.dangling(format!("global #{}", id.0)))?;
                Type::Ptr
            }
            ValueKind::Function(id) => {
                self.module
                    .function(*id)
                    .ok_or_else(|| self.dangling(format!("function #{}", id.0)))?;
                Type::Ptr
            }
        };
        if actual == value.ty {
            Ok(())
        } else {
            Err(self.type_error(format!(
                "operand claims type `{}` but has type `{actual}`",
                value.ty
            )))
        }
    }

    fn expect_type(&self, value: &Value, expected: &Type, what: &str) -> Result<(), VerifyError> {
        self.check_value(value)?;
        if value.ty == *expected {
            Ok(())
        } else {
            Err(self.type_error(format!(
                "{what} has type `{}`, expected `{expected}`",
                value.ty
            )))
        }
    }

    fn verify_instruction(
        &self,
        block: BlockId,
        instruction: &Instruction,
    ) -> Result<(), VerifyError> {
        match &instruction.kind {
            InstructionKind::Alloca { ty } => {
                if ty.is_void() {
                    return Err(self.type_error("alloca of void".into()));
                }
            }
            InstructionKind::Load { ty, pointer } => {
                self.expect_type(pointer, &Type::Ptr, "load address")?;
                if ty.is_void() {
                    return Err(self.type_error("load of void".into()));
                }
            }
            InstructionKind::Store { value, pointer } => {
                self.check_value(value)?;
                self.expect_type(pointer, &Type::Ptr, "store address")?;
            }
            InstructionKind::Binary { op, lhs, rhs } => {
                self.check_value(lhs)?;
                self.expect_type(rhs, &lhs.ty, "right operand")?;
                let fits = if op.is_float() {
                    lhs.ty.is_float()
                } else {
                    lhs.ty.is_int()
                };
                if !fits {
                    return Err(self.type_error(format!(
                        "`{}` applied to `{}`",
                        op.mnemonic(),
                        lhs.ty
                    )));
                }
            }
            InstructionKind::FNeg { operand } => {
                self.expect_type(operand, &Type::Float, "fneg operand")?;
            }
            InstructionKind::ICmp { lhs, rhs, .. } => {
                self.check_value(lhs)?;
                self.expect_type(rhs, &lhs.ty, "right operand")?;
                if !lhs.ty.is_int() && !lhs.ty.is_ptr() {
                    return Err(self.type_error(format!("icmp on `{}`", lhs.ty)));
                }
            }
            InstructionKind::FCmp { lhs, rhs, .. } => {
                self.expect_type(lhs, &Type::Float, "left operand")?;
                self.expect_type(rhs, &Type::Float, "right operand")?;
            }
            InstructionKind::Cast { op, value, to } => {
                self.check_value(value)?;
                let valid = match op {
                    CastOp::ZExt => matches!(
                        (value.ty.int_bits(), to.int_bits()),
                        (Some(from), Some(into)) if from < into
                    ),
                    CastOp::SIToFP => value.ty.is_int() && to.is_float(),
                };
                if !valid {
                    return Err(self.type_error(format!(
                        "cannot {} `{}` to `{to}`",
                        op.mnemonic(),
                        value.ty
                    )));
                }
            }
            InstructionKind::Phi { ty, incoming } => self.verify_phi(block, ty, incoming)?,
            InstructionKind::Call { callee, args } => {
                let target = self
                    .module
                    .function(*callee)
                    .ok_or_else(|| self.dangling(format!("function #{}", callee.0)))?;
                if target.params.len() != args.len() {
                    return Err(self.type_error(format!(
                        "`{}` takes {} arguments, {} given",
                        target.name,
                        target.params.len(),
                        args.len()
                    )));
                }
                for (arg, param) in args.iter().zip(&target.params) {
                    self.expect_type(arg, &param.ty, "argument")?;
                }
            }
            InstructionKind::GetElementPtr {
                pointee,
                pointer,
                indices,
            } => {
                self.expect_type(pointer, &Type::Ptr, "getelementptr base")?;
                let mut current = pointee.clone();
                for (position, index) in indices.iter().enumerate() {
                    self.check_value(index)?;
                    if !index.ty.is_int() {
                        return Err(self.type_error("non-integer index".into()));
                    }
                    if position == 0 {
                        continue;
                    }
                    current = match (&current, index.as_constant()) {
                        (Type::Array { element, .. }, _) => (**element).clone(),
                        (_, Some(crate::Constant::Int { value, .. })) if *value >= 0 => self
                            .module
                            .element_type(&current, *value as u64)
                            .ok_or_else(|| {
                                self.type_error(format!("`{current}` has no element {value}"))
                            })?,
                        _ => {
                            return Err(self.type_error(format!(
                                "cannot index into `{current}` with a non-constant index"
                            )));
                        }
                    };
                }
            }
            InstructionKind::ExtractValue { aggregate, index } => {
                self.check_value(aggregate)?;
                self.element(&aggregate.ty, *index)?;
            }
            InstructionKind::InsertValue {
                aggregate,
                element,
                index,
            } => {
                self.check_value(aggregate)?;
                let expected = self.element(&aggregate.ty, *index)?;
                self.expect_type(element, &expected, "inserted element")?;
            }
        }
        Ok(())
    }

    fn element(&self, aggregate: &Type, index: u32) -> Result<Type, VerifyError> {
        self.module
            .element_type(aggregate, u64::from(index))
            .ok_or_else(|| self.type_error(format!("`{aggregate}` has no element {index}")))
    }

    fn verify_phi(
        &self,
        block: BlockId,
        ty: &Type,
        incoming: &[(Value, BlockId)],
    ) -> Result<(), VerifyError> {
        let mut predecessors = self.function.predecessors(block);
        predecessors.sort_by_key(|id| id.0);
        let mut sources: Vec<BlockId> = incoming.iter().map(|(_, source)| *source).collect();
        sources.sort_by_key(|id| id.0);
        if predecessors != sources {
            return Err(self.phi_error("incoming blocks do not match the predecessors"));
        }
        for (value, source) in incoming {
            self.check_block(*source)?;
            self.expect_type(value, ty, "incoming value")?;
        }
        Ok(())
    }

    fn verify_terminator(&self, terminator: &Terminator) -> Result<(), VerifyError> {
        match terminator {
            Terminator::Br(target) => self.check_block(*target),
            Terminator::CondBr {
                condition,
                then_block,
                else_block,
            } => {
                self.expect_type(condition, &Type::BOOL, "branch condition")?;
                self.check_block(*then_block)?;
                self.check_block(*else_block)
            }
            Terminator::Ret(value) => match (value, &self.function.return_type) {
                (None, Type::Void) => Ok(()),
                (Some(value), expected) if !expected.is_void() => {
                    self.expect_type(value, expected, "return value")
                }
                (_, expected) => Err(self.type_error(format!(
                    "return does not match return type `{expected}`"
                ))),
            },
            Terminator::Unreachable => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Builder, IntPredicate, Linkage, Param};

    fn builder_with(ret: Type) -> (Builder, crate::FunctionId) {
        let mut builder = Builder::new("test");
        let function = builder
            .add_function(
                "f",
                vec![Param {
                    name: "x".into(),
                    ty: Type::I32,
                }],
                ret,
                Linkage::External,
            )
            .unwrap();
        let entry = builder.append_block(function, "entry").unwrap();
        builder.position_at_end(function, entry);
        (builder, function)
    }

    #[test]
    fn test_well_formed_diamond_passes() {
        let (mut builder, function) = builder_with(Type::I32);
        let then_block = builder.append_block(function, "then").unwrap();
        let else_block = builder.append_block(function, "else").unwrap();
        let end = builder.append_block(function, "end").unwrap();

        let x = builder.param(0).unwrap();
        let condition = builder
            .icmp(IntPredicate::Sgt, x.clone(), Value::int(32, 0), "cmp")
            .unwrap();
        builder.cond_br(condition, then_block, else_block).unwrap();
        builder.position_at_end(function, then_block);
        builder.br(end).unwrap();
        builder.position_at_end(function, else_block);
        builder.br(end).unwrap();
        builder.position_at_end(function, end);
        let merged = builder
            .phi(
                Type::I32,
                vec![(x, then_block), (Value::int(32, 0), else_block)],
                "merged",
            )
            .unwrap();
        builder.ret(Some(merged)).unwrap();

        assert_eq!(verify_module(&builder.finish()), Ok(()));
    }

    #[test]
    fn test_missing_terminator_is_reported() {
        let (builder, _) = builder_with(Type::Void);
        assert_eq!(
            verify_module(&builder.finish()),
            Err(VerifyError::MissingTerminator {
                function: "f".into(),
                block: "entry".into()
            })
        );
    }

    #[test]
    fn test_phi_with_wrong_predecessors_is_reported() {
        let (mut builder, function) = builder_with(Type::I32);
        let next = builder.append_block(function, "next").unwrap();
        let entry = builder.current_block().unwrap();
        builder.br(next).unwrap();
        builder.position_at_end(function, next);
        let merged = builder
            .phi(
                Type::I32,
                vec![(Value::int(32, 1), entry), (Value::int(32, 2), next)],
                "merged",
            )
            .unwrap();
        builder.ret(Some(merged)).unwrap();

        assert!(matches!(
            verify_module(&builder.finish()),
            Err(VerifyError::Phi { .. })
        ));
    }

    #[test]
    fn test_operand_type_mismatch_is_reported() {
        let (mut builder, _) = builder_with(Type::I32);
        let x = builder.param(0).unwrap();
        let sum = builder
            .binary(crate::BinaryOp::Add, x, Value::float(1.0), "sum")
            .unwrap();
        builder.ret(Some(sum)).unwrap();
        assert!(matches!(
            verify_module(&builder.finish()),
            Err(VerifyError::Type { .. })
        ));
    }

    #[test]
    fn test_return_type_is_checked() {
        let (mut builder, _) = builder_with(Type::I32);
        builder.ret(None).unwrap();
        assert!(matches!(
            verify_module(&builder.finish()),
            Err(VerifyError::Type { .. })
        ));
    }

    #[test]
    fn test_dangling_branch_target_is_reported() {
        let (mut builder, _) = builder_with(Type::Void);
        builder.br(BlockId(7)).unwrap();
        assert_eq!(
            verify_module(&builder.finish()),
            Err(VerifyError::Dangling {
                function: "f".into(),
                what: "block #7".into()
            })
        );
    }
}
