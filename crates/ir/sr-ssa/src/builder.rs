//! Insertion-point builder
//!
//! [`Builder`] owns the module under construction and one insertion point
//! (a function plus one of its blocks). Instructions are appended to the end of
//! the current block, except `alloca`, which is hoisted into the entry block so
//! every stack cell dominates its uses, and `phi`, which is kept in front of
//! the block's other instructions.

use crate::{
    BasicBlock, BinaryOp, BlockId, CastOp, FloatPredicate, Function, FunctionId, Global, GlobalId,
    Instruction, InstructionKind, IntPredicate, Linkage, Local, LocalId, Module, Param,
    Terminator, Type, Value, ValueKind,
};
use thiserror::Error;
use tracing::trace;

/// Errors raised while constructing IR
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// No function/block is selected
    #[error("no insertion point is set")]
    NoInsertionPoint,

    /// The current block already ends in a terminator
    #[error("block `{block}` is already terminated")]
    Terminated {
        /// Label of the block
        block: String,
    },

    /// A function id that does not belong to the module
    #[error("unknown function #{0}")]
    UnknownFunction(u32),

    /// A parameter index past the end of the parameter list
    #[error("function `{function}` has no parameter #{index}")]
    UnknownParam {
        /// Function name
        function: String,
        /// Requested index
        index: u32,
    },

    /// A second function or global with the same symbol name
    #[error("symbol `{0}` is already defined in the module")]
    DuplicateSymbol(String),

    /// A second named struct with the same name
    #[error("struct type `{0}` is already defined in the module")]
    DuplicateStructType(String),

    /// Element access on a non-aggregate or past its end
    #[error("type `{ty}` has no element {index}")]
    NoSuchElement {
        /// Aggregate type
        ty: String,
        /// Requested index
        index: u32,
    },
}

/// A function and one of its blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Function being built
    pub function: FunctionId,
    /// Block receiving new instructions
    pub block: BlockId,
}

/// Builder for an IR [`Module`]
#[derive(Debug)]
pub struct Builder {
    module: Module,
    position: Option<Position>,
}

impl Builder {
    /// Creates a builder for an empty module
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module: Module::new(module_name),
            position: None,
        }
    }

    /// The module built so far
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Finishes building and returns the module
    pub fn finish(self) -> Module {
        self.module
    }

    // =========================================================================
    // Module-level items
    // =========================================================================

    /// Registers a named struct type
    pub fn declare_struct(
        &mut self,
        name: &str,
        fields: Vec<Type>,
    ) -> Result<Type, BuildError> {
        if self.module.struct_types.contains_key(name) {
            return Err(BuildError::DuplicateStructType(name.to_string()));
        }
        self.module.struct_types.insert(name.to_string(), fields);
        Ok(Type::Named(name.to_string()))
    }

    /// Adds a global data object
    pub fn add_global(&mut self, global: Global) -> Result<GlobalId, BuildError> {
        if self.module.symbol_exists(&global.name) {
            return Err(BuildError::DuplicateSymbol(global.name));
        }
        let id = GlobalId(self.module.globals.len() as u32);
        trace!(name = %global.name, ty = %global.ty, "add global");
        self.module.globals.push(global);
        Ok(id)
    }

    /// Adds a function without blocks
    pub fn add_function(
        &mut self,
        name: &str,
        params: Vec<Param>,
        return_type: Type,
        linkage: Linkage,
    ) -> Result<FunctionId, BuildError> {
        if self.module.symbol_exists(name) {
            return Err(BuildError::DuplicateSymbol(name.to_string()));
        }
        let id = FunctionId(self.module.functions.len() as u32);
        trace!(name, "add function");
        self.module
            .functions
            .push(Function::new(name, params, return_type, linkage));
        Ok(id)
    }

    /// Function by id
    pub fn function(&self, id: FunctionId) -> Result<&Function, BuildError> {
        self.module
            .function(id)
            .ok_or(BuildError::UnknownFunction(id.0))
    }

    fn function_mut(&mut self, id: FunctionId) -> Result<&mut Function, BuildError> {
        self.module
            .functions
            .get_mut(id.0 as usize)
            .ok_or(BuildError::UnknownFunction(id.0))
    }

    /// Appends a block with a function-unique label derived from `label`
    pub fn append_block(
        &mut self,
        function: FunctionId,
        label: &str,
    ) -> Result<BlockId, BuildError> {
        let function = self.function_mut(function)?;
        let label = function.claim_name(label);
        let id = BlockId(function.blocks.len() as u32);
        function.blocks.push(BasicBlock::new(label));
        Ok(id)
    }

    // =========================================================================
    // Insertion point
    // =========================================================================

    /// Current insertion point
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Restores a saved insertion point
    pub fn set_position(&mut self, position: Option<Position>) {
        self.position = position;
    }

    /// Moves the insertion point to the end of `block`
    pub fn position_at_end(&mut self, function: FunctionId, block: BlockId) {
        self.position = Some(Position { function, block });
    }

    /// Function containing the insertion point
    pub fn current_function(&self) -> Option<FunctionId> {
        self.position.map(|position| position.function)
    }

    /// Block containing the insertion point
    pub fn current_block(&self) -> Option<BlockId> {
        self.position.map(|position| position.block)
    }

    /// Whether the current block already ends in a terminator
    pub fn is_terminated(&self) -> bool {
        self.current()
            .is_some_and(|block| block.terminator.is_some())
    }

    fn current(&self) -> Option<&BasicBlock> {
        let position = self.position?;
        self.module
            .function(position.function)?
            .block(position.block)
    }

    fn position_or_err(&self) -> Result<Position, BuildError> {
        self.position.ok_or(BuildError::NoInsertionPoint)
    }

    /// Parameter `index` of the current function
    pub fn param(&self, index: u32) -> Result<Value, BuildError> {
        let position = self.position_or_err()?;
        let function = self.function(position.function)?;
        let param = function
            .params
            .get(index as usize)
            .ok_or_else(|| BuildError::UnknownParam {
                function: function.name.clone(),
                index,
            })?;
        Ok(Value {
            kind: ValueKind::Param(index),
            ty: param.ty.clone(),
        })
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    /// Inserts an instruction into the current block.
    ///
    /// With `at_front` the instruction goes after any leading `phi`s instead
    /// of at the end.
    fn insert(
        &mut self,
        kind: InstructionKind,
        result: Option<(Type, &str)>,
        at_front: bool,
    ) -> Result<Option<Value>, BuildError> {
        let position = self.position_or_err()?;
        let function = self.function_mut(position.function)?;
        let block = function
            .blocks
            .get(position.block.0 as usize)
            .ok_or(BuildError::NoInsertionPoint)?;
        if block.terminator.is_some() {
            return Err(BuildError::Terminated {
                block: block.label.clone(),
            });
        }

        let (local, value) = match result {
            Some((ty, name)) => {
                let name = function.claim_name(name);
                let id = LocalId(function.locals.len() as u32);
                function.locals.push(Local {
                    name,
                    ty: ty.clone(),
                });
                (
                    Some(id),
                    Some(Value {
                        kind: ValueKind::Local(id),
                        ty,
                    }),
                )
            }
            None => (None, None),
        };

        let instruction = Instruction {
            result: local,
            kind,
        };
        let block = function
            .blocks
            .get_mut(position.block.0 as usize)
            .ok_or(BuildError::NoInsertionPoint)?;
        if at_front {
            let index = block
                .instructions
                .iter()
                .take_while(|existing| matches!(existing.kind, InstructionKind::Phi { .. }))
                .count();
            block.instructions.insert(index, instruction);
        } else {
            block.instructions.push(instruction);
        }
        Ok(value)
    }

    fn insert_value(
        &mut self,
        kind: InstructionKind,
        ty: Type,
        name: &str,
    ) -> Result<Value, BuildError> {
        self.insert(kind, Some((ty, name)), false)?
            .ok_or(BuildError::NoInsertionPoint)
    }

    /// Stack cell of `ty`, placed in the entry block of the current function
    pub fn alloca(&mut self, ty: Type, name: &str) -> Result<Value, BuildError> {
        let position = self.position_or_err()?;
        let function = self.function_mut(position.function)?;
        let name = function.claim_name(name);
        let id = LocalId(function.locals.len() as u32);
        function.locals.push(Local {
            name,
            ty: Type::Ptr,
        });
        let entry = function
            .blocks
            .first_mut()
            .ok_or(BuildError::NoInsertionPoint)?;
        let index = entry
            .instructions
            .iter()
            .take_while(|existing| matches!(existing.kind, InstructionKind::Alloca { .. }))
            .count();
        entry.instructions.insert(
            index,
            Instruction {
                result: Some(id),
                kind: InstructionKind::Alloca { ty },
            },
        );
        Ok(Value {
            kind: ValueKind::Local(id),
            ty: Type::Ptr,
        })
    }

    /// Reads a `ty` from `pointer`
    pub fn load(&mut self, ty: Type, pointer: Value, name: &str) -> Result<Value, BuildError> {
        self.insert_value(
            InstructionKind::Load {
                ty: ty.clone(),
                pointer,
            },
            ty,
            name,
        )
    }

    /// Writes `value` to `pointer`
    pub fn store(&mut self, value: Value, pointer: Value) -> Result<(), BuildError> {
        self.insert(InstructionKind::Store { value, pointer }, None, false)?;
        Ok(())
    }

    /// Binary operation; the result has the left operand's type
    pub fn binary(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        name: &str,
    ) -> Result<Value, BuildError> {
        let ty = lhs.ty.clone();
        self.insert_value(InstructionKind::Binary { op, lhs, rhs }, ty, name)
    }

    /// Float negation
    pub fn fneg(&mut self, operand: Value, name: &str) -> Result<Value, BuildError> {
        let ty = operand.ty.clone();
        self.insert_value(InstructionKind::FNeg { operand }, ty, name)
    }

    /// Integer or pointer comparison producing an `i1`
    pub fn icmp(
        &mut self,
        predicate: IntPredicate,
        lhs: Value,
        rhs: Value,
        name: &str,
    ) -> Result<Value, BuildError> {
        self.insert_value(
            InstructionKind::ICmp {
                predicate,
                lhs,
                rhs,
            },
            Type::BOOL,
            name,
        )
    }

    /// Float comparison producing an `i1`
    pub fn fcmp(
        &mut self,
        predicate: FloatPredicate,
        lhs: Value,
        rhs: Value,
        name: &str,
    ) -> Result<Value, BuildError> {
        self.insert_value(
            InstructionKind::FCmp {
                predicate,
                lhs,
                rhs,
            },
            Type::BOOL,
            name,
        )
    }

    /// Converts `value` to `to`
    pub fn cast(
        &mut self,
        op: CastOp,
        value: Value,
        to: Type,
        name: &str,
    ) -> Result<Value, BuildError> {
        self.insert_value(
            InstructionKind::Cast {
                op,
                value,
                to: to.clone(),
            },
            to,
            name,
        )
    }

    /// Merge node at the front of the current block
    pub fn phi(
        &mut self,
        ty: Type,
        incoming: Vec<(Value, BlockId)>,
        name: &str,
    ) -> Result<Value, BuildError> {
        self.insert(
            InstructionKind::Phi {
                ty: ty.clone(),
                incoming,
            },
            Some((ty, name)),
            true,
        )?
        .ok_or(BuildError::NoInsertionPoint)
    }

    /// Direct call; `None` when the callee returns `void`
    pub fn call(
        &mut self,
        callee: FunctionId,
        args: Vec<Value>,
        name: &str,
    ) -> Result<Option<Value>, BuildError> {
        let return_type = self.function(callee)?.return_type.clone();
        let result = if return_type.is_void() {
            None
        } else {
            Some((return_type, name))
        };
        self.insert(InstructionKind::Call { callee, args }, result, false)
    }

    /// Address of an element inside `pointer`
    pub fn gep(
        &mut self,
        pointee: Type,
        pointer: Value,
        indices: Vec<Value>,
        name: &str,
    ) -> Result<Value, BuildError> {
        self.insert_value(
            InstructionKind::GetElementPtr {
                pointee,
                pointer,
                indices,
            },
            Type::Ptr,
            name,
        )
    }

    fn element_type(&self, aggregate: &Type, index: u32) -> Result<Type, BuildError> {
        self.module
            .element_type(aggregate, u64::from(index))
            .ok_or_else(|| BuildError::NoSuchElement {
                ty: aggregate.to_string(),
                index,
            })
    }

    /// Reads element `index` of an aggregate value
    pub fn extract_value(
        &mut self,
        aggregate: Value,
        index: u32,
        name: &str,
    ) -> Result<Value, BuildError> {
        let ty = self.element_type(&aggregate.ty, index)?;
        self.insert_value(InstructionKind::ExtractValue { aggregate, index }, ty, name)
    }

    /// Copy of `aggregate` with element `index` replaced
    pub fn insert_element(
        &mut self,
        aggregate: Value,
        element: Value,
        index: u32,
        name: &str,
    ) -> Result<Value, BuildError> {
        self.element_type(&aggregate.ty, index)?;
        let ty = aggregate.ty.clone();
        self.insert_value(
            InstructionKind::InsertValue {
                aggregate,
                element,
                index,
            },
            ty,
            name,
        )
    }

    // =========================================================================
    // Terminators
    // =========================================================================

    fn terminate(&mut self, terminator: Terminator) -> Result<(), BuildError> {
        let position = self.position_or_err()?;
        let function = self.function_mut(position.function)?;
        let block = function
            .blocks
            .get_mut(position.block.0 as usize)
            .ok_or(BuildError::NoInsertionPoint)?;
        if block.terminator.is_some() {
            return Err(BuildError::Terminated {
                block: block.label.clone(),
            });
        }
        block.terminator = Some(terminator);
        Ok(())
    }

    /// Unconditional branch
    pub fn br(&mut self, target: BlockId) -> Result<(), BuildError> {
        self.terminate(Terminator::Br(target))
    }

    /// Two-way branch on an `i1`
    pub fn cond_br(
        &mut self,
        condition: Value,
        then_block: BlockId,
        else_block: BlockId,
    ) -> Result<(), BuildError> {
        self.terminate(Terminator::CondBr {
            condition,
            then_block,
            else_block,
        })
    }

    /// Return, with a value unless the function is `void`
    pub fn ret(&mut self, value: Option<Value>) -> Result<(), BuildError> {
        self.terminate(Terminator::Ret(value))
    }

    /// Marks the end of the current block as unreachable
    pub fn unreachable(&mut self) -> Result<(), BuildError> {
        self.terminate(Terminator::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with_function() -> (Builder, FunctionId) {
        let mut builder = Builder::new("test");
        let function = builder
            .add_function("f", Vec::new(), Type::Void, Linkage::External)
            .unwrap();
        let entry = builder.append_block(function, "entry").unwrap();
        builder.position_at_end(function, entry);
        (builder, function)
    }

    #[test]
    fn test_alloca_is_hoisted_to_entry() {
        let (mut builder, function) = builder_with_function();
        let next = builder.append_block(function, "next").unwrap();
        builder.br(next).unwrap();
        builder.position_at_end(function, next);
        builder.alloca(Type::I32, "cell").unwrap();

        let module = builder.finish();
        let function = &module.functions[0];
        assert!(matches!(
            function.blocks[0].instructions[0].kind,
            InstructionKind::Alloca { .. }
        ));
        assert!(function.blocks[1].instructions.is_empty());
    }

    #[test]
    fn test_terminated_block_rejects_instructions() {
        let (mut builder, _) = builder_with_function();
        builder.ret(None).unwrap();
        assert!(builder.is_terminated());
        let err = builder.ret(None).unwrap_err();
        assert_eq!(
            err,
            BuildError::Terminated {
                block: "entry".into()
            }
        );
    }

    #[test]
    fn test_duplicate_symbols_are_rejected() {
        let (mut builder, _) = builder_with_function();
        let err = builder
            .add_function("f", Vec::new(), Type::Void, Linkage::External)
            .unwrap_err();
        assert_eq!(err, BuildError::DuplicateSymbol("f".into()));
    }

    #[test]
    fn test_void_call_has_no_result() {
        let (mut builder, function) = builder_with_function();
        let result = builder.call(function, Vec::new(), "call").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_extract_value_types() {
        let (mut builder, _) = builder_with_function();
        let point = builder
            .declare_struct("P", vec![Type::I32, Type::Float])
            .unwrap();
        let aggregate = Value::constant(crate::Constant::Zero(point));
        let field = builder.extract_value(aggregate.clone(), 1, "y").unwrap();
        assert_eq!(field.ty, Type::Float);
        assert!(builder.extract_value(aggregate, 2, "z").is_err());
    }
}
