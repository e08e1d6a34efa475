//! SSA module interpreter

use crate::value::{Pointer, Root, RtValue};
use sr_ssa::{
    BinaryOp, BlockId, CastOp, Constant, ENTRY_FUNCTION, FloatPredicate, Function, FunctionId,
    InstructionKind, IntPredicate, Module, Terminator, Type, Value, ValueKind,
};
use thiserror::Error;
use tracing::{debug, instrument, trace};

/// Instructions executed before a run is abandoned
pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;

/// Nested calls allowed before a run is abandoned
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Interpreter error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpreterError {
    /// Integer division or remainder by zero
    #[error("division by zero")]
    DivisionByZero,
    /// Dereferencing a pointer that does not address a live value
    #[error("invalid pointer: {0}")]
    InvalidPointer(String),
    /// Calling a function that is missing or has no body
    #[error("no definition for function `{0}`")]
    UnknownFunction(String),
    /// Reading a global that does not exist
    #[error("unknown global `{0}`")]
    UnknownGlobal(String),
    /// Operand of the wrong kind
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected kind
        expected: String,
        /// Actual kind
        found: String,
    },
    /// Too many nested calls
    #[error("stack overflow after {depth} nested calls")]
    StackOverflow {
        /// Depth limit that was hit
        depth: usize,
    },
    /// Too many executed instructions
    #[error("step limit of {limit} exceeded")]
    StepLimit {
        /// Step limit that was hit
        limit: u64,
    },
    /// Control reached an `unreachable` terminator
    #[error("reached unreachable code in `{function}`")]
    Unreachable {
        /// Function holding the terminator
        function: String,
    },
    /// A register read before it was written
    #[error("register `%{register}` read before definition in `{function}`")]
    UndefinedRegister {
        /// Function holding the register
        function: String,
        /// Register name
        register: String,
    },
    /// A call with the wrong number of arguments
    #[error("`{function}` takes {expected} arguments but {found} were given")]
    Arity {
        /// Called function
        function: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
    },
    /// Anything else the module asks for that cannot be executed
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Registers and arguments of one activation
struct Frame<'module> {
    function: &'module Function,
    registers: Vec<Option<RtValue>>,
    args: Vec<RtValue>,
}

/// Executes functions of a [`Module`].
///
/// Globals are initialised once from their constant initialisers and keep
/// their values across calls, so a program can be run with
/// [`Interpreter::run_entry`] and inspected with [`Interpreter::global`].
pub struct Interpreter<'module> {
    module: &'module Module,
    globals: Vec<RtValue>,
    cells: Vec<RtValue>,
    steps: u64,
    max_steps: u64,
    max_depth: usize,
    depth: usize,
}

impl<'module> Interpreter<'module> {
    /// Creates an interpreter with the default limits
    #[must_use]
    pub fn new(module: &'module Module) -> Self {
        Self::with_limits(module, DEFAULT_MAX_STEPS, DEFAULT_MAX_DEPTH)
    }

    /// Creates an interpreter with explicit step and call depth limits
    #[must_use]
    pub fn with_limits(module: &'module Module, max_steps: u64, max_depth: usize) -> Self {
        let globals = module
            .globals
            .iter()
            .map(|global| Self::constant(module, &global.initializer))
            .collect();
        Self {
            module,
            globals,
            cells: Vec::new(),
            steps: 0,
            max_steps,
            max_depth,
            depth: 0,
        }
    }

    /// Instructions executed so far
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs the module's top-level code
    ///
    /// # Errors
    /// Returns `InterpreterError` if execution fails
    pub fn run_entry(&mut self) -> Result<RtValue, InterpreterError> {
        self.call(ENTRY_FUNCTION, Vec::new())
    }

    /// Calls the function named `name`
    ///
    /// # Errors
    /// Returns `InterpreterError` if the function is unknown or execution fails
    #[instrument(skip(self, args), fields(arg_count = args.len()))]
    pub fn call(&mut self, name: &str, args: Vec<RtValue>) -> Result<RtValue, InterpreterError> {
        let id = self
            .module
            .function_by_name(name)
            .ok_or_else(|| InterpreterError::UnknownFunction(name.to_string()))?;
        let result = self.invoke(id, args)?;
        debug!(function = name, steps = self.steps, result = %result, "call finished");
        Ok(result)
    }

    /// Current value of the global named `name`
    ///
    /// # Errors
    /// Returns `InterpreterError::UnknownGlobal` if there is no such global
    pub fn global(&self, name: &str) -> Result<&RtValue, InterpreterError> {
        self.module
            .global_by_name(name)
            .and_then(|id| self.globals.get(id.0 as usize))
            .ok_or_else(|| InterpreterError::UnknownGlobal(name.to_string()))
    }

    /// Reads the NUL-terminated byte string `pointer` addresses
    ///
    /// # Errors
    /// Returns `InterpreterError` if `pointer` does not address bytes
    pub fn read_c_string(&self, pointer: &RtValue) -> Result<String, InterpreterError> {
        let pointer = pointer
            .as_pointer()
            .ok_or_else(|| Self::mismatch("ptr", pointer))?;
        let (elements, start) = match self.slot(pointer)? {
            RtValue::Aggregate(elements) => (elements, 0),
            RtValue::Int { bits: 8, .. } => {
                let (last, parent) = pointer
                    .path
                    .split_last()
                    .ok_or_else(|| InterpreterError::InvalidPointer(pointer.root.to_string()))?;
                let parent = Pointer {
                    root: pointer.root,
                    path: parent.to_vec(),
                };
                match self.slot(&parent)? {
                    RtValue::Aggregate(elements) => (elements, *last as usize),
                    other => return Err(Self::mismatch("byte array", other)),
                }
            }
            other => return Err(Self::mismatch("byte array", other)),
        };
        let mut bytes = Vec::new();
        for element in elements.iter().skip(start) {
            match element {
                RtValue::Int { bits: 8, value: 0 } => break,
                RtValue::Int { bits: 8, value } => bytes.push(*value as u8),
                other => return Err(Self::mismatch("i8", other)),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn invoke(&mut self, id: FunctionId, args: Vec<RtValue>) -> Result<RtValue, InterpreterError> {
        let function = self
            .module
            .function(id)
            .ok_or_else(|| InterpreterError::UnknownFunction(format!("#{}", id.0)))?;
        if function.is_declaration() {
            return Err(InterpreterError::UnknownFunction(function.name.clone()));
        }
        if args.len() != function.params.len() {
            return Err(InterpreterError::Arity {
                function: function.name.clone(),
                expected: function.params.len(),
                found: args.len(),
            });
        }
        if self.depth >= self.max_depth {
            return Err(InterpreterError::StackOverflow {
                depth: self.max_depth,
            });
        }
        trace!(function = %function.name, depth = self.depth, "enter");

        self.depth += 1;
        let base = self.cells.len();
        let mut frame = Frame {
            function,
            registers: vec![None; function.locals.len()],
            args,
        };
        let result = self.execute(&mut frame);
        self.cells.truncate(base);
        self.depth -= 1;
        result
    }

    fn execute(&mut self, frame: &mut Frame<'module>) -> Result<RtValue, InterpreterError> {
        let function = frame.function;
        let mut previous: Option<BlockId> = None;
        let mut current = BlockId(0);

        loop {
            let block = function.block(current).ok_or_else(|| {
                InterpreterError::InvalidOperation(format!(
                    "branch to missing block {} in `{}`",
                    current.0, function.name
                ))
            })?;

            // Phis read their incoming values as of the branch, so they are
            // all evaluated before any of them is written.
            let phis = block
                .instructions
                .iter()
                .take_while(|instruction| matches!(instruction.kind, InstructionKind::Phi { .. }))
                .count();
            let mut incoming = Vec::with_capacity(phis);
            for instruction in &block.instructions[..phis] {
                if let InstructionKind::Phi { incoming: edges, .. } = &instruction.kind {
                    let value = edges
                        .iter()
                        .find(|(_, from)| Some(*from) == previous)
                        .ok_or_else(|| {
                            InterpreterError::InvalidOperation(format!(
                                "phi in `{}` has no edge from the previous block",
                                block.label
                            ))
                        })?;
                    incoming.push((instruction.result, self.operand(frame, &value.0)?));
                }
            }
            for (result, value) in incoming {
                self.tick()?;
                if let Some(register) = result {
                    Self::define(frame, register.0, value);
                }
            }

            for instruction in &block.instructions[phis..] {
                self.tick()?;
                let value = self.instruction(frame, &instruction.kind)?;
                if let Some(register) = instruction.result {
                    Self::define(frame, register.0, value);
                }
            }

            self.tick()?;
            let next = match &block.terminator {
                Some(Terminator::Br(target)) => *target,
                Some(Terminator::CondBr {
                    condition,
                    then_block,
                    else_block,
                }) => {
                    let condition = self.operand(frame, condition)?;
                    let taken = condition
                        .as_bool()
                        .ok_or_else(|| Self::mismatch("i1", &condition))?;
                    if taken { *then_block } else { *else_block }
                }
                Some(Terminator::Ret(value)) => {
                    return value
                        .as_ref()
                        .map_or(Ok(RtValue::Void), |value| self.operand(frame, value));
                }
                Some(Terminator::Unreachable) => {
                    return Err(InterpreterError::Unreachable {
                        function: function.name.clone(),
                    });
                }
                None => {
                    return Err(InterpreterError::InvalidOperation(format!(
                        "block `{}` in `{}` has no terminator",
                        block.label, function.name
                    )));
                }
            };
            previous = Some(current);
            current = next;
        }
    }

    fn instruction(
        &mut self,
        frame: &Frame<'module>,
        kind: &InstructionKind,
    ) -> Result<RtValue, InterpreterError> {
        match kind {
            InstructionKind::Alloca { ty } => {
                let cell = self.cells.len();
                self.cells.push(self.default_of(ty));
                Ok(RtValue::Pointer(Pointer::to(Root::Stack(cell))))
            }
            InstructionKind::Load { pointer, .. } => {
                let pointer = self.pointer_operand(frame, pointer)?;
                self.slot(&pointer).cloned()
            }
            InstructionKind::Store { value, pointer } => {
                let value = self.operand(frame, value)?;
                let pointer = self.pointer_operand(frame, pointer)?;
                *self.slot_mut(&pointer)? = value;
                Ok(RtValue::Void)
            }
            InstructionKind::Binary { op, lhs, rhs } => {
                let lhs = self.operand(frame, lhs)?;
                let rhs = self.operand(frame, rhs)?;
                Self::binary(*op, &lhs, &rhs)
            }
            InstructionKind::FNeg { operand } => {
                let operand = self.operand(frame, operand)?;
                let value = operand
                    .as_float()
                    .ok_or_else(|| Self::mismatch("float", &operand))?;
                Ok(RtValue::Float(-value))
            }
            InstructionKind::ICmp {
                predicate,
                lhs,
                rhs,
            } => {
                let lhs = self.operand(frame, lhs)?;
                let rhs = self.operand(frame, rhs)?;
                Self::int_compare(*predicate, &lhs, &rhs).map(RtValue::bool)
            }
            InstructionKind::FCmp {
                predicate,
                lhs,
                rhs,
            } => {
                let lhs = self.operand(frame, lhs)?;
                let rhs = self.operand(frame, rhs)?;
                let left = lhs.as_float().ok_or_else(|| Self::mismatch("float", &lhs))?;
                let right = rhs.as_float().ok_or_else(|| Self::mismatch("float", &rhs))?;
                Ok(RtValue::bool(Self::float_compare(*predicate, left, right)))
            }
            InstructionKind::Cast { op, value, to } => {
                let value = self.operand(frame, value)?;
                Self::cast(*op, &value, to)
            }
            InstructionKind::Phi { .. } => Err(InterpreterError::InvalidOperation(
                "phi after the start of a block".to_string(),
            )),
            InstructionKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.operand(frame, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.invoke(*callee, args)
            }
            InstructionKind::GetElementPtr {
                pointer, indices, ..
            } => {
                let mut pointer = self.pointer_operand(frame, pointer)?;
                let mut indices = indices.iter();
                if let Some(first) = indices.next() {
                    let first = self.index_operand(frame, first)?;
                    if first != 0 {
                        return Err(InterpreterError::InvalidPointer(format!(
                            "offset {first} past {}",
                            pointer.root
                        )));
                    }
                }
                for index in indices {
                    let index = self.index_operand(frame, index)?;
                    pointer.path.push(index);
                }
                Ok(RtValue::Pointer(pointer))
            }
            InstructionKind::ExtractValue { aggregate, index } => {
                match self.operand(frame, aggregate)? {
                    RtValue::Aggregate(mut elements) if (*index as usize) < elements.len() => {
                        Ok(elements.swap_remove(*index as usize))
                    }
                    other => Err(Self::mismatch(
                        format!("aggregate with element {index}"),
                        &other,
                    )),
                }
            }
            InstructionKind::InsertValue {
                aggregate,
                element,
                index,
            } => {
                let element = self.operand(frame, element)?;
                match self.operand(frame, aggregate)? {
                    RtValue::Aggregate(mut elements) if (*index as usize) < elements.len() => {
                        elements[*index as usize] = element;
                        Ok(RtValue::Aggregate(elements))
                    }
                    other => Err(Self::mismatch(
                        format!("aggregate with element {index}"),
                        &other,
                    )),
                }
            }
        }
    }

    fn operand(&self, frame: &Frame<'module>, value: &Value) -> Result<RtValue, InterpreterError> {
        match &value.kind {
            ValueKind::Constant(constant) => Ok(Self::constant(self.module, constant)),
            ValueKind::Local(id) => frame
                .registers
                .get(id.0 as usize)
                .and_then(Clone::clone)
                .ok_or_else(|| InterpreterError::UndefinedRegister {
                    function: frame.function.name.clone(),
                    register: frame
                        .function
                        .local(*id)
                        .map_or_else(|| id.0.to_string(), |local| local.name.clone()),
                }),
            ValueKind::Param(index) => frame.args.get(*index as usize).cloned().ok_or_else(|| {
                InterpreterError::InvalidOperation(format!(
                    "parameter {index} of `{}` out of range",
                    frame.function.name
                ))
            }),
            ValueKind::Global(id) => Ok(RtValue::Pointer(Pointer::to(Root::Global(*id)))),
            ValueKind::Function(id) => Ok(RtValue::Pointer(Pointer::to(Root::Function(*id)))),
        }
    }

    fn pointer_operand(
        &self,
        frame: &Frame<'module>,
        value: &Value,
    ) -> Result<Pointer, InterpreterError> {
        match self.operand(frame, value)? {
            RtValue::Pointer(pointer) => Ok(pointer),
            other => Err(Self::mismatch("ptr", &other)),
        }
    }

    fn index_operand(
        &self,
        frame: &Frame<'module>,
        value: &Value,
    ) -> Result<u64, InterpreterError> {
        let index = self.operand(frame, value)?;
        let raw = index.as_int().ok_or_else(|| Self::mismatch("integer index", &index))?;
        u64::try_from(raw).map_err(|_| InterpreterError::InvalidPointer(format!("index {raw}")))
    }

    fn define(frame: &mut Frame<'module>, register: u32, value: RtValue) {
        if let Some(slot) = frame.registers.get_mut(register as usize) {
            *slot = Some(value);
        }
    }

    fn tick(&mut self) -> Result<(), InterpreterError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(InterpreterError::StepLimit {
                limit: self.max_steps,
            });
        }
        Ok(())
    }

    /// Value at `pointer`
    fn slot(&self, pointer: &Pointer) -> Result<&RtValue, InterpreterError> {
        let invalid =
            || InterpreterError::InvalidPointer(RtValue::Pointer(pointer.clone()).to_string());
        let mut value = match pointer.root {
            Root::Stack(cell) => self.cells.get(cell),
            Root::Global(id) => self.globals.get(id.0 as usize),
            Root::Function(_) | Root::Null => None,
        }
        .ok_or_else(invalid)?;
        for index in &pointer.path {
            value = match value {
                RtValue::Aggregate(elements) => elements.get(*index as usize).ok_or_else(invalid)?,
                _ => return Err(invalid()),
            };
        }
        Ok(value)
    }

    /// Writable value at `pointer`; constant globals are read-only
    fn slot_mut(&mut self, pointer: &Pointer) -> Result<&mut RtValue, InterpreterError> {
        let invalid =
            || InterpreterError::InvalidPointer(RtValue::Pointer(pointer.clone()).to_string());
        let mut value = match pointer.root {
            Root::Stack(cell) => self.cells.get_mut(cell),
            Root::Global(id) => {
                let global = self.module.global(id).ok_or_else(invalid)?;
                if global.constant {
                    return Err(InterpreterError::InvalidPointer(format!(
                        "store to constant global `{}`",
                        global.name
                    )));
                }
                self.globals.get_mut(id.0 as usize)
            }
            Root::Function(_) | Root::Null => None,
        }
        .ok_or_else(invalid)?;
        for index in &pointer.path {
            value = match value {
                RtValue::Aggregate(elements) => {
                    elements.get_mut(*index as usize).ok_or_else(invalid)?
                }
                _ => return Err(invalid()),
            };
        }
        Ok(value)
    }

    /// Zero value of `ty`, used for fresh cells and `undef`
    fn default_of(&self, ty: &Type) -> RtValue {
        Self::zero(self.module, ty)
    }

    fn zero(module: &Module, ty: &Type) -> RtValue {
        match ty {
            Type::Void => RtValue::Void,
            Type::Int(bits) => RtValue::int(*bits, 0),
            Type::Float => RtValue::Float(0.0),
            Type::Ptr => RtValue::Pointer(Pointer::null()),
            Type::Array { element, len } => {
                let element = Self::zero(module, element);
                RtValue::Aggregate(vec![element; *len as usize])
            }
            Type::Struct(fields) => {
                RtValue::Aggregate(fields.iter().map(|field| Self::zero(module, field)).collect())
            }
            Type::Named(name) => RtValue::Aggregate(
                module
                    .struct_types
                    .get(name)
                    .map(|fields| fields.iter().map(|field| Self::zero(module, field)).collect())
                    .unwrap_or_default(),
            ),
        }
    }

    fn constant(module: &Module, constant: &Constant) -> RtValue {
        match constant {
            Constant::Int { bits, value } => RtValue::int(*bits, *value),
            Constant::Float(value) => RtValue::Float(*value as f32),
            Constant::Null => RtValue::Pointer(Pointer::null()),
            Constant::Undef(ty) | Constant::Zero(ty) => Self::zero(module, ty),
            Constant::Array { elements, .. } | Constant::Struct { fields: elements, .. } => {
                RtValue::Aggregate(
                    elements
                        .iter()
                        .map(|element| Self::constant(module, element))
                        .collect(),
                )
            }
            Constant::Bytes(bytes) => RtValue::Aggregate(
                bytes
                    .iter()
                    .map(|byte| RtValue::int(8, i64::from(*byte)))
                    .collect(),
            ),
        }
    }

    fn binary(op: BinaryOp, lhs: &RtValue, rhs: &RtValue) -> Result<RtValue, InterpreterError> {
        if op.is_float() {
            let left = lhs.as_float().ok_or_else(|| Self::mismatch("float", lhs))?;
            let right = rhs.as_float().ok_or_else(|| Self::mismatch("float", rhs))?;
            let value = match op {
                BinaryOp::FAdd => left + right,
                BinaryOp::FSub => left - right,
                BinaryOp::FMul => left * right,
                BinaryOp::FDiv => left / right,
                _ => left % right,
            };
            return Ok(RtValue::Float(value));
        }

        let (bits, left, right) = match (lhs, rhs) {
            (
                RtValue::Int { bits, value: left },
                RtValue::Int {
                    bits: right_bits,
                    value: right,
                },
            ) if bits == right_bits => (
                *bits,
                Self::signed(*bits, *left),
                Self::signed(*bits, *right),
            ),
            (RtValue::Int { bits, .. }, other) => {
                return Err(Self::mismatch(format!("i{bits}"), other));
            }
            (other, _) => return Err(Self::mismatch("integer", other)),
        };
        let value = match op {
            BinaryOp::Add => left.wrapping_add(right),
            BinaryOp::Sub => left.wrapping_sub(right),
            BinaryOp::Mul => left.wrapping_mul(right),
            BinaryOp::SDiv | BinaryOp::SRem if right == 0 => {
                return Err(InterpreterError::DivisionByZero);
            }
            BinaryOp::SDiv => left.wrapping_div(right),
            BinaryOp::SRem => left.wrapping_rem(right),
            BinaryOp::Shl | BinaryOp::AShr => {
                let amount = u32::try_from(right)
                    .ok()
                    .filter(|amount| *amount < bits)
                    .ok_or_else(|| {
                        InterpreterError::InvalidOperation(format!(
                            "shift by {right} on i{bits}"
                        ))
                    })?;
                if op == BinaryOp::Shl {
                    left.wrapping_shl(amount)
                } else {
                    left >> amount
                }
            }
            BinaryOp::And => left & right,
            BinaryOp::Or => left | right,
            _ => left ^ right,
        };
        Ok(RtValue::int(bits, value))
    }

    fn int_compare(
        predicate: IntPredicate,
        lhs: &RtValue,
        rhs: &RtValue,
    ) -> Result<bool, InterpreterError> {
        match (lhs, rhs) {
            (
                RtValue::Int { bits, value: left },
                RtValue::Int {
                    bits: right_bits,
                    value: right,
                },
            ) if bits == right_bits => {
                let (left, right) = (Self::signed(*bits, *left), Self::signed(*bits, *right));
                Ok(match predicate {
                    IntPredicate::Eq => left == right,
                    IntPredicate::Ne => left != right,
                    IntPredicate::Slt => left < right,
                    IntPredicate::Sgt => left > right,
                    IntPredicate::Sle => left <= right,
                    IntPredicate::Sge => left >= right,
                })
            }
            (RtValue::Pointer(left), RtValue::Pointer(right)) => match predicate {
                IntPredicate::Eq => Ok(left == right),
                IntPredicate::Ne => Ok(left != right),
                _ => Err(InterpreterError::InvalidOperation(format!(
                    "ordered comparison `{}` of pointers",
                    predicate.mnemonic()
                ))),
            },
            (left, right) => Err(Self::mismatch(left.kind(), right)),
        }
    }

    /// Ordered comparison: false whenever either side is NaN
    #[allow(clippy::float_cmp, reason = "fcmp compares exact bit values")]
    fn float_compare(predicate: FloatPredicate, left: f32, right: f32) -> bool {
        if left.is_nan() || right.is_nan() {
            return false;
        }
        match predicate {
            FloatPredicate::Oeq => left == right,
            FloatPredicate::One => left != right,
            FloatPredicate::Olt => left < right,
            FloatPredicate::Ogt => left > right,
            FloatPredicate::Ole => left <= right,
            FloatPredicate::Oge => left >= right,
        }
    }

    fn cast(op: CastOp, value: &RtValue, to: &Type) -> Result<RtValue, InterpreterError> {
        let RtValue::Int { bits, value: raw } = value else {
            return Err(Self::mismatch("integer", value));
        };
        match (op, to) {
            (CastOp::ZExt, Type::Int(target)) if target >= bits => {
                let unsigned = if *bits >= 64 {
                    *raw
                } else {
                    *raw & ((1_i64 << bits) - 1)
                };
                Ok(RtValue::int(*target, unsigned))
            }
            (CastOp::SIToFP, Type::Float) => Ok(RtValue::Float(Self::signed(*bits, *raw) as f32)),
            _ => Err(InterpreterError::InvalidOperation(format!(
                "{} i{bits} to {to}",
                op.mnemonic()
            ))),
        }
    }

    /// Signed reading of a stored integer; `i1` true is -1
    const fn signed(bits: u32, value: i64) -> i64 {
        if bits == 1 { -value } else { value }
    }

    fn mismatch(expected: impl ToString, found: &RtValue) -> InterpreterError {
        InterpreterError::TypeMismatch {
            expected: expected.to_string(),
            found: found.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_ssa::{Builder, Global, Linkage, Param};

    fn compile(source: &str) -> Module {
        let tree = sr_parser::parse_source(source).unwrap();
        sr_codegen::generate(&tree, "test").unwrap()
    }

    fn run(source: &str) -> Module {
        let module = compile(source);
        Interpreter::new(&module).run_entry().unwrap();
        module
    }

    fn global(source: &str, name: &str) -> RtValue {
        let module = compile(source);
        let mut interpreter = Interpreter::new(&module);
        interpreter.run_entry().unwrap();
        interpreter.global(name).unwrap().clone()
    }

    #[test]
    fn test_call_returns_sum() {
        let module = compile("def add(a: int, b: int) -> int:\n    return a + b\n");
        let mut interpreter = Interpreter::new(&module);
        let result = interpreter
            .call("add", vec![RtValue::i32(2), RtValue::i32(3)])
            .unwrap();
        assert_eq!(result, RtValue::i32(5));
    }

    #[test]
    fn test_entry_updates_globals() {
        let source = "def add(a: int, b: int) -> int:\n    return a + b\nx = add(2, 3)\n";
        assert_eq!(global(source, "x"), RtValue::i32(5));
        run(source);
    }

    #[test]
    fn test_loops_and_branches() {
        let source = "\
total = 0
i = 0
while i < 10:
    i += 1
    if i % 2 == 0:
        continue
    total += i
";
        assert_eq!(global(source, "total"), RtValue::i32(25));
    }

    #[test]
    fn test_recursion() {
        let source = "\
def fact(n: int) -> int:
    if n <= 1:
        return 1
    return n * fact(n - 1)
result = fact(5)
";
        assert_eq!(global(source, "result"), RtValue::i32(120));
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let source = "\
count = 0
def bump() -> bool:
    count += 1
    return True
flag = True or bump()
";
        let module = compile(source);
        let mut interpreter = Interpreter::new(&module);
        interpreter.run_entry().unwrap();
        assert_eq!(interpreter.global("flag").unwrap(), &RtValue::bool(true));
        assert_eq!(interpreter.global("count").unwrap(), &RtValue::i32(0));
    }

    #[test]
    fn test_float_arithmetic() {
        let value = global("x = 1.5 * 2\n", "x");
        assert_eq!(value, RtValue::Float(3.0));
    }

    #[test]
    fn test_string_globals_read_back() {
        let module = compile("s = \"hello\"\n");
        let mut interpreter = Interpreter::new(&module);
        interpreter.run_entry().unwrap();
        let pointer = interpreter.global("s").unwrap().clone();
        assert_eq!(interpreter.read_c_string(&pointer).unwrap(), "hello");
    }

    #[test]
    fn test_division_by_zero() {
        let module = compile("def div(a: int, b: int) -> int:\n    return a // b\n");
        let mut interpreter = Interpreter::new(&module);
        let error = interpreter
            .call("div", vec![RtValue::i32(1), RtValue::i32(0)])
            .unwrap_err();
        assert_eq!(error, InterpreterError::DivisionByZero);
    }

    #[test]
    fn test_limits() {
        let module = compile("def spin(n: int) -> int:\n    return spin(n)\n");
        let mut interpreter = Interpreter::with_limits(&module, DEFAULT_MAX_STEPS, 8);
        assert_eq!(
            interpreter.call("spin", vec![RtValue::i32(0)]),
            Err(InterpreterError::StackOverflow { depth: 8 })
        );

        let module = compile("while True:\n    pass\n");
        let mut interpreter = Interpreter::with_limits(&module, 100, DEFAULT_MAX_DEPTH);
        assert_eq!(
            interpreter.run_entry(),
            Err(InterpreterError::StepLimit { limit: 100 })
        );
    }

    #[test]
    fn test_unknown_names_and_arity() {
        let module = compile("def one() -> int:\n    return 1\n");
        let mut interpreter = Interpreter::new(&module);
        assert_eq!(
            interpreter.call("two", Vec::new()),
            Err(InterpreterError::UnknownFunction("two".into()))
        );
        assert!(matches!(
            interpreter.call("one", vec![RtValue::i32(1)]),
            Err(InterpreterError::Arity { expected: 0, found: 1, .. })
        ));
        assert_eq!(
            interpreter.global("missing"),
            Err(InterpreterError::UnknownGlobal("missing".into()))
        );
    }

    #[test]
    fn test_hand_built_module() {
        let mut builder = Builder::new("m");
        let counter = builder.add_global(Global {
            name: "counter".into(),
            ty: Type::I32,
            initializer: Constant::int(32, 7),
            constant: true,
            linkage: Linkage::Internal,
            unnamed_addr: false,
        })
        .unwrap();
        let function = builder.add_function(
            "poke",
            vec![Param {
                name: "v".into(),
                ty: Type::I32,
            }],
            Type::Void,
            Linkage::External,
        )
        .unwrap();
        let entry = builder.append_block(function, "entry").unwrap();
        builder.position_at_end(function, entry);
        let value = builder.param(0).unwrap();
        builder.store(value, Value::global(counter)).unwrap();
        builder.ret(None).unwrap();
        let module = builder.finish();

        let mut interpreter = Interpreter::new(&module);
        assert_eq!(interpreter.global("counter").unwrap(), &RtValue::i32(7));
        assert!(matches!(
            interpreter.call("poke", vec![RtValue::i32(1)]),
            Err(InterpreterError::InvalidPointer(_))
        ));
    }
}
