//! Instructions and terminators

use crate::{BlockId, FunctionId, LocalId, Type, Value};
use serde::{Deserialize, Serialize};

/// Binary arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Integer addition
    Add,
    /// Integer subtraction
    Sub,
    /// Integer multiplication
    Mul,
    /// Signed integer division
    SDiv,
    /// Signed integer remainder
    SRem,
    /// Shift left
    Shl,
    /// Arithmetic shift right
    AShr,
    /// Bitwise AND
    And,
    /// Bitwise OR
    Or,
    /// Bitwise XOR
    Xor,
    /// Float addition
    FAdd,
    /// Float subtraction
    FSub,
    /// Float multiplication
    FMul,
    /// Float division
    FDiv,
    /// Float remainder
    FRem,
}

impl BinaryOp {
    /// IR mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::SDiv => "sdiv",
            Self::SRem => "srem",
            Self::Shl => "shl",
            Self::AShr => "ashr",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::FAdd => "fadd",
            Self::FSub => "fsub",
            Self::FMul => "fmul",
            Self::FDiv => "fdiv",
            Self::FRem => "frem",
        }
    }

    /// Whether the operator works on floats
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Self::FAdd | Self::FSub | Self::FMul | Self::FDiv | Self::FRem
        )
    }
}

/// Signed integer and pointer comparison predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntPredicate {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed less than
    Slt,
    /// Signed greater than
    Sgt,
    /// Signed less or equal
    Sle,
    /// Signed greater or equal
    Sge,
}

impl IntPredicate {
    /// IR mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Slt => "slt",
            Self::Sgt => "sgt",
            Self::Sle => "sle",
            Self::Sge => "sge",
        }
    }
}

/// Ordered float comparison predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatPredicate {
    /// Ordered and equal
    Oeq,
    /// Ordered and not equal
    One,
    /// Ordered and less than
    Olt,
    /// Ordered and greater than
    Ogt,
    /// Ordered and less or equal
    Ole,
    /// Ordered and greater or equal
    Oge,
}

impl FloatPredicate {
    /// IR mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Oeq => "oeq",
            Self::One => "one",
            Self::Olt => "olt",
            Self::Ogt => "ogt",
            Self::Ole => "ole",
            Self::Oge => "oge",
        }
    }
}

/// Conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    /// Zero-extend an integer to a wider integer
    ZExt,
    /// Signed integer to float
    SIToFP,
}

impl CastOp {
    /// IR mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::ZExt => "zext",
            Self::SIToFP => "sitofp",
        }
    }
}

/// A non-terminator instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Result register, absent for instructions without a value
    pub result: Option<LocalId>,
    /// Operation
    pub kind: InstructionKind,
}

/// Instruction operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// Stack cell of `ty`
    Alloca {
        /// Allocated type
        ty: Type,
    },
    /// Read `ty` from `pointer`
    Load {
        /// Loaded type
        ty: Type,
        /// Address
        pointer: Value,
    },
    /// Write `value` to `pointer`
    Store {
        /// Stored value
        value: Value,
        /// Address
        pointer: Value,
    },
    /// Binary operation on two operands of the same type
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Float negation
    FNeg {
        /// Operand
        operand: Value,
    },
    /// Integer or pointer comparison
    ICmp {
        /// Predicate
        predicate: IntPredicate,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Float comparison
    FCmp {
        /// Predicate
        predicate: FloatPredicate,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Type conversion
    Cast {
        /// Conversion
        op: CastOp,
        /// Converted value
        value: Value,
        /// Target type
        to: Type,
    },
    /// Merge node selecting a value by predecessor block
    Phi {
        /// Result type
        ty: Type,
        /// `(value, predecessor)` pairs
        incoming: Vec<(Value, BlockId)>,
    },
    /// Direct call
    Call {
        /// Called function
        callee: FunctionId,
        /// Arguments
        args: Vec<Value>,
    },
    /// Address computation
    GetElementPtr {
        /// Type the base pointer points to
        pointee: Type,
        /// Base address
        pointer: Value,
        /// Indices; the first steps over the base pointer
        indices: Vec<Value>,
    },
    /// Read one element of an aggregate value
    ExtractValue {
        /// Aggregate
        aggregate: Value,
        /// Element index
        index: u32,
    },
    /// Replace one element of an aggregate value
    InsertValue {
        /// Aggregate
        aggregate: Value,
        /// New element
        element: Value,
        /// Element index
        index: u32,
    },
}

/// Block terminators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    /// Unconditional branch
    Br(BlockId),
    /// Two-way branch on an `i1`
    CondBr {
        /// Condition
        condition: Value,
        /// Target when true
        then_block: BlockId,
        /// Target when false
        else_block: BlockId,
    },
    /// Return, with a value unless the function is `void`
    Ret(Option<Value>),
    /// Control never reaches this point
    Unreachable,
}

impl Terminator {
    /// Blocks control may transfer to
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Br(target) => vec![*target],
            Self::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Self::Ret(_) | Self::Unreachable => Vec::new(),
        }
    }
}
