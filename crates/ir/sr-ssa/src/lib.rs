//! SSA intermediate representation
//!
//! A [`Module`] holds globals and functions; each defined function is an
//! ordered list of [`BasicBlock`]s that end in exactly one [`Terminator`].
//! Modules are constructed through a [`Builder`], printed as LLVM assembly
//! through their `Display` impl and checked with [`verify_module`].

mod builder;
mod instruction;
mod module;
mod printer;
mod types;
mod value;
mod verify;

pub use builder::{BuildError, Builder, Position};
pub use instruction::{
    BinaryOp, CastOp, FloatPredicate, Instruction, InstructionKind, IntPredicate, Terminator,
};
pub use module::{BasicBlock, ENTRY_FUNCTION, Function, Global, Linkage, Local, Module, Param};
pub use types::Type;
pub use value::{BlockId, Constant, FunctionId, GlobalId, LocalId, Value, ValueKind};
pub use verify::{VerifyError, verify_module};
