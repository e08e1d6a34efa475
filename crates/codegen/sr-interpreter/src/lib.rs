//! SSA module interpreter
//!
//! Executes a verified [`sr_ssa::Module`] directly, without a native backend.
//! Used to evaluate compiled programs in tests and by `sere run`.

pub mod interpreter;
pub mod value;

pub use interpreter::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_STEPS, Interpreter, InterpreterError};
pub use value::{Pointer, Root, RtValue};
