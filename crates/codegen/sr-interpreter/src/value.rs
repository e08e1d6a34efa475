//! Runtime value representation

#![allow(
    clippy::min_ident_chars,
    reason = "Short identifiers like b, f, p are conventional in value implementations"
)]

use sr_ssa::{FunctionId, GlobalId};
use std::fmt;

/// What a pointer is rooted at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Root {
    /// Stack cell created by `alloca`
    Stack(usize),
    /// Module global
    Global(GlobalId),
    /// Function address; never dereferenced
    Function(FunctionId),
    /// Null pointer
    Null,
}

/// Address of a value: a root plus element indices into nested aggregates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    /// Storage the pointer is based on
    pub root: Root,
    /// Element path below the root
    pub path: Vec<u64>,
}

impl Pointer {
    /// Pointer to the start of `root`
    #[must_use]
    pub const fn to(root: Root) -> Self {
        Self {
            root,
            path: Vec::new(),
        }
    }

    /// Null pointer
    #[must_use]
    pub const fn null() -> Self {
        Self::to(Root::Null)
    }
}

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    /// Integer of `bits` width, stored sign-extended (`i1` is 0 or 1)
    Int {
        /// Bit width
        bits: u32,
        /// Value
        value: i64,
    },
    /// Single precision float
    Float(f32),
    /// Pointer
    Pointer(Pointer),
    /// Array or struct
    Aggregate(Vec<Self>),
    /// Result of a `void` call
    Void,
}

impl RtValue {
    /// Integer wrapped to `bits`
    #[must_use]
    pub const fn int(bits: u32, value: i64) -> Self {
        let value = match bits {
            0 => 0,
            1 => value & 1,
            b if b >= 64 => value,
            b => {
                let shift = 64 - b;
                (value << shift) >> shift
            }
        };
        Self::Int { bits, value }
    }

    /// `i1` value
    #[must_use]
    pub fn bool(b: bool) -> Self {
        Self::Int {
            bits: 1,
            value: i64::from(b),
        }
    }

    /// `i32` value
    #[must_use]
    pub fn i32(value: i32) -> Self {
        Self::Int {
            bits: 32,
            value: i64::from(value),
        }
    }

    /// Get the value as an integer, if possible
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Get an `i1` as a boolean
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Int { bits: 1, value } => Some(*value != 0),
            _ => None,
        }
    }

    /// Get the value as a float, if possible
    #[must_use]
    pub const fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get the value as a pointer, if possible
    #[must_use]
    pub const fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Self::Pointer(p) => Some(p),
            _ => None,
        }
    }

    /// Short description of the value's kind, for error messages
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::Int { bits, .. } => format!("i{bits}"),
            Self::Float(_) => "float".to_string(),
            Self::Pointer(_) => "ptr".to_string(),
            Self::Aggregate(elements) => format!("aggregate of {}", elements.len()),
            Self::Void => "void".to_string(),
        }
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stack(cell) => write!(f, "stack#{cell}"),
            Self::Global(id) => write!(f, "global#{}", id.0),
            Self::Function(id) => write!(f, "function#{}", id.0),
            Self::Null => f.write_str("null"),
        }
    }
}

impl fmt::Display for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int { bits: 1, value } => write!(f, "{}", *value != 0),
            Self::Int { value, .. } => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Pointer(p) => {
                write!(f, "&{}", p.root)?;
                for index in &p.path {
                    write!(f, "[{index}]")?;
                }
                Ok(())
            }
            Self::Aggregate(elements) => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
            Self::Void => f.write_str("void"),
        }
    }
}
