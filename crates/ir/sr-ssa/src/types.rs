//! First-class types of the IR

use serde::{Deserialize, Serialize};
use std::fmt;

/// An IR type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// No value
    Void,
    /// Integer of the given bit width
    Int(u32),
    /// 32-bit IEEE float
    Float,
    /// Opaque pointer
    Ptr,
    /// Fixed-length array
    Array {
        /// Element type
        element: Box<Type>,
        /// Number of elements
        len: u64,
    },
    /// Literal (anonymous) struct
    Struct(Vec<Type>),
    /// Named struct, fields registered on the module
    Named(String),
}

impl Type {
    /// `i1`
    pub const BOOL: Self = Self::Int(1);
    /// `i8`
    pub const BYTE: Self = Self::Int(8);
    /// `i32`
    pub const I32: Self = Self::Int(32);

    /// Array of `len` elements
    pub fn array(element: Self, len: u64) -> Self {
        Self::Array {
            element: Box::new(element),
            len,
        }
    }

    /// Bit width when this is an integer type
    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Self::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Whether this is an integer type
    pub fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// Whether this is `i1`
    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Int(1))
    }

    /// Whether this is the float type
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float)
    }

    /// Whether this is a pointer
    pub fn is_ptr(&self) -> bool {
        matches!(self, Self::Ptr)
    }

    /// Whether this is `void`
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Whether values of this type are aggregates
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Array { .. } | Self::Struct(_) | Self::Named(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => formatter.write_str("void"),
            Self::Int(bits) => write!(formatter, "i{bits}"),
            Self::Float => formatter.write_str("float"),
            Self::Ptr => formatter.write_str("ptr"),
            Self::Array { element, len } => write!(formatter, "[{len} x {element}]"),
            Self::Struct(fields) if fields.is_empty() => formatter.write_str("{}"),
            Self::Struct(fields) => {
                formatter.write_str("{ ")?;
                for (index, field) in fields.iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(", ")?;
                    }
                    write!(formatter, "{field}")?;
                }
                formatter.write_str(" }")
            }
            Self::Named(name) => crate::printer::write_ident(formatter, '%', name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(Type::I32.to_string(), "i32");
        assert_eq!(Type::array(Type::BYTE, 6).to_string(), "[6 x i8]");
        assert_eq!(
            Type::Struct(vec![Type::I32, Type::Ptr]).to_string(),
            "{ i32, ptr }"
        );
        assert_eq!(Type::Struct(Vec::new()).to_string(), "{}");
        assert_eq!(Type::Named("Point".into()).to_string(), "%Point");
    }
}
