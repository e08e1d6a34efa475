//! Values and constants

use crate::Type;
use serde::{Deserialize, Serialize};

/// Index of a function in its module
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Index of a global in its module
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

/// Index of a basic block in its function
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Index of an instruction result in its function
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct LocalId(pub u32);

/// Compile-time constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Integer, stored sign-extended from its width (`i1` is 0 or 1)
    Int {
        /// Bit width
        bits: u32,
        /// Value
        value: i64,
    },
    /// `float` constant; always representable as `f32`
    Float(f64),
    /// Null pointer
    Null,
    /// Undefined value of a type
    Undef(Type),
    /// All-zero value of a type
    Zero(Type),
    /// Constant array
    Array {
        /// Element type
        element: Type,
        /// Elements
        elements: Vec<Constant>,
    },
    /// Constant struct, literal or named
    Struct {
        /// Struct type
        ty: Type,
        /// Field values
        fields: Vec<Constant>,
    },
    /// Byte array, printed as a `c"..."` string
    Bytes(Vec<u8>),
}

impl Constant {
    /// Integer constant truncated to `bits`
    pub fn int(bits: u32, value: i64) -> Self {
        let value = match bits {
            0 => 0,
            1 => value & 1,
            wide if wide >= 64 => value,
            _ => {
                let shift = 64 - bits;
                (value << shift) >> shift
            }
        };
        Self::Int { bits, value }
    }

    /// `i1` constant
    pub fn bool(value: bool) -> Self {
        Self::int(1, i64::from(value))
    }

    /// `float` constant, rounded to single precision
    pub fn float(value: f64) -> Self {
        Self::Float(f64::from(value as f32))
    }

    /// Type of the constant
    pub fn ty(&self) -> Type {
        match self {
            Self::Int { bits, .. } => Type::Int(*bits),
            Self::Float(_) => Type::Float,
            Self::Null => Type::Ptr,
            Self::Undef(ty) | Self::Zero(ty) | Self::Struct { ty, .. } => ty.clone(),
            Self::Array { element, elements } => {
                Type::array(element.clone(), elements.len() as u64)
            }
            Self::Bytes(bytes) => Type::array(Type::BYTE, bytes.len() as u64),
        }
    }

    /// Zero value of a first-class type; `None` for `void`
    pub fn zero_of(ty: &Type) -> Option<Self> {
        match ty {
            Type::Void => None,
            Type::Int(bits) => Some(Self::int(*bits, 0)),
            Type::Float => Some(Self::Float(0.0)),
            Type::Ptr => Some(Self::Null),
            aggregate => Some(Self::Zero(aggregate.clone())),
        }
    }
}

/// What a value refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Constant operand
    Constant(Constant),
    /// Result of an instruction in the current function
    Local(LocalId),
    /// Parameter of the current function
    Param(u32),
    /// Address of a module global
    Global(GlobalId),
    /// Address of a function
    Function(FunctionId),
}

/// A typed operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    /// Referent
    pub kind: ValueKind,
    /// Type of the value
    pub ty: Type,
}

impl Value {
    /// Constant operand
    pub fn constant(constant: Constant) -> Self {
        let ty = constant.ty();
        Self {
            kind: ValueKind::Constant(constant),
            ty,
        }
    }

    /// Integer constant operand
    pub fn int(bits: u32, value: i64) -> Self {
        Self::constant(Constant::int(bits, value))
    }

    /// `i1` constant operand
    pub fn bool(value: bool) -> Self {
        Self::constant(Constant::bool(value))
    }

    /// `float` constant operand
    pub fn float(value: f64) -> Self {
        Self::constant(Constant::float(value))
    }

    /// Address of a global
    pub fn global(id: GlobalId) -> Self {
        Self {
            kind: ValueKind::Global(id),
            ty: Type::Ptr,
        }
    }

    /// Address of a function
    pub fn function(id: FunctionId) -> Self {
        Self {
            kind: ValueKind::Function(id),
            ty: Type::Ptr,
        }
    }

    /// The constant this value holds, if any
    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            ValueKind::Constant(constant) => Some(constant),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_constants_wrap_to_width() {
        assert_eq!(Constant::int(8, 255), Constant::Int { bits: 8, value: -1 });
        assert_eq!(Constant::int(32, 1 << 32), Constant::Int { bits: 32, value: 0 });
        assert_eq!(Constant::bool(true), Constant::Int { bits: 1, value: 1 });
    }

    #[test]
    fn test_float_constants_round_to_single_precision() {
        let Constant::Float(value) = Constant::float(0.1) else {
            panic!("expected a float constant");
        };
        assert_eq!(value, f64::from(0.1_f32));
    }

    #[test]
    fn test_constant_types() {
        assert_eq!(Constant::Bytes(b"hi\0".to_vec()).ty(), Type::array(Type::BYTE, 3));
        assert_eq!(Constant::zero_of(&Type::Ptr), Some(Constant::Null));
        assert_eq!(Constant::zero_of(&Type::Void), None);
    }
}
