//! Symbols tracked by scopes

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Type tag of a symbol whose type is inferred later
pub const AUTO: &str = "auto";

/// Type tag of a symbol whose type could not be determined
pub const ANY: &str = "Any";

/// Compile-time value carried by builtin constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    /// `True` or `False`
    Bool(bool),
    /// `None`
    None,
}

/// Field of a class symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Declared type tag
    pub ty: String,
    /// Position in the structural layout
    pub index: u32,
}

/// What a symbol names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// A builtin or declared type
    Type,
    /// Immutable builtin constant
    Constant,
    /// Variable introduced by a declaration or assignment
    Variable,
    /// Function parameter
    Parameter,
    /// Function, with its parameter names in order
    Function {
        /// Parameter names
        params: Vec<String>,
    },
    /// Class with a flat structural layout
    Class {
        /// Fields by name, in declaration order
        fields: IndexMap<String, Field>,
    },
}

/// A named entity owned by one scope.
///
/// `S` is the backing storage bound to the symbol. The analyzer never binds
/// storage and uses `()`; code generation binds the IR value that holds the
/// symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol<S = ()> {
    /// Name, unique in the owning scope
    pub name: String,
    /// Declared type tag (`"int"`, a class name, [`AUTO`] or [`ANY`])
    pub ty: String,
    /// What the symbol names
    pub kind: SymbolKind,
    /// Whether the symbol may be reassigned
    pub mutable: bool,
    /// Backing storage, once bound
    pub storage: Option<S>,
    /// Compile-time value, for constants
    pub literal: Option<Literal>,
}

impl<S> Symbol<S> {
    fn with_kind(name: impl Into<String>, ty: impl Into<String>, kind: SymbolKind) -> Self {
        let mutable = matches!(kind, SymbolKind::Variable | SymbolKind::Parameter);
        Self {
            name: name.into(),
            ty: ty.into(),
            kind,
            mutable,
            storage: None,
            literal: None,
        }
    }

    /// Mutable variable of type `ty`
    pub fn variable(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::with_kind(name, ty, SymbolKind::Variable)
    }

    /// Function parameter of type `ty`
    pub fn parameter(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::with_kind(name, ty, SymbolKind::Parameter)
    }

    /// Function returning `return_type`
    pub fn function(
        name: impl Into<String>,
        return_type: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self::with_kind(name, return_type, SymbolKind::Function { params })
    }

    /// Class whose type tag is its own name
    pub fn class(name: impl Into<String>, fields: IndexMap<String, Field>) -> Self {
        let name = name.into();
        Self::with_kind(name.clone(), name, SymbolKind::Class { fields })
    }

    /// Builtin type
    pub fn type_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::with_kind(name.clone(), name, SymbolKind::Type)
    }

    /// Immutable constant with a compile-time value
    pub fn constant(name: impl Into<String>, ty: impl Into<String>, literal: Literal) -> Self {
        Self {
            literal: Some(literal),
            ..Self::with_kind(name, ty, SymbolKind::Constant)
        }
    }

    /// Binds backing storage
    #[must_use]
    pub fn with_storage(mut self, storage: S) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Parameter names, for function symbols
    pub fn params(&self) -> Option<&[String]> {
        match &self.kind {
            SymbolKind::Function { params } => Some(params),
            _ => None,
        }
    }

    /// Field table, for class symbols
    pub fn fields(&self) -> Option<&IndexMap<String, Field>> {
        match &self.kind {
            SymbolKind::Class { fields } => Some(fields),
            _ => None,
        }
    }

    /// Whether the symbol names a type (builtin or class)
    pub fn is_type(&self) -> bool {
        matches!(self.kind, SymbolKind::Type | SymbolKind::Class { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_mutability() {
        let variable: Symbol = Symbol::variable("x", "int");
        assert!(variable.mutable);
        let constant: Symbol = Symbol::constant("True", "bool", Literal::Bool(true));
        assert!(!constant.mutable);
        assert_eq!(constant.literal, Some(Literal::Bool(true)));
        let function: Symbol = Symbol::function("f", "int", vec!["a".into()]);
        assert_eq!(function.params(), Some(&["a".to_string()][..]));
        assert!(!function.mutable);
    }

    #[test]
    fn test_class_type_tag_is_its_name() {
        let mut fields = IndexMap::new();
        fields.insert(
            "x".to_string(),
            Field {
                ty: "int".into(),
                index: 0,
            },
        );
        let class: Symbol<u8> = Symbol::class("Point", fields).with_storage(3);
        assert_eq!(class.ty, "Point");
        assert!(class.is_type());
        assert_eq!(class.storage, Some(3));
        assert_eq!(class.fields().map(IndexMap::len), Some(1));
    }

    #[test]
    fn test_class_kind_serializes_fields_in_order() {
        let mut fields = IndexMap::new();
        for (index, name) in ["y", "x"].into_iter().enumerate() {
            fields.insert(
                name.to_string(),
                Field {
                    ty: "float".into(),
                    index: index as u32,
                },
            );
        }
        let kind = SymbolKind::Class { fields };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(
            json,
            r#"{"Class":{"fields":{"y":{"ty":"float","index":0},"x":{"ty":"float","index":1}}}}"#
        );
        let back: SymbolKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }
}
