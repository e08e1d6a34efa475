//! Builtin registry

use crate::scope::{ScopeId, ScopeTree};
use crate::symbol::{Literal, Symbol};
use tracing::trace;

/// Builtin type names
pub const BUILTIN_TYPES: [&str; 6] = ["int", "float", "str", "bool", "Any", "NoneType"];

/// Builtin constants with their type and value
pub const BUILTIN_CONSTANTS: [(&str, &str, Literal); 3] = [
    ("True", "bool", Literal::Bool(true)),
    ("False", "bool", Literal::Bool(false)),
    ("None", "NoneType", Literal::None),
];

/// Declares the builtin types and constants in `scope`.
///
/// Names already present are left alone, so seeding twice is harmless.
pub fn seed<S>(tree: &mut ScopeTree<S>, scope: ScopeId<S>) {
    let types = BUILTIN_TYPES.into_iter().map(Symbol::type_name);
    let constants = BUILTIN_CONSTANTS
        .into_iter()
        .map(|(name, ty, literal)| Symbol::constant(name, ty, literal));
    for symbol in types.chain(constants) {
        // An existing declaration wins
        if let Err(error) = tree.insert_into(scope, symbol) {
            trace!(%error, "builtin already declared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;

    #[test]
    fn test_builtins_are_seeded() {
        let tree: ScopeTree = ScopeTree::with_builtins("global");
        for name in BUILTIN_TYPES {
            let symbol = tree.lookup(name).unwrap();
            assert_eq!(symbol.kind, SymbolKind::Type);
        }
        let none = tree.lookup("None").unwrap();
        assert_eq!(none.ty, "NoneType");
        assert_eq!(none.literal, Some(Literal::None));
        assert!(!tree.lookup("True").unwrap().mutable);
    }

    #[test]
    fn test_seeding_is_idempotent() {
        let mut tree: ScopeTree = ScopeTree::with_builtins("global");
        let root = tree.root();
        seed(&mut tree, root);
        assert_eq!(tree.scope(root).symbols.len(), 9);
    }

    #[test]
    fn test_trees_are_independent() {
        let mut first: ScopeTree = ScopeTree::with_builtins("global");
        let second: ScopeTree = ScopeTree::with_builtins("global");
        first.insert(Symbol::variable("x", "int")).unwrap();
        assert!(second.lookup("x").is_none());
    }
}
