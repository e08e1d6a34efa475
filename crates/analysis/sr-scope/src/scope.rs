//! Scope tree for name resolution
//!
//! Scopes live in an arena owned by the [`ScopeTree`]. Parents own their
//! children through index lists; each child keeps its parent's index for
//! lookups only. Leaving a scope moves the cursor back to the parent but keeps
//! the scope in the arena, so a finished pass can still be inspected.

use crate::error::{ScopeError, suggestions};
use crate::symbol::{Symbol, SymbolKind};
use indexmap::IndexMap;
use la_arena::{Arena, Idx};
use tracing::trace;

/// Index of a scope in its tree
pub type ScopeId<S> = Idx<Scope<S>>;

/// A lexical region owning a name to symbol mapping
#[derive(Debug, Clone)]
pub struct Scope<S = ()> {
    /// Scope name (the function name, or the root name)
    pub name: String,
    /// Enclosing scope, `None` for the root
    pub parent: Option<ScopeId<S>>,
    /// Nested scopes in creation order
    pub children: Vec<ScopeId<S>>,
    /// Distance from the root
    pub depth: u32,
    /// Symbols declared here, in declaration order
    pub symbols: IndexMap<String, Symbol<S>>,
}

/// Scope-chained symbol table with a current-scope cursor
#[derive(Debug, Clone)]
pub struct ScopeTree<S = ()> {
    scopes: Arena<Scope<S>>,
    root: ScopeId<S>,
    current: ScopeId<S>,
}

impl<S> ScopeTree<S> {
    /// Creates a tree holding only an empty root scope
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut scopes = Arena::new();
        let root = scopes.alloc(Scope {
            name: root_name.into(),
            parent: None,
            children: Vec::new(),
            depth: 0,
            symbols: IndexMap::new(),
        });
        Self {
            scopes,
            root,
            current: root,
        }
    }

    /// Creates a tree whose root holds the builtin types and constants
    pub fn with_builtins(root_name: impl Into<String>) -> Self {
        let mut tree = Self::new(root_name);
        let root = tree.root;
        crate::builtins::seed(&mut tree, root);
        tree
    }

    /// The root scope
    pub fn root(&self) -> ScopeId<S> {
        self.root
    }

    /// The scope new declarations go into
    pub fn current(&self) -> ScopeId<S> {
        self.current
    }

    /// Scope by id
    pub fn scope(&self, id: ScopeId<S>) -> &Scope<S> {
        &self.scopes[id]
    }

    /// Depth of the current scope
    pub fn depth(&self) -> u32 {
        self.scopes[self.current].depth
    }

    /// Number of scopes ever created, the root included
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Enters a new child of the current scope
    pub fn push(&mut self, name: impl Into<String>) -> ScopeId<S> {
        let parent = self.current;
        let depth = self.scopes[parent].depth + 1;
        let name = name.into();
        trace!(scope = %name, depth, "enter scope");
        let id = self.scopes.alloc(Scope {
            name,
            parent: Some(parent),
            children: Vec::new(),
            depth,
            symbols: IndexMap::new(),
        });
        self.scopes[parent].children.push(id);
        self.current = id;
        id
    }

    /// Leaves the current scope, returning to its parent
    pub fn pop(&mut self) -> Result<ScopeId<S>, ScopeError> {
        let parent = self.scopes[self.current]
            .parent
            .ok_or(ScopeError::PopRoot)?;
        trace!(scope = %self.scopes[self.current].name, "leave scope");
        self.current = parent;
        Ok(parent)
    }

    /// Declares `symbol` in the current scope
    pub fn insert(&mut self, symbol: Symbol<S>) -> Result<(), ScopeError> {
        self.insert_into(self.current, symbol)
    }

    /// Declares `symbol` in `scope`
    pub fn insert_into(&mut self, scope: ScopeId<S>, symbol: Symbol<S>) -> Result<(), ScopeError> {
        let target = &mut self.scopes[scope];
        if target.symbols.contains_key(&symbol.name) {
            return Err(ScopeError::DuplicateSymbol {
                name: symbol.name,
                scope: target.name.clone(),
            });
        }
        target.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Whether `name` is declared in the current scope itself
    pub fn contains_local(&self, name: &str) -> bool {
        self.scopes[self.current].symbols.contains_key(name)
    }

    /// Nearest declaration of `name`, searching the current scope and then
    /// its ancestors
    pub fn lookup(&self, name: &str) -> Option<&Symbol<S>> {
        self.lookup_from(self.current, name)
    }

    /// Nearest declaration of `name` visible from `scope`
    pub fn lookup_from(&self, scope: ScopeId<S>, name: &str) -> Option<&Symbol<S>> {
        self.resolve_from(scope, name).map(|(_, symbol)| symbol)
    }

    /// Nearest declaration of `name` with the scope that owns it
    pub fn resolve(&self, name: &str) -> Option<(ScopeId<S>, &Symbol<S>)> {
        self.resolve_from(self.current, name)
    }

    fn resolve_from(&self, scope: ScopeId<S>, name: &str) -> Option<(ScopeId<S>, &Symbol<S>)> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let entry = &self.scopes[id];
            if let Some(symbol) = entry.symbols.get(name) {
                return Some((id, symbol));
            }
            cursor = entry.parent;
        }
        None
    }

    /// Resolves a qualified `Owner.field` name to the field's structural
    /// index and declared type.
    ///
    /// The owner may be a class or a symbol whose type is a class.
    pub fn field_info(&self, qualified: &str) -> Result<(u32, String), ScopeError> {
        let (owner, field) = qualified
            .split_once('.')
            .ok_or_else(|| ScopeError::NotQualified(qualified.to_string()))?;
        let symbol = self
            .lookup(owner)
            .ok_or_else(|| ScopeError::Undefined(owner.to_string()))?;

        let class = if symbol.fields().is_some() {
            symbol
        } else {
            self.lookup(&symbol.ty)
                .filter(|class| class.fields().is_some())
                .ok_or_else(|| ScopeError::NotAStructure(owner.to_string()))?
        };
        let fields = class
            .fields()
            .ok_or_else(|| ScopeError::NotAStructure(owner.to_string()))?;

        fields
            .get(field)
            .map(|info| (info.index, info.ty.clone()))
            .ok_or_else(|| ScopeError::FieldNotFound {
                owner: class.name.clone(),
                field: field.to_string(),
            })
    }

    /// Visible names close to `name`, for "did you mean" hints.
    ///
    /// Builtin types and constants are never offered.
    pub fn suggestions(&self, name: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let scope = &self.scopes[id];
            names.extend(
                scope
                    .symbols
                    .values()
                    .filter(|symbol| {
                        !matches!(symbol.kind, SymbolKind::Type | SymbolKind::Constant)
                    })
                    .map(|symbol| symbol.name.as_str()),
            );
            cursor = scope.parent;
        }
        suggestions(name, names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Field;

    fn point_class() -> Symbol {
        let mut fields = IndexMap::new();
        fields.insert(
            "x".to_string(),
            Field {
                ty: "int".into(),
                index: 0,
            },
        );
        fields.insert(
            "y".to_string(),
            Field {
                ty: "float".into(),
                index: 1,
            },
        );
        Symbol::class("Point", fields)
    }

    #[test]
    fn test_duplicate_in_same_scope_fails() {
        let mut tree: ScopeTree = ScopeTree::new("global");
        tree.insert(Symbol::variable("x", "int")).unwrap();
        assert_eq!(
            tree.insert(Symbol::variable("x", "float")),
            Err(ScopeError::DuplicateSymbol {
                name: "x".into(),
                scope: "global".into()
            })
        );
    }

    #[test]
    fn test_shadowing_in_child_scope() {
        let mut tree: ScopeTree = ScopeTree::new("global");
        tree.insert(Symbol::variable("x", "int")).unwrap();
        let inner = tree.push("f");
        tree.insert(Symbol::variable("x", "float")).unwrap();
        assert_eq!(tree.lookup("x").map(|symbol| symbol.ty.as_str()), Some("float"));
        assert_eq!(tree.depth(), 1);

        tree.pop().unwrap();
        assert_eq!(tree.lookup("x").map(|symbol| symbol.ty.as_str()), Some("int"));
        assert_eq!(
            tree.lookup_from(inner, "x").map(|symbol| symbol.ty.as_str()),
            Some("float")
        );
    }

    #[test]
    fn test_lookup_walks_ancestors_and_misses_quietly() {
        let mut tree: ScopeTree = ScopeTree::new("global");
        tree.insert(Symbol::variable("outer", "int")).unwrap();
        tree.push("f");
        tree.push("g");
        let (owner, _) = tree.resolve("outer").unwrap();
        assert_eq!(owner, tree.root());
        assert!(tree.lookup("missing").is_none());
    }

    #[test]
    fn test_pop_root_fails() {
        let mut tree: ScopeTree = ScopeTree::new("global");
        assert_eq!(tree.pop(), Err(ScopeError::PopRoot));
    }

    #[test]
    fn test_children_are_owned_by_parent() {
        let mut tree: ScopeTree = ScopeTree::new("global");
        let first = tree.push("f");
        tree.pop().unwrap();
        let second = tree.push("g");
        assert_eq!(tree.scope(tree.root()).children, vec![first, second]);
        assert_eq!(tree.scope(second).parent, Some(tree.root()));
        assert_eq!(tree.scope_count(), 3);
    }

    #[test]
    fn test_field_info_through_class_and_instance() {
        let mut tree: ScopeTree = ScopeTree::new("global");
        tree.insert(point_class()).unwrap();
        tree.insert(Symbol::variable("p", "Point")).unwrap();
        tree.insert(Symbol::variable("n", "int")).unwrap();

        assert_eq!(tree.field_info("Point.y"), Ok((1, "float".to_string())));
        assert_eq!(tree.field_info("p.x"), Ok((0, "int".to_string())));
        assert_eq!(
            tree.field_info("p.z"),
            Err(ScopeError::FieldNotFound {
                owner: "Point".into(),
                field: "z".into()
            })
        );
        assert_eq!(
            tree.field_info("n.x"),
            Err(ScopeError::NotAStructure("n".into()))
        );
        assert_eq!(
            tree.field_info("q.x"),
            Err(ScopeError::Undefined("q".into()))
        );
        assert_eq!(
            tree.field_info("Point"),
            Err(ScopeError::NotQualified("Point".into()))
        );
    }

    #[test]
    fn test_suggestions_see_enclosing_scopes() {
        let mut tree: ScopeTree = ScopeTree::new("global");
        tree.insert(Symbol::variable("total", "int")).unwrap();
        tree.push("f");
        assert_eq!(tree.suggestions("totl"), vec!["total".to_string()]);
    }

    #[test]
    fn test_suggestions_skip_builtins() {
        let mut tree: ScopeTree = ScopeTree::with_builtins("global");
        tree.insert(Symbol::variable("total", "int")).unwrap();
        assert_eq!(tree.suggestions("totl"), vec!["total".to_string()]);
        assert!(tree.suggestions("boo").is_empty());
        assert!(tree.suggestions("Tru").is_empty());
    }
}
