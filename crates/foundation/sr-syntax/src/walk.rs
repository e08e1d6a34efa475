//! Enter/exit tree traversal

use crate::SyntaxNode;

/// Hooks called around every node during [`walk`]
pub trait Visitor {
    /// Called before the node's children are visited
    fn enter(&mut self, _node: &SyntaxNode) {}

    /// Called after the node's children are visited
    fn exit(&mut self, _node: &SyntaxNode) {}
}

/// Depth-first, source-order traversal of `node`
pub fn walk<V: Visitor + ?Sized>(node: &SyntaxNode, visitor: &mut V) {
    visitor.enter(node);
    for child in &node.children {
        walk(child, visitor);
    }
    visitor.exit(node);
}
