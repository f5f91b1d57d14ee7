use crate::syntax::{NodeId, NodeKind, SyntaxTree, TextRange};
use tracing::warn;

/// One textual occurrence reported by a search, as a byte offset and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchRange {
    pub offset: usize,
    pub length: usize,
}

impl MatchRange {
    pub fn new(offset: usize, length: usize) -> Self {
        MatchRange { offset, length }
    }

    pub fn range(&self) -> TextRange {
        TextRange::at(self.offset, self.length)
    }
}

/// Resolves a match to the most deeply nested node covering it. Returns `None` when only the
/// root covers the match.
pub fn locate(tree: &SyntaxTree, m: MatchRange) -> Option<NodeId> {
    let node = tree.covering_node(m.range())?;
    let parent = tree.parent(node)?;

    // Searches report explicit constructor calls one byte short of the call node.
    if tree.kind(parent) == NodeKind::ConstructorDeclaration {
        let call = tree
            .child_by_field(parent, "body")
            .and_then(|body| tree.first_statement(body))
            .filter(|first| tree.kind(*first) == NodeKind::ConstructorCall);
        if let Some(call) = call {
            if tree.range(call).len() == m.length + 1 {
                return Some(call);
            }
        }
    }
    if tree.kind(parent) == NodeKind::ConstructorCall && tree.range(parent).len() == m.length + 1
    {
        return Some(parent);
    }
    Some(node)
}

/// Locates every match, skipping those that resolve to nothing. Malformed trees yield nothing.
pub fn locate_all(tree: &SyntaxTree, matches: impl IntoIterator<Item = MatchRange>) -> Vec<NodeId> {
    if tree.is_malformed() {
        warn!("skipping reference lookup in malformed tree");
        return Vec::new();
    }
    let mut nodes = Vec::new();
    for m in matches {
        if let Some(node) = locate(tree, m) {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
    }
    nodes
}
