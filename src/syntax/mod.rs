//! Index-based syntax trees.
//!
//! A [`SyntaxTree`] owns every node in one arena. Nodes are addressed by [`NodeId`] and link to
//! their parent by index, so the whole tree is freed as a unit. Trees are immutable once built;
//! edits are recorded against them elsewhere.

mod builder;
mod java;
mod line_index;

pub use builder::TreeBuilder;
pub use java::{JavaParser, SourceParser};
pub use line_index::LineIndex;

use std::{
    fmt, iter,
    ops::Range,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeId(u64);

impl TreeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TreeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node handle that is meaningful outside its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub tree: TreeId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row + 1, self.column + 1)
    }
}

/// Half-open byte range into a file's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        TextRange { start, end }
    }

    pub fn at(start: usize, len: usize) -> Self {
        TextRange::new(start, start + len)
    }

    pub fn empty(offset: usize) -> Self {
        TextRange::new(offset, offset)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains_range(&self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when the ranges share at least one byte, or when an empty range sits strictly
    /// inside a non-empty one.
    pub fn overlaps(&self, other: TextRange) -> bool {
        if self.is_empty() && other.is_empty() {
            return false;
        }
        if self.is_empty() {
            return other.start < self.start && self.start < other.end;
        }
        if other.is_empty() {
            return self.start < other.start && other.start < self.end;
        }
        self.start < other.end && other.start < self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for TextRange {
    fn from(range: Range<usize>) -> Self {
        TextRange::new(range.start, range.end)
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The node kinds the engine dispatches on. Everything else keeps its grammar name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    CompilationUnit,
    PackageDeclaration,
    ImportDeclaration,
    TypeDeclaration,
    TypeBody,
    FieldDeclaration,
    VariableDeclarator,
    MethodDeclaration,
    ConstructorDeclaration,
    ConstructorBody,
    Block,
    ConstructorCall,
    Identifier,
    TypeIdentifier,
    QualifiedName,
    FieldAccess,
    MethodInvocation,
    MethodReference,
    ObjectCreation,
    ArgumentList,
    FormalParameters,
    Modifiers,
    This,
    Super,
    Asterisk,
    Comment,
    Error,
    Other(&'static str),
}

impl NodeKind {
    pub fn from_grammar_name(name: &'static str) -> Self {
        match name {
            "program" => NodeKind::CompilationUnit,
            "package_declaration" => NodeKind::PackageDeclaration,
            "import_declaration" => NodeKind::ImportDeclaration,
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration" => NodeKind::TypeDeclaration,
            "class_body" | "interface_body" | "enum_body" | "enum_body_declarations"
            | "annotation_type_body" => NodeKind::TypeBody,
            "field_declaration" | "constant_declaration" => NodeKind::FieldDeclaration,
            "variable_declarator" => NodeKind::VariableDeclarator,
            "method_declaration" => NodeKind::MethodDeclaration,
            "constructor_declaration" | "compact_constructor_declaration" => {
                NodeKind::ConstructorDeclaration
            }
            "constructor_body" => NodeKind::ConstructorBody,
            "block" => NodeKind::Block,
            "explicit_constructor_invocation" => NodeKind::ConstructorCall,
            "identifier" => NodeKind::Identifier,
            "type_identifier" => NodeKind::TypeIdentifier,
            "scoped_identifier" | "scoped_type_identifier" => NodeKind::QualifiedName,
            "field_access" => NodeKind::FieldAccess,
            "method_invocation" => NodeKind::MethodInvocation,
            "method_reference" => NodeKind::MethodReference,
            "object_creation_expression" => NodeKind::ObjectCreation,
            "argument_list" => NodeKind::ArgumentList,
            "formal_parameters" => NodeKind::FormalParameters,
            "modifiers" => NodeKind::Modifiers,
            "this" => NodeKind::This,
            "super" => NodeKind::Super,
            "asterisk" => NodeKind::Asterisk,
            "line_comment" | "block_comment" => NodeKind::Comment,
            "ERROR" => NodeKind::Error,
            other => NodeKind::Other(other),
        }
    }

    pub fn is_name(self) -> bool {
        matches!(self, NodeKind::Identifier | NodeKind::TypeIdentifier)
    }

    pub fn is_member(self) -> bool {
        matches!(
            self,
            NodeKind::FieldDeclaration
                | NodeKind::MethodDeclaration
                | NodeKind::ConstructorDeclaration
                | NodeKind::TypeDeclaration
        )
    }

    /// Lists whose elements are separated by commas rather than line breaks.
    pub fn is_comma_list(self) -> bool {
        matches!(self, NodeKind::ArgumentList | NodeKind::FormalParameters)
    }
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub range: TextRange,
    pub start_point: Point,
    pub end_point: Point,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Grammar field this node occupies under its parent, e.g. `name` or `object`.
    pub field: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub node: NodeId,
    pub qualified_name: String,
    pub is_static: bool,
    pub on_demand: bool,
}

impl ImportEntry {
    pub fn simple_name(&self) -> &str {
        last_segment(&self.qualified_name)
    }

    /// Package (or type, for static imports) the imported name lives in.
    pub fn container(&self) -> &str {
        if self.on_demand {
            &self.qualified_name
        } else {
            qualifier(&self.qualified_name).unwrap_or("")
        }
    }
}

pub fn last_segment(qualified_name: &str) -> &str {
    qualified_name
        .rsplit_once('.')
        .map_or(qualified_name, |(_, name)| name)
}

pub fn qualifier(qualified_name: &str) -> Option<&str> {
    qualified_name.rsplit_once('.').map(|(qualifier, _)| qualifier)
}

#[derive(Debug)]
pub struct SyntaxTree {
    id: TreeId,
    source: Arc<str>,
    nodes: Vec<NodeData>,
    package: Option<String>,
    imports: Vec<ImportEntry>,
    malformed: bool,
}

impl SyntaxTree {
    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn shared_source(&self) -> Arc<str> {
        self.source.clone()
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        node.tree == self.id && node.node.index() < self.nodes.len()
    }

    pub fn node_ref(&self, node: NodeId) -> NodeRef {
        NodeRef {
            tree: self.id,
            node,
        }
    }

    pub fn node(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.index()]
    }

    pub fn kind(&self, node: NodeId) -> NodeKind {
        self.node(node).kind
    }

    pub fn range(&self, node: NodeId) -> TextRange {
        self.node(node).range
    }

    pub fn point_range(&self, node: NodeId) -> Range<Point> {
        let data = self.node(node);
        data.start_point..data.end_point
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).children
    }

    pub fn field(&self, node: NodeId) -> Option<&'static str> {
        self.node(node).field
    }

    pub fn child_by_field(&self, node: NodeId, field: &str) -> Option<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .find(|child| self.field(*child) == Some(field))
    }

    pub fn first_child_of_kind(&self, node: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .find(|child| self.kind(*child) == kind)
    }

    pub fn text(&self, node: NodeId) -> &str {
        &self.source[self.range(node).as_range()]
    }

    /// Proper ancestors, nearest first.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = node;
        iter::from_fn(move || {
            let parent = self.parent(current)?;
            current = parent;
            Some(parent)
        })
    }

    /// The node and everything below it, in source order.
    pub fn descendants(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![node];
        iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.children(next).iter().rev());
            Some(next)
        })
    }

    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Name of a type, member or variable declaration.
    pub fn declared_name(&self, declaration: NodeId) -> Option<&str> {
        self.child_by_field(declaration, "name")
            .map(|name| self.text(name))
    }

    pub fn enclosing_type(&self, node: NodeId) -> Option<NodeId> {
        self.ancestors(node)
            .find(|ancestor| self.kind(*ancestor) == NodeKind::TypeDeclaration)
    }

    /// Fully qualified name of a type declaration, including enclosing types.
    pub fn qualified_type_name(&self, type_declaration: NodeId) -> Option<String> {
        let mut names = vec![self.declared_name(type_declaration)?];
        let mut current = type_declaration;
        while let Some(outer) = self.enclosing_type(current) {
            names.push(self.declared_name(outer)?);
            current = outer;
        }
        if let Some(package) = self.package() {
            names.push(package);
        }
        names.reverse();
        Some(names.join("."))
    }

    /// Every type declared in the file, with its qualified name.
    pub fn declared_types(&self) -> Vec<(NodeId, String)> {
        self.descendants(self.root())
            .filter(|node| self.kind(*node) == NodeKind::TypeDeclaration)
            .filter_map(|node| Some((node, self.qualified_type_name(node)?)))
            .collect()
    }

    pub fn declares_type(&self, qualified_name: &str) -> bool {
        self.declared_types()
            .iter()
            .any(|(_, name)| name == qualified_name)
    }

    /// First statement of a constructor or method body, skipping comments.
    pub fn first_statement(&self, body: NodeId) -> Option<NodeId> {
        self.children(body)
            .iter()
            .copied()
            .find(|child| self.kind(*child) != NodeKind::Comment)
    }

    /// Whether `node` lies inside an import or package declaration.
    pub fn is_in_header(&self, node: NodeId) -> bool {
        iter::once(node).chain(self.ancestors(node)).any(|n| {
            matches!(
                self.kind(n),
                NodeKind::ImportDeclaration | NodeKind::PackageDeclaration
            )
        })
    }

    /// Deepest node whose range contains `range`.
    pub fn covering_node(&self, range: TextRange) -> Option<NodeId> {
        let root = self.root();
        if !self.range(root).contains_range(range) {
            return None;
        }
        let mut current = root;
        'descend: loop {
            for child in self.children(current) {
                if self.range(*child).contains_range(range) {
                    current = *child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_rules() {
        let a = TextRange::new(4, 10);
        assert!(a.overlaps(TextRange::new(9, 12)));
        assert!(!a.overlaps(TextRange::new(10, 12)));
        assert!(a.overlaps(TextRange::empty(5)));
        assert!(!a.overlaps(TextRange::empty(4)));
        assert!(!a.overlaps(TextRange::empty(10)));
        assert!(!TextRange::empty(3).overlaps(TextRange::empty(3)));
        assert!(a.overlaps(a));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            NodeKind::from_grammar_name("explicit_constructor_invocation"),
            NodeKind::ConstructorCall
        );
        assert_eq!(
            NodeKind::from_grammar_name("scoped_type_identifier"),
            NodeKind::QualifiedName
        );
        assert_eq!(
            NodeKind::from_grammar_name("lambda_expression"),
            NodeKind::Other("lambda_expression")
        );
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(last_segment("java.util.List"), "List");
        assert_eq!(last_segment("List"), "List");
        assert_eq!(qualifier("java.util.List"), Some("java.util"));
        assert_eq!(qualifier("List"), None);
    }

    #[test]
    fn test_navigation_over_built_tree() {
        let source = "class A { int x; }";
        let mut builder = TreeBuilder::new(source);
        let root = builder.root(NodeKind::CompilationUnit);
        let class = builder.node(root, NodeKind::TypeDeclaration, 0..18);
        let name = builder.node_with_field(class, NodeKind::Identifier, 6..7, Some("name"));
        let body = builder.node_with_field(class, NodeKind::TypeBody, 8..18, Some("body"));
        let field = builder.node(body, NodeKind::FieldDeclaration, 10..16);
        let tree = builder.build();

        assert_eq!(tree.text(name), "A");
        assert_eq!(tree.ancestors(field).collect::<Vec<_>>(), vec![body, class, root]);
        assert_eq!(
            tree.descendants(class).collect::<Vec<_>>(),
            vec![class, name, body, field]
        );
        assert_eq!(tree.declared_name(class), Some("A"));
        assert_eq!(tree.qualified_type_name(class).as_deref(), Some("A"));
        assert_eq!(tree.covering_node(TextRange::new(11, 13)), Some(field));
        assert_eq!(tree.covering_node(TextRange::new(0, 40)), None);
        assert_eq!(tree.enclosing_type(field), Some(class));
    }
}
