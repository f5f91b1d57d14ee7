use super::{
    ImportEntry, LineIndex, NodeData, NodeId, NodeKind, Point, SyntaxTree, TextRange, TreeId,
};
use std::sync::Arc;

/// Builds a [`SyntaxTree`] node by node. Children must be added in source order.
pub struct TreeBuilder {
    source: Arc<str>,
    nodes: Vec<NodeData>,
    malformed: bool,
}

impl TreeBuilder {
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        TreeBuilder {
            source: source.into(),
            nodes: Vec::new(),
            malformed: false,
        }
    }

    /// Adds the root, spanning the whole source. Must be the first node added.
    pub fn root(&mut self, kind: NodeKind) -> NodeId {
        debug_assert!(self.nodes.is_empty(), "root must be added first");
        let len = self.source.len();
        self.push(None, kind, TextRange::new(0, len), None)
    }

    pub fn node(&mut self, parent: NodeId, kind: NodeKind, range: impl Into<TextRange>) -> NodeId {
        self.push(Some(parent), kind, range.into(), None)
    }

    pub fn node_with_field(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        range: impl Into<TextRange>,
        field: Option<&'static str>,
    ) -> NodeId {
        self.push(Some(parent), kind, range.into(), field)
    }

    pub fn mark_malformed(&mut self) {
        self.malformed = true;
    }

    fn push(
        &mut self,
        parent: Option<NodeId>,
        kind: NodeKind,
        range: TextRange,
        field: Option<&'static str>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            range,
            start_point: Point::default(),
            end_point: Point::default(),
            parent,
            children: Vec::new(),
            field,
        });
        if let Some(parent) = parent {
            self.nodes[parent.index()].children.push(id);
        }
        id
    }

    pub fn build(mut self) -> SyntaxTree {
        let line_index = LineIndex::new(&self.source);
        for node in self.nodes.iter_mut() {
            node.start_point = line_index.point(node.range.start);
            node.end_point = line_index.point(node.range.end);
        }

        let mut tree = SyntaxTree {
            id: TreeId::next(),
            source: self.source,
            nodes: self.nodes,
            package: None,
            imports: Vec::new(),
            malformed: self.malformed,
        };
        if tree.nodes.is_empty() {
            return tree;
        }
        let (package, imports) = header_entries(&tree);
        tree.package = package;
        tree.imports = imports;
        tree
    }
}

fn header_entries(tree: &SyntaxTree) -> (Option<String>, Vec<ImportEntry>) {
    let mut package = None;
    let mut imports = Vec::new();
    for &child in tree.children(tree.root()) {
        let name = tree.children(child).iter().copied().find(|n| {
            matches!(
                tree.kind(*n),
                NodeKind::Identifier | NodeKind::QualifiedName
            )
        });
        match (tree.kind(child), name) {
            (NodeKind::PackageDeclaration, Some(name)) => {
                package = Some(tree.text(name).to_string());
            }
            (NodeKind::ImportDeclaration, Some(name)) => {
                let keywords = &tree.source()[tree.range(child).start..tree.range(name).start];
                imports.push(ImportEntry {
                    node: child,
                    qualified_name: tree.text(name).to_string(),
                    is_static: keywords.split_whitespace().any(|token| token == "static"),
                    on_demand: tree.first_child_of_kind(child, NodeKind::Asterisk).is_some(),
                });
            }
            _ => {}
        }
    }
    (package, imports)
}
