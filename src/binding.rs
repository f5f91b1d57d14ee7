//! Resolved identities of names.
//!
//! The engine never resolves names itself. A [`BindingResolver`] answers "what does this node
//! refer to", and returns `None` for anything it cannot tell, which callers treat as "leave it
//! alone".

use crate::{
    source::FileId,
    syntax::{NodeId, Point, SyntaxTree},
};
use std::{collections::HashMap, ops::Range, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Type,
    Field,
    Method,
    Constructor,
    Package,
    Local,
    Other,
}

/// Where the declaration a binding points at lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Source,
    /// Only available as compiled classes; its declaration cannot be edited.
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    /// Identity of the declaration. Two bindings refer to the same thing iff symbols are equal.
    pub symbol: Arc<str>,
    pub name: String,
    /// Dotted name: `p.A` for types, `p.A.COUNT` for members.
    pub qualified_name: String,
    pub kind: BindingKind,
    /// Qualified name of the type declaring a member.
    pub declaring_type: Option<String>,
    pub is_static: bool,
    pub origin: Origin,
}

impl Binding {
    pub fn type_(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        Binding {
            symbol: qualified_name.as_str().into(),
            name: crate::syntax::last_segment(&qualified_name).to_string(),
            qualified_name,
            kind: BindingKind::Type,
            declaring_type: None,
            is_static: false,
            origin: Origin::Source,
        }
    }

    pub fn member(
        kind: BindingKind,
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        is_static: bool,
    ) -> Self {
        let declaring_type = declaring_type.into();
        let name = name.into();
        let qualified_name = format!("{declaring_type}.{name}");
        let symbol = match kind {
            BindingKind::Method | BindingKind::Constructor => format!("{qualified_name}()"),
            _ => qualified_name.clone(),
        };
        Binding {
            symbol: symbol.into(),
            name,
            qualified_name,
            kind,
            declaring_type: Some(declaring_type),
            is_static,
            origin: Origin::Source,
        }
    }

    pub fn static_field(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::member(BindingKind::Field, declaring_type, name, true)
    }

    pub fn static_method(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::member(BindingKind::Method, declaring_type, name, true)
    }

    pub fn local(name: impl Into<String>) -> Self {
        let name = name.into();
        Binding {
            symbol: format!("local {name}").into(),
            qualified_name: name.clone(),
            name,
            kind: BindingKind::Local,
            declaring_type: None,
            is_static: false,
            origin: Origin::Source,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn is_type(&self) -> bool {
        self.kind == BindingKind::Type
    }

    pub fn is_member(&self) -> bool {
        matches!(self.kind, BindingKind::Field | BindingKind::Method)
    }

    pub fn is_declared_by(&self, qualified_type: &str) -> bool {
        self.declaring_type.as_deref() == Some(qualified_type)
    }
}

pub trait BindingResolver {
    fn resolve(&self, file: &FileId, tree: &SyntaxTree, node: NodeId) -> Option<Binding>;
}

/// Bindings registered by position, for callers that already know the answers.
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: HashMap<(FileId, Point, Point), Binding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, file: FileId, range: Range<Point>, binding: Binding) {
        self.bindings.insert((file, range.start, range.end), binding);
    }

    /// Binds every node of `tree` whose text is exactly `text`.
    pub fn bind_text(&mut self, file: &FileId, tree: &SyntaxTree, text: &str, binding: &Binding) {
        let nodes: Vec<NodeId> = tree
            .descendants(tree.root())
            .filter(|node| tree.kind(*node).is_name() && tree.text(*node) == text)
            .collect();
        for node in nodes {
            self.bind(file.clone(), tree.point_range(node), binding.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl BindingResolver for BindingTable {
    fn resolve(&self, file: &FileId, tree: &SyntaxTree, node: NodeId) -> Option<Binding> {
        let range = tree.point_range(node);
        self.bindings
            .get(&(file.clone(), range.start, range.end))
            .cloned()
    }
}
