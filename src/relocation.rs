//! Requalifies references when static members move from one type to another.
//!
//! One [`MemberRelocationRewriter`] pass walks a subtree of one file and records edits in that
//! file's [`RewriteSession`]. Imports the new qualifiers need are registered with an
//! [`ImportLedger`].

use crate::{
    binding::{Binding, BindingResolver, Origin},
    error::EngineError,
    import_ledger::{is_leading_segment, ImportLedger},
    rewrite_session::{GroupId, RewriteSession},
    source::FileId,
    status::RefactoringStatus,
    syntax::{last_segment, NodeId, NodeKind, SyntaxTree},
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Static members moving from `source` to `target`, both qualified type names.
#[derive(Debug, Clone)]
pub struct RelocationDescriptor {
    members: Vec<Binding>,
    source: String,
    target: String,
}

impl RelocationDescriptor {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        members: impl IntoIterator<Item = Binding>,
    ) -> Self {
        RelocationDescriptor {
            members: members.into_iter().collect(),
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn members(&self) -> &[Binding] {
        &self.members
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_relocated(&self, binding: &Binding) -> bool {
        self.members.iter().any(|m| m.symbol == binding.symbol)
    }

    pub fn member_named(&self, name: &str) -> Option<&Binding> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    /// Code that refers to the moved members from elsewhere.
    References,
    /// The bodies of the moved members themselves, on their way into the target type.
    MovedMembers,
}

#[derive(Debug, Default)]
pub struct RewriteOutcome {
    pub rewritten: usize,
    /// A qualifier was introduced for a type the file does not declare.
    pub needs_import: bool,
    pub status: RefactoringStatus,
}

pub struct MemberRelocationRewriter<'a> {
    descriptor: &'a RelocationDescriptor,
    resolver: &'a dyn BindingResolver,
    mode: RewriteMode,
    group: Option<GroupId>,
    excluded: Vec<NodeId>,
}

impl<'a> MemberRelocationRewriter<'a> {
    pub fn new(
        descriptor: &'a RelocationDescriptor,
        resolver: &'a dyn BindingResolver,
        mode: RewriteMode,
    ) -> Self {
        MemberRelocationRewriter {
            descriptor,
            resolver,
            mode,
            group: None,
            excluded: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    /// Leaves the subtrees under `nodes` untouched, e.g. declarations that are being moved away.
    pub fn excluding(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.excluded.extend(nodes);
        self
    }

    /// Rewrites every reference below `scope`. In [`RewriteMode::References`] the ledger must
    /// belong to the session's file. In [`RewriteMode::MovedMembers`] it belongs to the file
    /// the members are moving into.
    pub fn rewrite(
        &self,
        session: &mut RewriteSession,
        ledger: &mut ImportLedger,
        scope: NodeId,
    ) -> RewriteOutcome {
        let tree = session.tree().clone();
        let file = session.file().clone();
        debug_assert!(
            self.mode == RewriteMode::MovedMembers || std::sync::Arc::ptr_eq(ledger.tree(), &tree)
        );

        let mut pass = Pass {
            rewriter: self,
            tree: &*tree,
            file: &file,
            processed: HashSet::new(),
            statically_imported: HashSet::new(),
            outcome: RewriteOutcome::default(),
        };
        if tree.is_malformed() {
            warn!(%file, "not rewriting references in malformed file");
            pass.outcome
                .status
                .add_engine_error(&EngineError::MalformedTree { file: file.clone() });
            return pass.outcome;
        }

        for node in &self.excluded {
            pass.mark_processed(*node);
        }
        if self.mode == RewriteMode::References {
            pass.rewrite_static_imports(session);
        }
        let nodes: Vec<NodeId> = tree.descendants(scope).collect();
        for node in nodes {
            if !pass.processed.contains(&node) {
                pass.visit(node, session, ledger);
            }
        }

        info!(
            %file,
            mode = ?self.mode,
            rewritten = pass.outcome.rewritten,
            "rewrote references to relocated members"
        );
        pass.outcome
    }
}

struct Pass<'p> {
    rewriter: &'p MemberRelocationRewriter<'p>,
    tree: &'p SyntaxTree,
    file: &'p FileId,
    processed: HashSet<NodeId>,
    /// Relocated members this file imports statically, by simple name.
    statically_imported: HashSet<String>,
    outcome: RewriteOutcome,
}

impl<'p> Pass<'p> {
    fn descriptor(&self) -> &'p RelocationDescriptor {
        self.rewriter.descriptor
    }

    fn resolve(&self, node: NodeId) -> Option<Binding> {
        self.rewriter.resolver.resolve(self.file, self.tree, node)
    }

    fn mark_processed(&mut self, node: NodeId) {
        self.processed.extend(self.tree.descendants(node));
    }

    fn rewrite_static_imports(&mut self, session: &mut RewriteSession) {
        let tree = self.tree;
        for import in tree.imports() {
            if !import.is_static || import.on_demand || import.container() != self.descriptor().source() {
                continue;
            }
            let Some(member) = self.descriptor().member_named(import.simple_name()) else {
                continue;
            };
            let Some(name) = tree.first_child_of_kind(import.node, NodeKind::QualifiedName) else {
                continue;
            };
            let text = format!("{}.{}", self.descriptor().target(), member.name);
            session.replace_text(name, text, self.rewriter.group);
            self.statically_imported.insert(member.name.clone());
            self.mark_processed(import.node);
            self.outcome.rewritten += 1;
        }
    }

    fn visit(&mut self, node: NodeId, session: &mut RewriteSession, ledger: &mut ImportLedger) {
        let tree = self.tree;
        if tree.is_in_header(node) {
            return;
        }
        match tree.kind(node) {
            NodeKind::FieldAccess => {
                if let (Some(object), Some(field)) = (
                    tree.child_by_field(node, "object"),
                    tree.child_by_field(node, "field"),
                ) {
                    self.qualified(object, field, session, ledger);
                }
            }
            NodeKind::MethodInvocation => {
                if let (Some(object), Some(name)) = (
                    tree.child_by_field(node, "object"),
                    tree.child_by_field(node, "name"),
                ) {
                    self.qualified(object, name, session, ledger);
                }
            }
            NodeKind::QualifiedName => {
                if let (Some(scope), Some(name)) = (
                    tree.child_by_field(node, "scope"),
                    tree.child_by_field(node, "name"),
                ) {
                    self.qualified(scope, name, session, ledger);
                }
            }
            NodeKind::MethodReference => {
                let children = tree.children(node);
                if let (Some(&first), Some(&last)) = (children.first(), children.last()) {
                    if first != last && tree.kind(last) == NodeKind::Identifier {
                        self.qualified(first, last, session, ledger);
                    }
                }
            }
            kind if kind.is_name() && is_leading_segment(tree, node) => {
                self.unqualified(node, session, ledger);
            }
            _ => {}
        }
    }

    /// `qualifier.member`, in any of the forms Java spells it.
    fn qualified(
        &mut self,
        qualifier: NodeId,
        member: NodeId,
        session: &mut RewriteSession,
        ledger: &mut ImportLedger,
    ) {
        let tree = self.tree;
        let Some(binding) = self.resolve(member) else {
            self.report_unresolved(member);
            return;
        };
        if !self.descriptor().is_relocated(&binding) {
            return;
        }
        self.processed.insert(member);
        if !self.check_origin(&binding, member) {
            return;
        }

        let qualifier_binding = qualifier_name(tree, qualifier).and_then(|name| self.resolve(name));
        match qualifier_binding {
            Some(qualifier_binding) if qualifier_binding.is_type() => {
                self.mark_processed(qualifier);
                let target = self.descriptor().target();
                if qualifier_binding.qualified_name == target {
                    return;
                }
                let fully_qualified =
                    matches!(tree.kind(qualifier), NodeKind::FieldAccess | NodeKind::QualifiedName);
                let (text, imported) = if fully_qualified {
                    (target.to_string(), false)
                } else {
                    self.type_reference(ledger, target)
                };
                debug!(file = %self.file, from = tree.text(qualifier), to = %text, "requalifying");
                session.replace_text(qualifier, text, self.rewriter.group);
                self.outcome.rewritten += 1;
                if self.rewriter.mode == RewriteMode::References {
                    ledger.register_removed_node(qualifier);
                }
                if imported {
                    self.register_import(ledger, target.to_string());
                }
            }
            Some(_) => {
                warn!(file = %self.file, receiver = tree.text(qualifier), "instance receiver left alone");
                self.outcome.status.add_warning(
                    format!(
                        "`{}` is accessed through an instance; qualifier left unchanged",
                        tree.text(member)
                    ),
                    self.file,
                    tree.range(qualifier),
                );
            }
            None => match tree.kind(qualifier) {
                NodeKind::This | NodeKind::Super => {
                    self.outcome.status.add_warning(
                        format!(
                            "`{}` is accessed through `{}`; qualifier left unchanged",
                            tree.text(member),
                            tree.text(qualifier)
                        ),
                        self.file,
                        tree.range(qualifier),
                    );
                }
                _ => self.report_unresolved(qualifier),
            },
        }
    }

    fn unqualified(&mut self, node: NodeId, session: &mut RewriteSession, ledger: &mut ImportLedger) {
        let mode = self.rewriter.mode;
        let Some(binding) = self.resolve(node) else {
            self.report_unresolved(node);
            return;
        };

        if binding.is_type() {
            // Types the moved code names must be importable where it lands.
            if mode == RewriteMode::MovedMembers {
                ledger.register_added(binding.qualified_name);
            }
            return;
        }

        let source = self.descriptor().source().to_string();
        if self.descriptor().is_relocated(&binding) {
            if !self.check_origin(&binding, node) || mode == RewriteMode::MovedMembers {
                return;
            }
            let target = self.descriptor().target().to_string();
            if self.statically_imported.contains(&binding.name) || self.is_inside_type(node, &target) {
                return;
            }
            self.qualify(node, &target, session, ledger);
        } else if mode == RewriteMode::MovedMembers
            && binding.is_static
            && binding.is_member()
            && binding.is_declared_by(&source)
        {
            // A sibling left behind in the source type.
            self.qualify(node, &source, session, ledger);
        }
    }

    fn qualify(
        &mut self,
        node: NodeId,
        qualified_type: &str,
        session: &mut RewriteSession,
        ledger: &mut ImportLedger,
    ) {
        let (prefix, imported) = self.type_reference(ledger, qualified_type);
        let text = format!("{prefix}.{}", self.tree.text(node));
        debug!(file = %self.file, %text, "qualifying reference");
        session.replace_text(node, text, self.rewriter.group);
        self.processed.insert(node);
        self.outcome.rewritten += 1;
        if imported {
            self.register_import(ledger, qualified_type.to_string());
        }
    }

    /// How `qualified_type` is written in the ledger's file, and whether that spelling relies on
    /// an import. The simple name is used unless it already denotes a different type there, in
    /// which case the qualified name is written and nothing is imported.
    fn type_reference(&self, ledger: &ImportLedger, qualified_type: &str) -> (String, bool) {
        let tree = ledger.tree();
        let simple_name = last_segment(qualified_type);
        if tree.declares_type(qualified_type) {
            return (simple_name.to_string(), true);
        }
        let import = tree
            .imports()
            .iter()
            .find(|import| !import.is_static && !import.on_demand && import.simple_name() == simple_name);
        let taken = match import {
            Some(import) => import.qualified_name != qualified_type,
            None => {
                let descriptor = self.descriptor();
                tree.declared_types()
                    .iter()
                    .any(|(_, name)| last_segment(name) == simple_name)
                    || [descriptor.source(), descriptor.target()]
                        .into_iter()
                        .any(|other| other != qualified_type && last_segment(other) == simple_name)
            }
        };
        if taken {
            (qualified_type.to_string(), false)
        } else {
            (simple_name.to_string(), true)
        }
    }

    fn register_import(&mut self, ledger: &mut ImportLedger, qualified_type: String) {
        if !ledger.tree().declares_type(&qualified_type) {
            self.outcome.needs_import = true;
        }
        ledger.register_added(qualified_type);
    }

    /// Binary members cannot be rewritten; reports them and returns false.
    fn check_origin(&mut self, binding: &Binding, node: NodeId) -> bool {
        if binding.origin == Origin::Source {
            return true;
        }
        let error = EngineError::UnsupportedBinaryReference {
            symbol: binding.qualified_name.clone(),
        };
        warn!(file = %self.file, %error);
        self.outcome
            .status
            .add_error(error.to_string(), self.file, self.tree.range(node));
        false
    }

    fn report_unresolved(&mut self, node: NodeId) {
        let tree = self.tree;
        let text = tree.text(node);
        if self.descriptor().member_named(text).is_none() {
            return;
        }
        let error = EngineError::UnresolvedBinding {
            file: self.file.clone(),
            text: text.to_string(),
        };
        debug!(%error);
        self.outcome
            .status
            .add_warning(error.to_string(), self.file, tree.range(node));
    }

    fn is_inside_type(&self, node: NodeId, qualified_type: &str) -> bool {
        self.tree
            .ancestors(node)
            .filter(|n| self.tree.kind(*n) == NodeKind::TypeDeclaration)
            .any(|n| self.tree.qualified_type_name(n).as_deref() == Some(qualified_type))
    }
}

/// The name node a qualifier's binding is attached to.
fn qualifier_name(tree: &SyntaxTree, qualifier: NodeId) -> Option<NodeId> {
    match tree.kind(qualifier) {
        NodeKind::Identifier | NodeKind::TypeIdentifier => Some(qualifier),
        NodeKind::FieldAccess => tree.child_by_field(qualifier, "field"),
        NodeKind::QualifiedName => tree.child_by_field(qualifier, "name"),
        _ => None,
    }
}
