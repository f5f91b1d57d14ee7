//! Pending edits for one file.
//!
//! A [`RewriteSession`] records edits against node identities rather than text. Nothing is
//! applied until [`RewriteSession::flatten`] lowers the edits to [`TextEdit`]s, so edits may be
//! recorded in any order and overlap is only detected at that point.

use crate::{
    error::Result,
    options::SessionOptions,
    source::FileId,
    syntax::{NodeId, NodeKind, SyntaxTree, TextRange},
    text_edit::{apply_sorted, sort_and_check, TextEdit},
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(usize);

/// Group of the edits an [`ImportLedger`](crate::import_ledger::ImportLedger) contributes.
pub(crate) const IMPORT_GROUP: GroupId = GroupId(usize::MAX);
pub const IMPORT_GROUP_NAME: &str = "Update imports";

#[derive(Debug, Clone)]
pub struct EditGroup {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    Text(String),
    /// The original source of a node. Edits nested in that node are not carried along.
    CopyOf(NodeId),
}

/// Slot `index` among the non-comment children of `parent`; `index == len` appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListPosition {
    pub parent: NodeId,
    pub index: usize,
}

impl ListPosition {
    pub fn new(parent: NodeId, index: usize) -> Self {
        ListPosition { parent, index }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    Replace { node: NodeId, with: Replacement },
    Insert { at: ListPosition, text: String },
    Remove { node: NodeId },
    /// Removes the node and inserts its rendered text, nested edits included, at `to`.
    Move { node: NodeId, to: ListPosition },
    Copy { node: NodeId, to: ListPosition },
}

impl EditKind {
    /// The node whose range the edit is anchored in.
    fn anchor(&self) -> NodeId {
        match self {
            EditKind::Replace { node, .. }
            | EditKind::Remove { node }
            | EditKind::Move { node, .. }
            | EditKind::Copy { node, .. } => *node,
            EditKind::Insert { at, .. } => at.parent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub kind: EditKind,
    pub group: Option<GroupId>,
}

pub struct RewriteSession {
    file: FileId,
    tree: Arc<SyntaxTree>,
    edits: Vec<PendingEdit>,
    groups: Vec<EditGroup>,
    line_separator: String,
    indent_unit: String,
}

impl RewriteSession {
    pub fn new(file: FileId, tree: Arc<SyntaxTree>, options: &SessionOptions) -> Self {
        RewriteSession {
            file,
            tree,
            edits: Vec::new(),
            groups: Vec::new(),
            line_separator: options.line_separator.clone(),
            indent_unit: options.indent_unit.clone(),
        }
    }

    pub fn file(&self) -> &FileId {
        &self.file
    }

    pub fn tree(&self) -> &Arc<SyntaxTree> {
        &self.tree
    }

    pub fn create_edit_group(&mut self, name: impl Into<String>) -> GroupId {
        self.groups.push(EditGroup { name: name.into() });
        GroupId(self.groups.len() - 1)
    }

    pub fn groups(&self) -> &[EditGroup] {
        &self.groups
    }

    pub fn group_name(&self, group: GroupId) -> Option<&str> {
        if group == IMPORT_GROUP {
            return Some(IMPORT_GROUP_NAME);
        }
        self.groups.get(group.0).map(|g| g.name.as_str())
    }

    pub fn edits(&self) -> &[PendingEdit] {
        &self.edits
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Records an edit. Recording an identical edit twice keeps one copy.
    pub fn record_edit(&mut self, kind: EditKind, group: Option<GroupId>) {
        debug_assert!(kind.anchor().index() < self.tree.len());
        let edit = PendingEdit { kind, group };
        if self.edits.contains(&edit) {
            debug!(file = %self.file, ?edit, "ignoring duplicate edit");
            return;
        }
        debug!(file = %self.file, ?edit, "recorded edit");
        self.edits.push(edit);
    }

    pub fn replace(&mut self, node: NodeId, with: Replacement, group: Option<GroupId>) {
        self.record_edit(EditKind::Replace { node, with }, group);
    }

    pub fn replace_text(&mut self, node: NodeId, text: impl Into<String>, group: Option<GroupId>) {
        self.replace(node, Replacement::Text(text.into()), group);
    }

    pub fn insert(&mut self, at: ListPosition, text: impl Into<String>, group: Option<GroupId>) {
        self.record_edit(
            EditKind::Insert {
                at,
                text: text.into(),
            },
            group,
        );
    }

    pub fn remove(&mut self, node: NodeId, group: Option<GroupId>) {
        self.record_edit(EditKind::Remove { node }, group);
    }

    pub fn move_node(&mut self, node: NodeId, to: ListPosition, group: Option<GroupId>) {
        self.record_edit(EditKind::Move { node, to }, group);
    }

    pub fn copy_node(&mut self, node: NodeId, to: ListPosition, group: Option<GroupId>) {
        self.record_edit(EditKind::Copy { node, to }, group);
    }

    /// Drops all pending edits and groups. The tree is left alone.
    pub fn clear_edits(&mut self) {
        self.edits.clear();
        self.groups.clear();
    }

    /// Lowers every pending edit to text edits, sorted and checked for overlap.
    pub fn flatten(&self) -> Result<Vec<TextEdit>> {
        let moved: Vec<NodeId> = self
            .edits
            .iter()
            .filter_map(|edit| match edit.kind {
                EditKind::Move { node, .. } => Some(node),
                _ => None,
            })
            .collect();

        let mut text_edits = Vec::new();
        for edit in &self.edits {
            let anchor = edit.kind.anchor();
            let absorbed = moved
                .iter()
                .any(|&m| m != anchor && self.tree.is_within(anchor, m));
            if absorbed {
                continue;
            }
            self.lower(edit, &mut text_edits)?;
        }
        sort_and_check(&self.file, &mut text_edits)?;
        Ok(text_edits)
    }

    /// Source of `node` with every edit nested inside it applied.
    pub fn render(&self, node: NodeId) -> Result<String> {
        let range = self.tree.range(node);
        let mut nested = Vec::new();
        for edit in &self.edits {
            let anchor = edit.kind.anchor();
            if anchor != node && self.tree.is_within(anchor, node) {
                self.lower(edit, &mut nested)?;
            }
        }
        nested.retain(|edit| range.contains_range(edit.range));
        sort_and_check(&self.file, &mut nested)?;
        Ok(apply_sorted(self.tree.text(node), &nested, range.start))
    }

    fn lower(&self, edit: &PendingEdit, out: &mut Vec<TextEdit>) -> Result<()> {
        let group = edit.group;
        match &edit.kind {
            EditKind::Replace { node, with } => {
                let text = match with {
                    Replacement::Text(text) => text.as_str(),
                    Replacement::CopyOf(source) => self.tree.text(*source),
                };
                if text != self.tree.text(*node) {
                    out.push(TextEdit::new(self.tree.range(*node), text, group));
                }
            }
            EditKind::Remove { node } => {
                if let Some(range) = self.removal_range(*node) {
                    out.push(TextEdit::deletion(range, group));
                }
            }
            EditKind::Insert { at, text } => {
                out.push(self.list_insertion(*at, text, group));
            }
            EditKind::Move { node, to } => {
                if let Some(range) = self.removal_range(*node) {
                    out.push(TextEdit::deletion(range, group));
                }
                let rendered = self.render(*node)?;
                out.push(self.list_insertion(*to, &rendered, group));
            }
            EditKind::Copy { node, to } => {
                let rendered = self.render(*node)?;
                out.push(self.list_insertion(*to, &rendered, group));
            }
        }
        Ok(())
    }

    fn list_elements(&self, parent: NodeId) -> Vec<NodeId> {
        self.tree
            .children(parent)
            .iter()
            .copied()
            .filter(|child| self.tree.kind(*child) != NodeKind::Comment)
            .collect()
    }

    /// Nodes that a pending remove or move takes out of their place.
    fn removed_nodes(&self) -> BTreeSet<NodeId> {
        self.edits
            .iter()
            .filter_map(|edit| match edit.kind {
                EditKind::Remove { node } | EditKind::Move { node, .. } => Some(node),
                _ => None,
            })
            .collect()
    }

    /// Range to delete for `node`, widened to take its list separator or its whole line.
    ///
    /// Adjacent removed elements of a comma list are deleted as one run, lowered from the run's
    /// first element. The other elements of the run yield `None`.
    fn removal_range(&self, node: NodeId) -> Option<TextRange> {
        let range = self.tree.range(node);
        let Some(parent) = self.tree.parent(node) else {
            return Some(range);
        };

        if self.tree.kind(parent).is_comma_list() {
            let siblings = self.list_elements(parent);
            let Some(position) = siblings.iter().position(|s| *s == node) else {
                return Some(range);
            };
            let removed = self.removed_nodes();
            if position > 0 && removed.contains(&siblings[position - 1]) {
                return None;
            }
            let last = siblings[position..]
                .iter()
                .take_while(|s| **s == node || removed.contains(*s))
                .count()
                + position
                - 1;
            let run_end = self.tree.range(siblings[last]).end;
            return Some(if last + 1 < siblings.len() {
                TextRange::new(range.start, self.tree.range(siblings[last + 1]).start)
            } else if position > 0 {
                TextRange::new(self.tree.range(siblings[position - 1]).end, run_end)
            } else {
                TextRange::new(range.start, run_end)
            });
        }

        let source = self.tree.source();
        let line_start = line_start(source, range.start);
        let line_end = source[range.end..]
            .find('\n')
            .map_or(source.len(), |i| range.end + i);
        let alone_on_line = source[line_start..range.start].trim().is_empty()
            && source[range.end..line_end].trim().is_empty();
        if alone_on_line {
            Some(TextRange::new(line_start, (line_end + 1).min(source.len())))
        } else {
            Some(range)
        }
    }

    fn list_insertion(&self, at: ListPosition, text: &str, group: Option<GroupId>) -> TextEdit {
        let source = self.tree.source();
        let parent_range = self.tree.range(at.parent);
        let elements = self.list_elements(at.parent);
        let index = at.index.min(elements.len());

        if self.tree.kind(at.parent).is_comma_list() {
            return if elements.is_empty() {
                TextEdit::insertion(parent_range.start + 1, text, group)
            } else if index < elements.len() {
                let start = self.tree.range(elements[index]).start;
                TextEdit::insertion(start, format!("{text}, "), group)
            } else {
                let end = self.tree.range(elements[index - 1]).end;
                TextEdit::insertion(end, format!(", {text}"), group)
            };
        }

        let newline = self.line_separator.as_str();
        if elements.is_empty() {
            if at.parent == self.tree.root() {
                return TextEdit::insertion(0, format!("{text}{newline}"), group);
            }
            let outer = indentation(source, parent_range.start);
            let inner = format!("{outer}{}", self.indent_unit);
            return TextEdit::insertion(
                parent_range.start + 1,
                format!("{newline}{inner}{text}{newline}{outer}"),
                group,
            );
        }

        let indent = indentation(source, self.tree.range(elements[0]).start);
        if index < elements.len() {
            let start = self.tree.range(elements[index]).start;
            let line_start = line_start(source, start);
            if source[line_start..start].trim().is_empty() {
                TextEdit::insertion(line_start, format!("{indent}{text}{newline}"), group)
            } else {
                TextEdit::insertion(start, format!("{text}{newline}{indent}"), group)
            }
        } else {
            let end = self.tree.range(elements[index - 1]).end;
            TextEdit::insertion(end, format!("{newline}{indent}{text}"), group)
        }
    }
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map_or(0, |i| i + 1)
}

/// Leading whitespace of the line containing `offset`, or nothing if code precedes `offset`.
fn indentation(source: &str, offset: usize) -> String {
    let start = line_start(source, offset);
    let prefix = &source[start..offset];
    if prefix.trim().is_empty() {
        prefix.to_string()
    } else {
        prefix
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{JavaParser, SourceParser};

    fn session(source: &str) -> RewriteSession {
        let file = FileId::from("A.java");
        let tree = JavaParser::new()
            .unwrap()
            .parse(&file, source.into())
            .unwrap();
        RewriteSession::new(file, Arc::new(tree), &SessionOptions::default())
    }

    fn find(session: &RewriteSession, kind: NodeKind, text: &str) -> NodeId {
        let tree = session.tree();
        tree.descendants(tree.root())
            .find(|node| tree.kind(*node) == kind && tree.text(*node) == text)
            .unwrap_or_else(|| panic!("no {kind:?} `{text}`"))
    }

    fn first(session: &RewriteSession, kind: NodeKind) -> NodeId {
        let tree = session.tree();
        tree.descendants(tree.root())
            .find(|node| tree.kind(*node) == kind)
            .unwrap_or_else(|| panic!("no {kind:?}"))
    }

    fn apply(session: &RewriteSession) -> String {
        let edits = session.flatten().unwrap();
        apply_sorted(session.tree().source(), &edits, 0)
    }

    const SOURCE: &str = "class A {\n    int a;\n    int b;\n\n    void f() {\n        g(1, 2);\n    }\n}\n";

    #[test]
    fn test_exact_copies_round_trip() {
        let mut s = session(SOURCE);
        let tree = s.tree().clone();
        for node in tree.descendants(tree.root()).filter(|n| tree.kind(*n).is_name()) {
            s.replace(node, Replacement::CopyOf(node), None);
        }
        assert!(s.has_pending_edits());
        assert!(s.flatten().unwrap().is_empty());
        assert_eq!(apply(&s), SOURCE);
    }

    #[test]
    fn test_duplicate_edits_are_recorded_once() {
        let mut s = session(SOURCE);
        let a = find(&s, NodeKind::FieldDeclaration, "int a;");
        s.remove(a, None);
        s.remove(a, None);
        assert_eq!(s.edits().len(), 1);
    }

    #[test]
    fn test_overlapping_edits_fail_at_flatten_time() {
        let mut s = session(SOURCE);
        let method = first(&s, NodeKind::MethodDeclaration);
        let call = find(&s, NodeKind::MethodInvocation, "g(1, 2)");
        s.remove(method, None);
        s.replace_text(call, "h()", None);
        assert_eq!(s.edits().len(), 2);
        assert!(matches!(
            s.flatten(),
            Err(crate::error::EngineError::ConflictingEdit { .. })
        ));
    }

    #[test]
    fn test_remove_member_takes_its_line() {
        let mut s = session(SOURCE);
        let b = find(&s, NodeKind::FieldDeclaration, "int b;");
        s.remove(b, None);
        assert_eq!(
            apply(&s),
            "class A {\n    int a;\n\n    void f() {\n        g(1, 2);\n    }\n}\n"
        );
    }

    #[test]
    fn test_remove_argument_takes_its_comma() {
        let mut s = session(SOURCE);
        let one = find(&s, NodeKind::Other("decimal_integer_literal"), "1");
        s.remove(one, None);
        assert!(apply(&s).contains("g(2);"));

        let mut s = session(SOURCE);
        let two = find(&s, NodeKind::Other("decimal_integer_literal"), "2");
        s.remove(two, None);
        assert!(apply(&s).contains("g(1);"));
    }

    fn literal(s: &RewriteSession, text: &str) -> NodeId {
        find(s, NodeKind::Other("decimal_integer_literal"), text)
    }

    #[test]
    fn test_remove_adjacent_arguments_as_one_run() {
        let mut s = session(SOURCE);
        s.remove(literal(&s, "1"), None);
        s.remove(literal(&s, "2"), None);
        assert_eq!(s.flatten().unwrap().len(), 1);
        assert!(apply(&s).contains("g();"));

        let source = SOURCE.replace("g(1, 2)", "g(1, 2, 3)");
        let mut s = session(&source);
        s.remove(literal(&s, "3"), None);
        s.remove(literal(&s, "2"), None);
        assert!(apply(&s).contains("g(1);"));

        let mut s = session(&source);
        s.remove(literal(&s, "1"), None);
        s.remove(literal(&s, "2"), None);
        assert!(apply(&s).contains("g(3);"));

        let mut s = session(&source);
        s.remove(literal(&s, "1"), None);
        s.remove(literal(&s, "3"), None);
        assert!(apply(&s).contains("g(2);"));

        let mut s = session(&source);
        for text in ["2", "3", "1"] {
            s.remove(literal(&s, text), None);
        }
        assert!(apply(&s).contains("g();"));
    }

    #[test]
    fn test_insert_into_lists() {
        let mut s = session(SOURCE);
        let body = first(&s, NodeKind::TypeBody);
        let args = find(&s, NodeKind::ArgumentList, "(1, 2)");
        s.insert(ListPosition::new(body, 1), "int c;", None);
        s.insert(ListPosition::new(args, 2), "3", None);
        assert_eq!(
            apply(&s),
            "class A {\n    int a;\n    int c;\n    int b;\n\n    void f() {\n        g(1, 2, 3);\n    }\n}\n"
        );
    }

    #[test]
    fn test_insert_into_empty_body() {
        let mut s = session("class A {\n    class B {}\n}\n");
        let inner = find(&s, NodeKind::TypeBody, "{}");
        s.insert(ListPosition::new(inner, 0), "int x;", None);
        assert_eq!(
            apply(&s),
            "class A {\n    class B {\n        int x;\n    }\n}\n"
        );
    }

    #[test]
    fn test_move_carries_nested_edits() {
        let mut s = session(SOURCE);
        let body = first(&s, NodeKind::TypeBody);
        let method = first(&s, NodeKind::MethodDeclaration);
        let call_name = find(&s, NodeKind::Identifier, "g");
        s.replace_text(call_name, "h", None);
        s.move_node(method, ListPosition::new(body, 0), None);
        assert_eq!(
            apply(&s),
            "class A {\n    void f() {\n        h(1, 2);\n    }\n    int a;\n    int b;\n\n}\n"
        );
    }

    #[test]
    fn test_render_applies_nested_edits_only() {
        let mut s = session(SOURCE);
        let method = first(&s, NodeKind::MethodDeclaration);
        let call_name = find(&s, NodeKind::Identifier, "g");
        let a = find(&s, NodeKind::FieldDeclaration, "int a;");
        s.replace_text(call_name, "h", None);
        s.remove(a, None);
        assert_eq!(
            s.render(method).unwrap(),
            "void f() {\n        h(1, 2);\n    }"
        );
    }

    #[test]
    fn test_clear_edits_drops_groups() {
        let mut s = session(SOURCE);
        let group = s.create_edit_group("Rename");
        let a = find(&s, NodeKind::FieldDeclaration, "int a;");
        s.remove(a, Some(group));
        assert_eq!(s.group_name(group), Some("Rename"));
        s.clear_edits();
        assert!(!s.has_pending_edits());
        assert!(s.groups().is_empty());
    }
}
