//! Import bookkeeping for one file.
//!
//! Refactorings register the qualified names they introduce and the nodes they delete. From that
//! the ledger works out which imports to add and which became unused, and lowers both to text
//! edits confined to the file's import list.

use crate::{
    options::SessionOptions,
    rewrite_session::GroupId,
    syntax::{last_segment, qualifier, ImportEntry, NodeId, NodeKind, SyntaxTree, TextRange},
    text_edit::TextEdit,
};
use itertools::Itertools;
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, warn};

/// An import that can be dropped from a file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportedSymbol {
    pub qualified_name: String,
    pub is_static: bool,
}

pub struct ImportLedger {
    tree: Arc<SyntaxTree>,
    added: BTreeSet<String>,
    added_static: BTreeSet<String>,
    removed: Vec<NodeId>,
}

impl ImportLedger {
    pub fn new(tree: Arc<SyntaxTree>) -> Self {
        ImportLedger {
            tree,
            added: BTreeSet::new(),
            added_static: BTreeSet::new(),
            removed: Vec::new(),
        }
    }

    pub fn tree(&self) -> &Arc<SyntaxTree> {
        &self.tree
    }

    /// Records that a rewrite introduced a reference to the type `qualified_name`.
    pub fn register_added(&mut self, qualified_name: impl Into<String>) {
        let qualified_name = qualified_name.into();
        debug!(%qualified_name, "import registered");
        self.added.insert(qualified_name);
    }

    /// Records an introduced unqualified reference to a static member, `p.Type.member`.
    pub fn register_added_static(&mut self, qualified_member: impl Into<String>) {
        self.added_static.insert(qualified_member.into());
    }

    /// Records a node deleted by a refactoring; references inside it no longer count.
    pub fn register_removed_node(&mut self, node: NodeId) {
        if !self.removed.contains(&node) {
            self.removed.push(node);
        }
    }

    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.added_static.is_empty() && self.removed.is_empty()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.added_static.clear();
        self.removed.clear();
    }

    fn is_added(&self, import: &ImportEntry) -> bool {
        let names = if import.is_static {
            &self.added_static
        } else {
            &self.added
        };
        names.iter().any(|added| added == &import.qualified_name)
    }

    /// Imports whose every reference lies inside a removed node and that no rewrite re-added.
    pub fn compute_imports_to_remove(&self) -> BTreeSet<ImportedSymbol> {
        let mut removable = BTreeSet::new();
        if self.removed.is_empty() {
            return removable;
        }
        let removed_spans: Vec<TextRange> = self
            .removed
            .iter()
            .map(|node| self.tree.range(*node))
            .collect();
        let references = name_references(&self.tree);

        for import in self.tree.imports() {
            if import.on_demand || self.is_added(import) {
                continue;
            }
            let mut inside = 0;
            let mut outside = 0;
            for reference in references
                .iter()
                .filter(|r| self.tree.text(**r) == import.simple_name())
            {
                let range = self.tree.range(*reference);
                if removed_spans.iter().any(|span| span.contains_range(range)) {
                    inside += 1;
                } else {
                    outside += 1;
                }
            }
            if inside > 0 && outside == 0 {
                removable.insert(ImportedSymbol {
                    qualified_name: import.qualified_name.clone(),
                    is_static: import.is_static,
                });
            }
        }
        removable
    }

    /// Registered names that still need an import declaration in this file.
    pub fn imports_to_add(&self, options: &SessionOptions) -> Vec<(String, bool)> {
        let types = self.added.iter().map(|name| (name, false));
        let members = self.added_static.iter().map(|name| (name, true));
        types
            .chain(members)
            .filter(|(name, is_static)| self.needs_import(name, *is_static, options))
            .map(|(name, is_static)| (name.clone(), is_static))
            .collect()
    }

    fn needs_import(&self, qualified_name: &str, is_static: bool, options: &SessionOptions) -> bool {
        let Some(container) = qualifier(qualified_name) else {
            return false;
        };
        if !is_static {
            if options.is_implicitly_imported(qualified_name)
                || self.tree.package() == Some(container)
                || self.tree.declares_type(qualified_name)
            {
                return false;
            }
        } else if self.tree.declares_type(container) {
            return false;
        }

        let simple_name = last_segment(qualified_name);
        for import in self.tree.imports() {
            if import.is_static != is_static {
                continue;
            }
            if import.qualified_name == qualified_name
                || (import.on_demand && import.container() == container)
            {
                return false;
            }
            if !import.on_demand && import.simple_name() == simple_name {
                warn!(
                    %qualified_name,
                    existing = %import.qualified_name,
                    "import would clash with an existing import"
                );
                return false;
            }
        }
        true
    }

    /// Text edits adding and removing import declarations, all tagged with `group`.
    pub fn import_edits(&self, options: &SessionOptions, group: Option<GroupId>) -> Vec<TextEdit> {
        let source = self.tree.source();
        let newline = options.line_separator.as_str();
        let mut edits = Vec::new();

        let to_remove = self.compute_imports_to_remove();
        for import in self.tree.imports() {
            let symbol = ImportedSymbol {
                qualified_name: import.qualified_name.clone(),
                is_static: import.is_static,
            };
            if to_remove.contains(&symbol) {
                let range = line_range(source, self.tree.range(import.node));
                edits.push(TextEdit::deletion(range, group));
            }
        }

        let to_add = self.imports_to_add(options);
        if !to_add.is_empty() {
            let block = to_add
                .iter()
                .sorted_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)))
                .map(|(name, is_static)| {
                    if *is_static {
                        format!("import static {name};{newline}")
                    } else {
                        format!("import {name};{newline}")
                    }
                })
                .join("");
            edits.push(self.import_insertion(block, newline, group));
        }
        edits
    }

    fn import_insertion(&self, block: String, newline: &str, group: Option<GroupId>) -> TextEdit {
        let source = self.tree.source();
        if let Some(last) = self.tree.imports().last() {
            let end = line_range(source, self.tree.range(last.node)).end;
            if end > 0 && source.as_bytes()[end - 1] == b'\n' {
                return TextEdit::insertion(end, block, group);
            }
            return TextEdit::insertion(end, format!("{newline}{block}"), group);
        }
        let package = self
            .tree
            .children(self.tree.root())
            .iter()
            .copied()
            .find(|node| self.tree.kind(*node) == NodeKind::PackageDeclaration);
        match package {
            Some(package) => {
                let end = line_range(source, self.tree.range(package)).end;
                if end > 0 && source.as_bytes()[end - 1] == b'\n' {
                    TextEdit::insertion(end, format!("{newline}{block}"), group)
                } else {
                    TextEdit::insertion(end, format!("{newline}{newline}{block}"), group)
                }
            }
            None => TextEdit::insertion(0, format!("{block}{newline}"), group),
        }
    }
}

/// Name nodes that stand for something an import could provide: unqualified names and the
/// leftmost segment of qualified ones, outside the import list itself.
fn name_references(tree: &SyntaxTree) -> Vec<NodeId> {
    tree.descendants(tree.root())
        .filter(|node| tree.kind(*node).is_name())
        .filter(|node| !tree.is_in_header(*node))
        .filter(|node| is_leading_segment(tree, *node))
        .collect()
}

pub(crate) fn is_leading_segment(tree: &SyntaxTree, node: NodeId) -> bool {
    let Some(parent) = tree.parent(node) else {
        return true;
    };
    match tree.kind(parent) {
        NodeKind::QualifiedName => match tree.field(node) {
            Some(field) => field == "scope",
            None => tree.children(parent).first() == Some(&node),
        },
        NodeKind::FieldAccess => tree.field(node) == Some("object"),
        NodeKind::MethodInvocation => match tree.field(node) {
            Some("name") => tree.child_by_field(parent, "object").is_none(),
            _ => true,
        },
        NodeKind::MethodReference => tree.children(parent).first() == Some(&node),
        NodeKind::VariableDeclarator
        | NodeKind::MethodDeclaration
        | NodeKind::TypeDeclaration
        | NodeKind::ConstructorDeclaration => tree.field(node) != Some("name"),
        _ => true,
    }
}

/// The full line(s) holding `range`, newline included.
fn line_range(source: &str, range: TextRange) -> TextRange {
    let start = source[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let end = source[range.end..]
        .find('\n')
        .map_or(source.len(), |i| range.end + i + 1);
    TextRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        source::FileId,
        syntax::{JavaParser, SourceParser},
        text_edit::{apply_sorted, sort_and_check},
    };

    fn ledger(source: &str) -> ImportLedger {
        let tree = JavaParser::new()
            .unwrap()
            .parse(&FileId::from("A.java"), source.into())
            .unwrap();
        ImportLedger::new(Arc::new(tree))
    }

    fn statement(ledger: &ImportLedger, text: &str) -> NodeId {
        let tree = ledger.tree();
        tree.descendants(tree.root())
            .find(|n| tree.text(*n) == text && tree.kind(*n) != NodeKind::Identifier)
            .unwrap_or_else(|| panic!("no node `{text}`"))
    }

    fn apply(ledger: &ImportLedger) -> String {
        let mut edits = ledger.import_edits(&SessionOptions::default(), None);
        sort_and_check(&FileId::from("A.java"), &mut edits).unwrap();
        apply_sorted(ledger.tree().source(), &edits, 0)
    }

    const SOURCE: &str = "package p;\n\nimport q.X;\nimport q.Y;\n\nclass A {\n    void f() {\n        X x = new X();\n        Y y = null;\n    }\n    void g() {\n        Y.run();\n    }\n}\n";

    fn symbol(name: &str) -> ImportedSymbol {
        ImportedSymbol {
            qualified_name: name.to_string(),
            is_static: false,
        }
    }

    #[test]
    fn test_no_removed_nodes_means_no_removals() {
        let ledger = ledger(SOURCE);
        assert!(ledger.is_empty());
        assert!(ledger.compute_imports_to_remove().is_empty());
    }

    #[test]
    fn test_import_whose_only_references_were_removed() {
        let mut ledger = ledger(SOURCE);
        ledger.register_removed_node(statement(&ledger, "X x = new X();"));
        ledger.register_removed_node(statement(&ledger, "Y y = null;"));
        assert_eq!(
            ledger.compute_imports_to_remove(),
            BTreeSet::from([symbol("q.X")])
        );
        assert_eq!(
            apply(&ledger),
            SOURCE.replace("import q.X;\n", "")
        );
    }

    #[test]
    fn test_added_import_is_never_removed() {
        let mut ledger = ledger(SOURCE);
        ledger.register_removed_node(statement(&ledger, "X x = new X();"));
        ledger.register_added("q.X");
        assert!(ledger.compute_imports_to_remove().is_empty());

        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(apply(&ledger), SOURCE);
    }

    #[test]
    fn test_same_simple_name_does_not_keep_import() {
        let mut ledger = ledger(SOURCE);
        ledger.register_removed_node(statement(&ledger, "X x = new X();"));
        ledger.register_added("s.X");
        assert_eq!(
            ledger.compute_imports_to_remove(),
            BTreeSet::from([symbol("q.X")])
        );
        assert!(ledger.imports_to_add(&SessionOptions::default()).is_empty());
        assert_eq!(apply(&ledger), SOURCE.replace("import q.X;\n", ""));
    }

    #[test]
    fn test_member_names_do_not_keep_imports_alive() {
        let mut ledger = ledger(
            "import q.X;\nclass A {\n    int f(B b) {\n        X.go();\n        return b.X;\n    }\n}\n",
        );
        ledger.register_removed_node(statement(&ledger, "X.go();"));
        assert_eq!(
            ledger.compute_imports_to_remove(),
            BTreeSet::from([symbol("q.X")])
        );
    }

    #[test]
    fn test_additions_skip_visible_names() {
        let mut ledger = ledger(SOURCE);
        ledger.register_added("java.lang.String");
        ledger.register_added("p.Sibling");
        ledger.register_added("q.X");
        ledger.register_added("r.Z");
        ledger.register_added("s.X");
        let added: Vec<String> = ledger
            .imports_to_add(&SessionOptions::default())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(added, vec!["r.Z"]);
        assert_eq!(
            apply(&ledger),
            SOURCE.replace("import q.Y;\n", "import q.Y;\nimport r.Z;\n")
        );
    }

    #[test]
    fn test_insertion_after_package_without_imports() {
        let mut ledger = ledger("package p;\n\nclass A {}\n");
        ledger.register_added("r.B");
        assert_eq!(apply(&ledger), "package p;\n\nimport r.B;\n\nclass A {}\n");
    }

    #[test]
    fn test_insertion_at_top_without_header() {
        let mut ledger = ledger("class A {}\n");
        ledger.register_added("r.B");
        ledger.register_added_static("r.B.COUNT");
        assert_eq!(
            apply(&ledger),
            "import r.B;\nimport static r.B.COUNT;\n\nclass A {}\n"
        );
    }

    #[test]
    fn test_on_demand_import_covers_addition() {
        let mut ledger = ledger("import r.*;\nclass A {}\n");
        ledger.register_added("r.B");
        assert!(ledger.imports_to_add(&SessionOptions::default()).is_empty());
    }

    #[test]
    fn test_static_import_removed_with_last_call() {
        let mut ledger = ledger(
            "import static q.Util.max;\nclass A {\n    int f() {\n        return max(1, 2);\n    }\n}\n",
        );
        ledger.register_removed_node(statement(&ledger, "return max(1, 2);"));
        assert_eq!(
            ledger.compute_imports_to_remove(),
            BTreeSet::from([ImportedSymbol {
                qualified_name: "q.Util.max".to_string(),
                is_static: true,
            }])
        );
    }
}
