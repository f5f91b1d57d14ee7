use crate::{
    error::{EngineError, Result},
    source::{acquire_text, CancellationToken, FileId, TextStore},
    syntax::{NodeRef, SourceParser, SyntaxTree, TreeId},
};
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};
use tracing::{debug, warn};

/// One parsed tree per file for the lifetime of a session.
pub struct TreeCache {
    parser: Box<dyn SourceParser>,
    trees: HashMap<FileId, Arc<SyntaxTree>>,
    owners: HashMap<TreeId, FileId>,
}

impl TreeCache {
    pub fn new(parser: Box<dyn SourceParser>) -> Self {
        TreeCache {
            parser,
            trees: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Returns the cached tree for `file`, parsing it on first request.
    pub fn get_tree(
        &mut self,
        file: &FileId,
        texts: &dyn TextStore,
        cancel: &CancellationToken,
    ) -> Result<Arc<SyntaxTree>> {
        match self.trees.entry(file.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let text = acquire_text(texts, file, cancel)?;
                let tree = self.parser.parse(file, text.shared())?;
                debug!(%file, nodes = tree.len(), "parsed syntax tree");
                if tree.is_malformed() {
                    warn!(%file, "syntax tree contains errors");
                }
                let tree = Arc::new(tree);
                self.owners.insert(tree.id(), file.clone());
                Ok(entry.insert(tree).clone())
            }
        }
    }

    pub fn cached(&self, file: &FileId) -> Option<&Arc<SyntaxTree>> {
        self.trees.get(file)
    }

    /// The file a node was handed out from.
    pub fn owner_of(&self, node: NodeRef) -> Result<&FileId> {
        let file = self
            .owners
            .get(&node.tree)
            .ok_or(EngineError::NotFound { node })?;
        match self.trees.get(file) {
            Some(tree) if tree.contains(node) => Ok(file),
            _ => Err(EngineError::NotFound { node }),
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &FileId> {
        self.trees.keys()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn clear(&mut self) {
        debug!(trees = self.trees.len(), "clearing tree cache");
        self.trees.clear();
        self.owners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        source::FsTextStore,
        syntax::{JavaParser, NodeKind, TreeBuilder},
    };
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingParser {
        inner: JavaParser,
        parses: Rc<Cell<usize>>,
    }

    impl SourceParser for CountingParser {
        fn parse(&mut self, file: &FileId, text: Arc<str>) -> Result<SyntaxTree> {
            self.parses.set(self.parses.get() + 1);
            self.inner.parse(file, text)
        }
    }

    fn cache_with_counter() -> (TreeCache, Rc<Cell<usize>>) {
        let parses = Rc::new(Cell::new(0));
        let parser = CountingParser {
            inner: JavaParser::new().unwrap(),
            parses: parses.clone(),
        };
        (TreeCache::new(Box::new(parser)), parses)
    }

    fn store() -> FsTextStore {
        FsTextStore::in_memory()
            .with_working_copy("A.java", "class A {}")
            .with_working_copy("B.java", "class B {}")
    }

    #[test]
    fn test_repeated_requests_return_the_same_tree() {
        let (mut cache, parses) = cache_with_counter();
        let store = store();
        let cancel = CancellationToken::new();
        let file = FileId::from("A.java");
        let first = cache.get_tree(&file, &store, &cancel).unwrap();
        let second = cache.get_tree(&file, &store, &cancel).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(parses.get(), 1);
        assert_eq!(store.outstanding(), 0);
    }

    #[test]
    fn test_owner_of_maps_nodes_back_to_files() {
        let (mut cache, _) = cache_with_counter();
        let store = store();
        let cancel = CancellationToken::new();
        let a = FileId::from("A.java");
        let b = FileId::from("B.java");
        let tree_a = cache.get_tree(&a, &store, &cancel).unwrap();
        let tree_b = cache.get_tree(&b, &store, &cancel).unwrap();
        let class_b = tree_b
            .descendants(tree_b.root())
            .find(|n| tree_b.kind(*n) == NodeKind::TypeDeclaration)
            .unwrap();
        assert_eq!(cache.owner_of(tree_a.node_ref(tree_a.root())).unwrap(), &a);
        assert_eq!(cache.owner_of(tree_b.node_ref(class_b)).unwrap(), &b);
    }

    #[test]
    fn test_unregistered_node_is_not_found() {
        let (cache, _) = cache_with_counter();
        let mut builder = TreeBuilder::new("class C {}");
        builder.root(NodeKind::CompilationUnit);
        let stray = builder.build();
        let err = cache.owner_of(stray.node_ref(stray.root())).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_clear_forces_reparse() {
        let (mut cache, parses) = cache_with_counter();
        let store = store();
        let cancel = CancellationToken::new();
        let file = FileId::from("A.java");
        let first = cache.get_tree(&file, &store, &cancel).unwrap();
        cache.clear();
        assert!(cache.owner_of(first.node_ref(first.root())).is_err());
        let second = cache.get_tree(&file, &store, &cancel).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(parses.get(), 2);
    }

    #[test]
    fn test_cancelled_request_caches_nothing() {
        let (mut cache, parses) = cache_with_counter();
        let store = store();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cache
            .get_tree(&FileId::from("A.java"), &store, &cancel)
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(cache.is_empty());
        assert_eq!(parses.get(), 0);
    }
}
