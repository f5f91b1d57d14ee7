//! The state of one refactoring run.
//!
//! A [`RefactoringSession`] owns the tree cache and, per file, the rewrite session and import
//! ledger that refactorings record into. Both per-file objects are created on first use.
//! [`RefactoringSession::create_changes`] turns everything recorded into one change per file.

use crate::{
    change::{emit_change, ChangeSet, FileChange},
    error::Result,
    import_ledger::ImportLedger,
    options::SessionOptions,
    rewrite_session::RewriteSession,
    source::{CancellationToken, FileId, TextStore},
    syntax::{JavaParser, NodeRef, SourceParser, SyntaxTree},
    tree_cache::TreeCache,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, warn};

#[derive(Default)]
struct FileState {
    session: Option<RewriteSession>,
    ledger: Option<ImportLedger>,
}

pub struct RefactoringSession<S> {
    cache: TreeCache,
    files: BTreeMap<FileId, FileState>,
    store: S,
    cancel: CancellationToken,
    options: SessionOptions,
}

impl<S: TextStore> RefactoringSession<S> {
    pub fn new(parser: Box<dyn SourceParser>, store: S, options: SessionOptions) -> Self {
        RefactoringSession {
            cache: TreeCache::new(parser),
            files: BTreeMap::new(),
            store,
            cancel: CancellationToken::new(),
            options,
        }
    }

    /// A session over Java sources.
    pub fn java(store: S, options: SessionOptions) -> Result<Self> {
        Ok(Self::new(Box::new(JavaParser::new()?), store, options))
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Token observed by every collaborator call made on behalf of this session.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn tree(&mut self, file: &FileId) -> Result<Arc<SyntaxTree>> {
        self.cache.get_tree(file, &self.store, &self.cancel)
    }

    pub fn owner_of(&self, node: NodeRef) -> Result<&FileId> {
        self.cache.owner_of(node)
    }

    pub fn rewrite_session(&mut self, file: &FileId) -> Result<&mut RewriteSession> {
        Ok(self.file_edits(file)?.0)
    }

    pub fn import_ledger(&mut self, file: &FileId) -> Result<&mut ImportLedger> {
        Ok(self.file_edits(file)?.1)
    }

    /// The rewrite session and import ledger of `file`, borrowed together.
    pub fn file_edits(
        &mut self,
        file: &FileId,
    ) -> Result<(&mut RewriteSession, &mut ImportLedger)> {
        let tree = self.tree(file)?;
        let options = &self.options;
        let FileState { session, ledger } = self.files.entry(file.clone()).or_default();
        let session = session.get_or_insert_with(|| {
            debug!(%file, "starting rewrite session");
            RewriteSession::new(file.clone(), tree.clone(), options)
        });
        let ledger = ledger.get_or_insert_with(|| ImportLedger::new(tree));
        Ok((session, ledger))
    }

    /// Files that have a rewrite session or import ledger.
    pub fn touched_files(&self) -> impl Iterator<Item = &FileId> {
        self.files.keys()
    }

    pub fn create_change(&self, file: &FileId) -> Result<Option<FileChange>> {
        let Some(state) = self.files.get(file) else {
            return Ok(None);
        };
        let tree = match (&state.session, &state.ledger) {
            (Some(session), _) => session.tree(),
            (None, Some(ledger)) => ledger.tree(),
            (None, None) => return Ok(None),
        };
        emit_change(
            file,
            tree,
            state.session.as_ref(),
            state.ledger.as_ref(),
            &self.store,
            &self.cancel,
            &self.options,
        )
    }

    /// Emits every touched file. Failures are collected per file; only cancellation aborts the
    /// whole run.
    pub fn create_changes(&self) -> Result<ChangeSet> {
        let mut change_set = ChangeSet::default();
        for file in self.files.keys() {
            match self.create_change(file) {
                Ok(Some(change)) => change_set.changes.push(change),
                Ok(None) => {}
                Err(error) if error.is_cancellation() => return Err(error),
                Err(error) => {
                    warn!(%file, %error, "failed to create change");
                    change_set.failures.push((file.clone(), error));
                }
            }
        }
        Ok(change_set)
    }

    /// Drops every recorded edit and import. Cached trees stay.
    pub fn clear_edits(&mut self) {
        debug!(files = self.files.len(), "clearing pending edits");
        self.files.clear();
    }

    /// Drops everything, cached trees included.
    pub fn clear(&mut self) {
        self.clear_edits();
        self.cache.clear();
    }
}
