//! Multi-file syntax-tree rewriting for Java sources.
//!
//! Refactorings ask a [`RefactoringSession`] for trees, record node edits and import changes per
//! file, and finally collect one [`FileChange`] per touched file.

pub mod binding;
pub mod change;
pub mod error;
pub mod import_ledger;
pub mod locator;
pub mod options;
pub mod relocation;
pub mod rewrite_session;
pub mod scip_index;
pub mod search;
pub mod session;
pub mod source;
pub mod status;
pub mod syntax;
pub mod text_edit;
pub mod tree_cache;

pub use binding::{Binding, BindingKind, BindingResolver, BindingTable, Origin};
pub use change::{ChangeSet, FileChange, LabeledRegion, TextReplacement};
pub use error::{EngineError, Result};
pub use import_ledger::{ImportLedger, ImportedSymbol};
pub use locator::{locate, locate_all, MatchRange};
pub use options::SessionOptions;
pub use relocation::{MemberRelocationRewriter, RelocationDescriptor, RewriteMode, RewriteOutcome};
pub use rewrite_session::{EditKind, GroupId, ListPosition, Replacement, RewriteSession};
pub use search::{SearchEngine, SearchMatch, SearchScope, WordSearch};
pub use session::RefactoringSession;
pub use source::{CancellationToken, FileId, FsTextStore, TextStore};
pub use status::{RefactoringStatus, Severity};
pub use tree_cache::TreeCache;
