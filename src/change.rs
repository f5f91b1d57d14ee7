//! Turns a file's pending edits and import bookkeeping into one textual change.

use crate::{
    error::{EngineError, Result},
    import_ledger::ImportLedger,
    options::SessionOptions,
    rewrite_session::{GroupId, RewriteSession, IMPORT_GROUP, IMPORT_GROUP_NAME},
    source::{acquire_text, CancellationToken, FileId, TextStore},
    status::RefactoringStatus,
    syntax::{SyntaxTree, TextRange},
    text_edit::{sort_and_check, TextEdit},
};
use similar::TextDiff;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReplacement {
    pub offset: usize,
    pub length: usize,
    pub text: String,
}

impl TextReplacement {
    pub fn range(&self) -> TextRange {
        TextRange::at(self.offset, self.length)
    }
}

/// Ranges of the original text attributed to one edit group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledRegion {
    pub label: String,
    pub ranges: Vec<TextRange>,
}

#[derive(Debug, Clone)]
pub struct FileChange {
    file: FileId,
    original: Arc<str>,
    replacements: Vec<TextReplacement>,
    regions: Vec<LabeledRegion>,
}

impl FileChange {
    /// Builds a change from edits already sorted and checked by [`sort_and_check`].
    pub(crate) fn new(
        file: FileId,
        original: Arc<str>,
        edits: Vec<TextEdit>,
        label: impl Fn(GroupId) -> Option<String>,
    ) -> Self {
        let mut regions: Vec<LabeledRegion> = Vec::new();
        let mut replacements = Vec::with_capacity(edits.len());
        for edit in edits {
            if let Some(label) = edit.group.and_then(&label) {
                let range = edit.range;
                match regions.iter_mut().find(|region| region.label == label) {
                    Some(region) => match region.ranges.last_mut() {
                        Some(last) if last.end == range.start => last.end = range.end,
                        _ => region.ranges.push(range),
                    },
                    None => regions.push(LabeledRegion {
                        label,
                        ranges: vec![range],
                    }),
                }
            }
            replacements.push(TextReplacement {
                offset: edit.range.start,
                length: edit.range.len(),
                text: edit.replacement,
            });
        }
        FileChange {
            file,
            original,
            replacements,
            regions,
        }
    }

    pub fn file(&self) -> &FileId {
        &self.file
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Ordered, non-overlapping replacements against the original text.
    pub fn replacements(&self) -> &[TextReplacement] {
        &self.replacements
    }

    pub fn regions(&self) -> &[LabeledRegion] {
        &self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn apply(&self, text: &str) -> String {
        let mut new_text = text.to_string();
        for replacement in self.replacements.iter().rev() {
            new_text.replace_range(replacement.range().as_range(), &replacement.text);
        }
        new_text
    }

    pub fn new_text(&self) -> String {
        self.apply(&self.original)
    }

    pub fn unified_diff(&self) -> String {
        let new_text = self.new_text();
        let old_header = format!("a/{}", self.file);
        let new_header = format!("b/{}", self.file);
        let diff = TextDiff::from_lines(self.original.as_ref(), new_text.as_str());
        let mut unified = diff.unified_diff();
        unified.context_radius(3).header(&old_header, &new_header);
        unified.to_string()
    }
}

/// Emits the change for one file, or `None` when neither the rewrite session nor the import
/// ledger has anything recorded.
pub fn emit_change(
    file: &FileId,
    tree: &SyntaxTree,
    session: Option<&RewriteSession>,
    ledger: Option<&ImportLedger>,
    store: &dyn TextStore,
    cancel: &CancellationToken,
    options: &SessionOptions,
) -> Result<Option<FileChange>> {
    let session = session.filter(|session| session.has_pending_edits());
    let ledger = ledger.filter(|ledger| !ledger.is_empty());
    if session.is_none() && ledger.is_none() {
        debug!(%file, "nothing to emit");
        return Ok(None);
    }

    let original = acquire_text(store, file, cancel)?;
    if original.text() != tree.source() {
        return Err(EngineError::StaleSource { file: file.clone() });
    }

    let mut edits = match session {
        Some(session) => session.flatten()?,
        None => Vec::new(),
    };
    if let Some(ledger) = ledger {
        edits.extend(ledger.import_edits(options, Some(IMPORT_GROUP)));
    }
    sort_and_check(file, &mut edits)?;

    let change = FileChange::new(file.clone(), original.shared(), edits, |group| {
        if group == IMPORT_GROUP {
            return Some(IMPORT_GROUP_NAME.to_string());
        }
        session
            .and_then(|session| session.group_name(group))
            .map(String::from)
    });
    info!(%file, replacements = change.replacements.len(), "created change");
    Ok(Some(change))
}

/// The outcome of emitting every touched file. Files that failed do not hold back the others.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub changes: Vec<FileChange>,
    pub failures: Vec<(FileId, EngineError)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.failures.is_empty()
    }

    pub fn change(&self, file: &FileId) -> Option<&FileChange> {
        self.changes.iter().find(|change| change.file() == file)
    }

    pub fn status(&self) -> RefactoringStatus {
        let mut status = RefactoringStatus::new();
        for (_, error) in &self.failures {
            status.add_engine_error(error);
        }
        status
    }
}
