use crate::{
    error::{EngineError, Result},
    rewrite_session::GroupId,
    source::FileId,
    syntax::TextRange,
};

/// A flattened edit against a file's original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: TextRange,
    pub replacement: String,
    pub group: Option<GroupId>,
}

impl TextEdit {
    pub fn new(range: TextRange, replacement: impl Into<String>, group: Option<GroupId>) -> Self {
        TextEdit {
            range,
            replacement: replacement.into(),
            group,
        }
    }

    pub fn insertion(offset: usize, text: impl Into<String>, group: Option<GroupId>) -> Self {
        Self::new(TextRange::empty(offset), text, group)
    }

    pub fn deletion(range: TextRange, group: Option<GroupId>) -> Self {
        Self::new(range, "", group)
    }
}

/// Sorts edits by position and fails on the first pair whose ranges overlap. The sort is stable,
/// so insertions at the same offset keep the order they were recorded in.
pub fn sort_and_check(file: &FileId, edits: &mut [TextEdit]) -> Result<()> {
    edits.sort_by_key(|edit| (edit.range.start, edit.range.end));
    let mut widest: Option<TextRange> = None;
    for edit in edits.iter() {
        if let Some(previous) = widest {
            if previous.overlaps(edit.range) {
                return Err(EngineError::conflicting_edit(
                    file,
                    previous.as_range(),
                    edit.range.as_range(),
                ));
            }
        }
        if widest.map_or(true, |previous| edit.range.end > previous.end) {
            widest = Some(edit.range);
        }
    }
    Ok(())
}

/// Applies edits that were sorted and checked by [`sort_and_check`], shifted by `base`.
pub fn apply_sorted(text: &str, edits: &[TextEdit], base: usize) -> String {
    let mut new_text = text.to_string();
    // Applying back to front keeps earlier offsets valid, and puts same-offset insertions in
    // recorded order.
    for edit in edits.iter().rev() {
        let range = (edit.range.start - base)..(edit.range.end - base);
        new_text.replace_range(range, &edit.replacement);
    }
    new_text
}
