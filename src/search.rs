use crate::{
    error::Result,
    locator::MatchRange,
    source::{acquire_text, CancellationToken, FileId, TextStore},
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SearchMatch {
    pub file: FileId,
    pub range: MatchRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// Everything the engine knows about.
    Workspace,
    Files(Vec<FileId>),
}

impl SearchScope {
    pub fn contains(&self, file: &FileId) -> bool {
        match self {
            SearchScope::Workspace => true,
            SearchScope::Files(files) => files.contains(file),
        }
    }
}

/// Finds textual occurrences of a pattern. What a pattern means is up to the engine.
pub trait SearchEngine {
    fn search(
        &self,
        pattern: &str,
        scope: &SearchScope,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchMatch>>;
}

/// Whole-word search over the files of a [`SearchScope::Files`] scope.
pub struct WordSearch<'a> {
    store: &'a dyn TextStore,
    files: Vec<FileId>,
}

impl<'a> WordSearch<'a> {
    /// `files` is what [`SearchScope::Workspace`] expands to.
    pub fn new(store: &'a dyn TextStore, files: Vec<FileId>) -> Self {
        WordSearch { store, files }
    }
}

impl SearchEngine for WordSearch<'_> {
    fn search(
        &self,
        pattern: &str,
        scope: &SearchScope,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchMatch>> {
        let mut matches = Vec::new();
        if pattern.is_empty() {
            return Ok(matches);
        }
        for file in self.files.iter().filter(|file| scope.contains(file)) {
            cancel.check("searching")?;
            let text = acquire_text(self.store, file, cancel)?;
            let text = text.text();
            for (offset, _) in text.match_indices(pattern) {
                let end = offset + pattern.len();
                let before = text[..offset].chars().next_back();
                let after = text[end..].chars().next();
                if !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char) {
                    matches.push(SearchMatch {
                        file: file.clone(),
                        range: MatchRange::new(offset, pattern.len()),
                    });
                }
            }
        }
        Ok(matches)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FsTextStore;

    #[test]
    fn test_whole_words_only() {
        let store = FsTextStore::in_memory()
            .with_working_copy("A.java", "int COUNT = COUNTER + COUNT;")
            .with_working_copy("B.java", "int x = COUNT;");
        let files = vec![FileId::from("A.java"), FileId::from("B.java")];
        let search = WordSearch::new(&store, files);
        let cancel = CancellationToken::new();

        let matches = search
            .search("COUNT", &SearchScope::Workspace, &cancel)
            .unwrap();
        let found: Vec<_> = matches
            .iter()
            .map(|m| (m.file.to_string(), m.range.offset))
            .collect();
        assert_eq!(
            found,
            vec![
                ("A.java".to_string(), 4),
                ("A.java".to_string(), 22),
                ("B.java".to_string(), 8),
            ]
        );

        let scoped = search
            .search(
                "COUNT",
                &SearchScope::Files(vec![FileId::from("B.java")]),
                &cancel,
            )
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(store.outstanding(), 0);
    }

    #[test]
    fn test_cancelled_search_fails() {
        let store = FsTextStore::in_memory().with_working_copy("A.java", "COUNT");
        let search = WordSearch::new(&store, vec![FileId::from("A.java")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = search
            .search("COUNT", &SearchScope::Workspace, &cancel)
            .unwrap_err();
        assert!(error.is_cancellation());
    }
}
