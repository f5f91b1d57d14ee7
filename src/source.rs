use crate::error::{EngineError, Result};
use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::debug;

/// Identity of a source file: its path relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub Arc<Path>);

impl FileId {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for FileId {
    fn from(path: PathBuf) -> FileId {
        FileId(path.into())
    }
}

impl From<&Path> for FileId {
    fn from(path: &Path) -> FileId {
        FileId(path.into())
    }
}

impl From<&str> for FileId {
    fn from(path: &str) -> FileId {
        FileId(Path::new(path).into())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Shared flag checked by every collaborator call. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::CollaboratorCancelled { operation })
        } else {
            Ok(())
        }
    }
}

pub trait TextStore {
    fn acquire(&self, file: &FileId, cancel: &CancellationToken) -> Result<Arc<str>>;
    fn release(&self, file: &FileId);
}

/// Text held from a [`TextStore`]; released when dropped.
pub struct AcquiredText<'a> {
    store: &'a dyn TextStore,
    file: FileId,
    text: Arc<str>,
}

impl AcquiredText<'_> {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn shared(&self) -> Arc<str> {
        self.text.clone()
    }
}

impl Drop for AcquiredText<'_> {
    fn drop(&mut self) {
        self.store.release(&self.file);
    }
}

pub fn acquire_text<'a>(
    store: &'a dyn TextStore,
    file: &FileId,
    cancel: &CancellationToken,
) -> Result<AcquiredText<'a>> {
    let text = store.acquire(file, cancel)?;
    Ok(AcquiredText {
        store,
        file: file.clone(),
        text,
    })
}

/// Reads files under a root folder. Working copies registered with
/// [`FsTextStore::set_working_copy`] shadow the file on disk.
pub struct FsTextStore {
    root_folder: PathBuf,
    working_copies: HashMap<FileId, Arc<str>>,
    outstanding: AtomicUsize,
}

impl FsTextStore {
    pub fn new(root_folder: PathBuf) -> Self {
        FsTextStore {
            root_folder,
            working_copies: HashMap::new(),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// A store with no backing folder, serving only working copies.
    pub fn in_memory() -> Self {
        Self::new(PathBuf::new())
    }

    pub fn with_working_copy(mut self, file: impl Into<FileId>, text: impl Into<Arc<str>>) -> Self {
        self.set_working_copy(file.into(), text);
        self
    }

    pub fn set_working_copy(&mut self, file: FileId, text: impl Into<Arc<str>>) {
        self.working_copies.insert(file, text.into());
    }

    pub fn full_path(&self, file: &FileId) -> PathBuf {
        self.root_folder.join(file.path())
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl TextStore for FsTextStore {
    fn acquire(&self, file: &FileId, cancel: &CancellationToken) -> Result<Arc<str>> {
        cancel.check("reading source text")?;
        let text = match self.working_copies.get(file) {
            Some(text) => text.clone(),
            None => {
                let full_path = self.full_path(file);
                debug!(path = %full_path.display(), "reading source file");
                fs::read_to_string(&full_path)
                    .map_err(|source| EngineError::Io {
                        file: file.clone(),
                        source,
                    })?
                    .into()
            }
        };
        cancel.check("reading source text")?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(text)
    }

    fn release(&self, _file: &FileId) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_copy_shadows_disk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.java"), "class A {}").unwrap();
        let store = FsTextStore::new(dir.path().to_path_buf())
            .with_working_copy("A.java", "class A { int x; }");
        let cancel = CancellationToken::new();
        let text = acquire_text(&store, &FileId::from("A.java"), &cancel).unwrap();
        assert_eq!(text.text(), "class A { int x; }");
    }

    #[test]
    fn test_reads_from_disk_and_releases_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("B.java"), "class B {}").unwrap();
        let store = FsTextStore::new(dir.path().to_path_buf());
        let cancel = CancellationToken::new();
        {
            let text = acquire_text(&store, &FileId::from("B.java"), &cancel).unwrap();
            assert_eq!(text.text(), "class B {}");
            assert_eq!(store.outstanding(), 1);
        }
        assert_eq!(store.outstanding(), 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTextStore::new(dir.path().to_path_buf());
        let err = store
            .acquire(&FileId::from("Missing.java"), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
        assert_eq!(store.outstanding(), 0);
    }

    #[test]
    fn test_cancelled_acquire_leaves_nothing_outstanding() {
        let store = FsTextStore::in_memory().with_working_copy("A.java", "class A {}");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store.acquire(&FileId::from("A.java"), &cancel).unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(store.outstanding(), 0);
    }
}
