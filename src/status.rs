use crate::{error::EngineError, source::FileId, syntax::TextRange};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub severity: Severity,
    pub message: String,
    pub file: Option<FileId>,
    pub range: Option<TextRange>,
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.severity)?;
        if let Some(file) = &self.file {
            write!(f, "{file}")?;
            if let Some(range) = self.range {
                write!(f, "@{range}")?;
            }
            write!(f, ": ")?;
        }
        f.write_str(&self.message)
    }
}

/// Problems collected while a refactoring runs. An empty status is OK.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefactoringStatus {
    entries: Vec<StatusEntry>,
}

impl RefactoringStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        file: Option<&FileId>,
        range: Option<TextRange>,
    ) {
        self.entries.push(StatusEntry {
            severity,
            message: message.into(),
            file: file.cloned(),
            range,
        });
    }

    pub fn add_info(&mut self, message: impl Into<String>) {
        self.add(Severity::Info, message, None, None);
    }

    pub fn add_warning(&mut self, message: impl Into<String>, file: &FileId, range: TextRange) {
        self.add(Severity::Warning, message, Some(file), Some(range));
    }

    pub fn add_error(&mut self, message: impl Into<String>, file: &FileId, range: TextRange) {
        self.add(Severity::Error, message, Some(file), Some(range));
    }

    /// Records a failed operation at the severity its kind warrants.
    pub fn add_engine_error(&mut self, error: &EngineError) {
        let severity = match error {
            EngineError::MalformedTree { .. } | EngineError::UnresolvedBinding { .. } => {
                Severity::Warning
            }
            EngineError::ConflictingEdit { .. } | EngineError::UnsupportedBinaryReference { .. } => {
                Severity::Error
            }
            _ => Severity::Fatal,
        };
        let file = match error {
            EngineError::ParseFailure { file, .. }
            | EngineError::MalformedTree { file }
            | EngineError::ConflictingEdit { file, .. }
            | EngineError::UnresolvedBinding { file, .. }
            | EngineError::StaleSource { file }
            | EngineError::Io { file, .. } => Some(file),
            _ => None,
        };
        self.add(severity, error.to_string(), file, None);
    }

    pub fn merge(&mut self, other: RefactoringStatus) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// The worst severity recorded, if any.
    pub fn severity(&self) -> Option<Severity> {
        self.entries.iter().map(|entry| entry.severity).max()
    }

    pub fn is_ok(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_error(&self) -> bool {
        self.severity() >= Some(Severity::Error)
    }

    pub fn has_fatal_error(&self) -> bool {
        self.severity() == Some(Severity::Fatal)
    }
}

impl fmt::Display for RefactoringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}
