use crate::{source::FileId, syntax::NodeRef};
use std::{io, ops::Range};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to parse {file}: {message}")]
    ParseFailure { file: FileId, message: String },

    #[error("{file} contains syntax errors")]
    MalformedTree { file: FileId },

    #[error("node {node:?} does not belong to any cached tree")]
    NotFound { node: NodeRef },

    #[error("cannot compute preview for {file}: edit at {first:?} overlaps edit at {second:?}")]
    ConflictingEdit {
        file: FileId,
        first: Range<usize>,
        second: Range<usize>,
    },

    #[error("no binding for `{text}` in {file}")]
    UnresolvedBinding { file: FileId, text: String },

    #[error("cancelled while {operation}")]
    CollaboratorCancelled { operation: &'static str },

    #[error("`{symbol}` is not supported for binary references")]
    UnsupportedBinaryReference { symbol: String },

    #[error("source of {file} changed since it was parsed")]
    StaleSource { file: FileId },

    #[error("failed to read {file}: {source}")]
    Io {
        file: FileId,
        #[source]
        source: io::Error,
    },

    #[error("failed to set up parser: {0}")]
    ParserSetup(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

impl EngineError {
    pub fn conflicting_edit(file: &FileId, first: Range<usize>, second: Range<usize>) -> Self {
        Self::ConflictingEdit {
            file: file.clone(),
            first,
            second,
        }
    }

    /// Errors that abort work on one file. Everything else degrades to a status entry.
    pub fn is_file_fatal(&self) -> bool {
        matches!(
            self,
            Self::ParseFailure { .. }
                | Self::ConflictingEdit { .. }
                | Self::StaleSource { .. }
                | Self::Io { .. }
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CollaboratorCancelled { .. })
    }
}
