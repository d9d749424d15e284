//! Error type shared by every stage of the mapping run.
//!
//! Only structural problems are errors: unreadable files, trees that do not
//! parse, summaries missing required fields. An annotation that cannot be
//! placed on the target tree is an expected outcome and never surfaces here.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed tree in {path:?}: {reason}")]
    MalformedTree { path: PathBuf, reason: String },

    #[error("malformed summary in {path:?}: {reason}")]
    MalformedSummary { path: PathBuf, reason: String },

    #[error("failed to export {path:?}: {reason}")]
    Export { path: PathBuf, reason: String },
}

impl MapperError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MapperError::Io { path: path.into(), source }
    }

    pub(crate) fn malformed_tree(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MapperError::MalformedTree { path: path.into(), reason: reason.into() }
    }

    /// Process exit status used by the CLI for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            MapperError::MalformedTree { .. } | MapperError::MalformedSummary { .. } => 2,
            MapperError::Io { .. } => 3,
            MapperError::Export { .. } => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;
