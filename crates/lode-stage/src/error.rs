//! Error types for the stage crate.

use std::path::PathBuf;

/// Errors that can occur while saving, committing or loading stages.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A declared output is missing from the workspace.
    #[error("output '{0}' does not exist")]
    OutputDoesNotExist(PathBuf),

    /// A declared dependency is missing.
    #[error("dependency '{0}' does not exist")]
    DependencyDoesNotExist(String),

    /// Content was committed but could not be linked into the workspace.
    #[error("failed to link outputs of '{stage}' from cache: {}", reasons.join("; "))]
    CacheLink { stage: PathBuf, reasons: Vec<String> },

    /// An import stage must have exactly one dependency and one output.
    #[error("'{stage}' is not an import stage: {deps} dependencies, {outs} outputs")]
    InvalidImport {
        stage: PathBuf,
        deps: usize,
        outs: usize,
    },

    #[error("command '{cmd}' failed with exit code {code:?}")]
    CommandFailed { cmd: String, code: Option<i32> },

    /// The stage manifest could not be parsed.
    #[error("invalid manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// The external import source failed.
    #[error("import source error: {0}")]
    Source(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cache(#[from] lode_cache::CacheError),

    #[error(transparent)]
    Hash(#[from] lode_hash::HashError),

    #[error(transparent)]
    Type(#[from] lode_types::TypeError),
}

impl StageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for link failures, which callers collect rather than
    /// abort on.
    pub fn is_link_failure(&self) -> bool {
        match self {
            Self::CacheLink { .. } => true,
            Self::Cache(e) => e.is_link_failure(),
            _ => false,
        }
    }
}

/// Convenience alias for stage results.
pub type StageResult<T> = Result<T, StageError>;
