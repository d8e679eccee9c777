//! Error types for repository operations.

use std::path::PathBuf;

/// Errors surfaced by repository-level commands.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// An invalid combination of options.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("cannot use `fname` with multiple targets or `-R|--recursive`")]
    RecursiveAddingWhileUsingFilename,

    /// A glob pattern matched nothing.
    #[error("no files matching '{0}'")]
    NoTargetsFound(String),

    #[error("not a lode repository (or any parent up to the root): {0}")]
    NotARepo(PathBuf),

    #[error("'{0}' is already a lode repository")]
    AlreadyInitialized(PathBuf),

    #[error("'{0}' is outside of the repository")]
    OutsideRepo(PathBuf),

    /// A target names neither a manifest nor a tracked output.
    #[error("'{0}' is not tracked by any stage")]
    StageNotFound(String),

    /// Some outputs could not be checked out.
    #[error("checkout failed for following targets:\n{}", failed.join("\n"))]
    Checkout { failed: Vec<String> },

    /// Another process holds the repository lock.
    #[error("unable to acquire lock '{0}': another lode process is running")]
    Locked(PathBuf),

    #[error("invalid config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Graph(#[from] lode_graph::GraphError),

    #[error(transparent)]
    Stage(#[from] lode_stage::StageError),

    #[error(transparent)]
    Cache(#[from] lode_cache::CacheError),

    #[error(transparent)]
    Hash(#[from] lode_hash::HashError),

    #[error(transparent)]
    Remote(#[from] lode_remote::RemoteError),

    #[error(transparent)]
    Type(#[from] lode_types::TypeError),
}

impl RepoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for repository results.
pub type RepoResult<T> = Result<T, RepoError>;
