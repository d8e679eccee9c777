use std::path::PathBuf;

use lode_types::HashInfo;

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No entry exists for the requested hash.
    #[error("content {0} is missing from the cache")]
    Missing(HashInfo),

    /// An output was committed or checked out before it had a hash.
    #[error("no hash recorded for {0}")]
    Unset(PathBuf),

    /// Every configured link strategy failed for this path.
    #[error("could not link {path} from cache ({})", reasons.join("; "))]
    LinkFailed { path: PathBuf, reasons: Vec<String> },

    /// Content changed between hashing and committing.
    #[error("{path} changed while committing: expected {expected}, found {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("unknown link type: {0}")]
    UnknownLinkType(String),

    #[error("corrupt cache entry {hash}: {reason}")]
    Corrupt { hash: HashInfo, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start cache workers: {0}")]
    Pool(String),

    #[error(transparent)]
    Hash(#[from] lode_hash::HashError),

    #[error(transparent)]
    Type(#[from] lode_types::TypeError),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for the recoverable link failure.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Self::LinkFailed { .. })
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
