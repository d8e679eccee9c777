use std::path::PathBuf;

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The path to hash does not exist.
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },

    #[error("invalid ignore rules: {0}")]
    Ignore(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("failed to start hashing workers: {0}")]
    Pool(String),

    #[error(transparent)]
    Type(#[from] lode_types::TypeError),
}

impl HashError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path.into());
        }
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for hashing operations.
pub type HashResult<T> = Result<T, HashError>;
