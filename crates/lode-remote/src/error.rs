use lode_types::HashInfo;

/// Errors from remote operations.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("no remote backend registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error("content {0} does not exist on the remote")]
    NotFound(HashInfo),

    #[error("remote '{name}' is not configured")]
    NotConfigured { name: String },

    #[error("invalid remote configuration: {0}")]
    Config(String),

    #[error("credential error: {0}")]
    Credentials(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cache error: {0}")]
    Cache(#[from] lode_cache::CacheError),

    #[error("hash error: {0}")]
    Hash(#[from] lode_hash::HashError),

    #[error(transparent)]
    Type(#[from] lode_types::TypeError),
}

/// Result alias for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;
