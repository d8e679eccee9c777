use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown hash algorithm: {0}")]
    UnknownHash(String),

    #[error("invalid digest '{value}' for {name}")]
    InvalidDigest { name: String, value: String },

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
