//! Content hashing for lode.
//!
//! Computes the checksum that identifies content in the cache: a streamed
//! digest for files and, for directories, the digest of a sorted
//! [`DirManifest`] listing every file's digest. Per-file hashing of a
//! directory runs on a bounded rayon pool; sorting the manifest keeps the
//! aggregate independent of completion order.
//!
//! All digests wrap established libraries (`md-5`, `blake3`).

pub mod engine;
pub mod error;
pub mod filter;
pub mod manifest;

pub use engine::{ContentDigest, HashEngine};
pub use error::{HashError, HashResult};
pub use filter::{IgnoreFilter, IGNORE_FILE};
pub use manifest::{DirEntry, DirManifest};
