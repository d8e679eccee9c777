//! Content-addressable cache for tracked data.
//!
//! Content is stored under its checksum in a two-level layout,
//! `<cache>/<hash[0..2]>/<hash[2..]>`. Directories are stored as a
//! manifest object (the `.dir` address) plus one entry per file.
//!
//! # Design Rules
//!
//! 1. Entries are immutable and read-only once written.
//! 2. Write-then-rename: content is copied into `<cache>/tmp`, verified
//!    against its expected hash, then renamed into place.
//! 3. Committing content that is already present is a no-op.
//! 4. Materializing into the workspace never destroys the previous file
//!    unless a replacement was fully linked first.

pub mod error;
pub mod link;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use link::{materialize, LinkType, DEFAULT_LINK_TYPES};
pub use store::{CacheStore, Changes};
