//! Foundation types for lode.
//!
//! This crate provides the value types every other lode crate agrees on:
//! where a piece of data lives and which content it is.
//!
//! # Key Types
//!
//! - [`PathInfo`] — A location: scheme, optional host/user/port, and a path
//! - [`Scheme`] — Local filesystem or a named remote scheme (`ssh`, `s3`, ...)
//! - [`HashInfo`] — An (algorithm, digest) pair identifying content
//! - [`HashName`] — The supported content digest algorithms

pub mod error;
pub mod hash_info;
pub mod path_info;

pub use error::TypeError;
pub use hash_info::{HashInfo, HashName, DIR_SUFFIX};
pub use path_info::{normalize, PathInfo, Scheme};
