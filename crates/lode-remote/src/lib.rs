//! Remote storage for lode.
//!
//! Every transport implements [`RemoteBackend`] (`store`, `fetch`,
//! `exists`). Backends are chosen by URL scheme through a
//! [`RemoteRegistry`] that is resolved once when a repository is opened.
//! The built-in [`LocalRemote`] serves `local` and `file` locations using
//! the same content-addressed layout as the cache.
//!
//! Password prompts for remote hosts go through a [`CredentialCache`],
//! which asks at most once per (host, user, port) for the life of the
//! process and serializes concurrent callers.

pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod local;
pub mod registry;

pub use backend::RemoteBackend;
pub use config::RemoteConfig;
pub use credentials::{CredentialCache, CredentialKey, NoPrompter, Prompter};
pub use error::{RemoteError, RemoteResult};
pub use local::LocalRemote;
pub use registry::{BackendContext, BackendFactory, RemoteRegistry};
