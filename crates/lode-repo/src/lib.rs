//! Repository operations for lode.
//!
//! A [`Repo`] ties the pieces together: configuration from
//! `.lode/config.toml`, the hash engine, the cache, the live stage graph,
//! the remote registry and the repository lock. Its methods are the
//! user-facing commands:
//!
//! - [`Repo::add`] — track workspace paths (see [`add`])
//! - [`Repo::checkout`] — materialize outputs from the cache
//! - [`Repo::commit`] — re-record and cache changed outputs
//! - [`Repo::import`], [`Repo::update`], [`Repo::sync`] — import stages
//!
//! Every command that mutates the graph holds the exclusive
//! [`RepoLock`] for its whole duration.

pub mod add;
pub mod checkout;
pub mod config;
pub mod error;
pub mod imports;
pub mod lock;
pub mod paths;
pub mod progress;
pub mod repo;
pub mod scm;
pub mod walk;

#[cfg(test)]
mod testing;

pub use add::{AddOptions, AddResult};
pub use checkout::{CheckoutOptions, CheckoutStats};
pub use config::{CacheConfig, CoreConfig, RepoConfig};
pub use error::{RepoError, RepoResult};
pub use lock::RepoLock;
pub use progress::{LogProgress, NoProgress, Progress};
pub use repo::{Repo, LODE_DIR};
pub use scm::{GitScm, NoScm, Scm};
pub use walk::walk_untracked;
