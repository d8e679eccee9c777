//! Stages for lode.
//!
//! A [`Stage`] owns a working directory, ordered [`Dependency`]s and
//! [`Output`]s, an optional command and a frozen flag. It knows how to
//! save (hash), commit (copy into the cache and link back) and check out
//! its outputs, and how to reproduce itself.
//!
//! Stages are persisted one per manifest file through [`manifest`].
//! Import stages, whose single dependency is a revision-pinned path in an
//! external repository, are refreshed by [`update_import`] and
//! [`sync_import`] through an [`ImportSource`].

pub mod context;
pub mod dependency;
pub mod error;
pub mod imports;
pub mod manifest;
pub mod output;
pub mod source;
pub mod stage;

#[cfg(test)]
mod testing;

pub use context::StageContext;
pub use dependency::{Dependency, RepoSource};
pub use error::{StageError, StageResult};
pub use imports::{sync_import, update_import, FrozenGuard};
pub use manifest::{is_manifest, MANIFEST_SUFFIX};
pub use output::Output;
pub use source::{GitImportSource, ImportSource};
pub use stage::Stage;
