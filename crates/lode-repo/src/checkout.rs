//! `checkout` and `commit` for recorded stages.

use std::path::PathBuf;

use lode_cache::Changes;
use lode_stage::manifest;
use tracing::{debug, warn};

use crate::error::{RepoError, RepoResult};
use crate::repo::Repo;

#[derive(Clone, Copy, Debug, Default)]
pub struct CheckoutOptions {
    /// Re-link files even when their content already matches.
    pub relink: bool,
}

/// Workspace paths a checkout touched, relative to the repository root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckoutStats {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl CheckoutStats {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

impl Repo {
    /// Materialize the outputs of the stages named by `targets` (all stages
    /// when empty) from the cache.
    ///
    /// Every output is attempted. Outputs that were never saved, whose
    /// content is missing from the cache or that cannot be linked are
    /// reported together in [`RepoError::Checkout`] at the end.
    pub fn checkout(&mut self, targets: &[PathBuf], opts: CheckoutOptions) -> RepoResult<CheckoutStats> {
        let _lock = self.lock()?;
        let stages = self.collect(targets)?;

        let mut changes = Changes::default();
        let mut failed = Vec::new();
        for stage in &stages {
            for out in stage.outs.iter().filter(|o| o.cache) {
                let rel = manifest::relative_path(&out.path.as_path(), &self.root);
                if !out.in_cache(&self.ctx) {
                    debug!(out = %rel, hash = %out.hash, "not in cache");
                    failed.push(rel);
                    continue;
                }
                match out.checkout(&self.ctx, opts.relink) {
                    Ok(c) => changes.extend(c),
                    Err(e) if e.is_link_failure() => {
                        warn!("{e}");
                        failed.push(rel);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if !failed.is_empty() {
            return Err(RepoError::Checkout { failed });
        }
        let rel = |paths: Vec<PathBuf>| -> Vec<String> {
            paths
                .iter()
                .map(|p| manifest::relative_path(p, &self.root))
                .collect()
        };
        Ok(CheckoutStats {
            added: rel(changes.added),
            modified: rel(changes.modified),
            deleted: rel(changes.deleted),
        })
    }

    /// Record the current workspace content of the stages named by
    /// `targets` and commit it to the cache.
    pub fn commit(&mut self, targets: &[PathBuf]) -> RepoResult<Vec<lode_stage::Stage>> {
        let _lock = self.lock()?;
        let mut stages = self.collect(targets)?;
        for stage in &mut stages {
            stage.save(&self.ctx)?;
            match stage.commit(&self.ctx) {
                Ok(()) => {}
                Err(e) if e.is_link_failure() => warn!("{e}"),
                Err(e) => return Err(e.into()),
            }
            manifest::dump(stage)?;
            debug!(stage = %stage.path().display(), "committed");
        }
        self.graph.invalidate();
        Ok(stages)
    }
}
