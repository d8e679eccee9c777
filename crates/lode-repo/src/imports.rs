//! Repository entry points for import stages.

use std::path::{Path, PathBuf};

use lode_graph::GraphValidator;
use lode_stage::{manifest, sync_import, update_import, Dependency, Output, Stage, StageResult};
use tracing::{info, warn};

use crate::error::{RepoError, RepoResult};
use crate::paths;
use crate::repo::Repo;

impl Repo {
    /// Track `path` from the repository at `url` as a frozen import stage,
    /// download it into the cache and check it out at `out` (by default the
    /// file name of `path` in the repository root).
    pub fn import(
        &mut self,
        url: &str,
        path: &str,
        out: Option<&Path>,
        rev: Option<&str>,
    ) -> RepoResult<Stage> {
        let _lock = self.lock()?;
        let out = match out {
            Some(out) => out.to_path_buf(),
            None => Path::new(path)
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| RepoError::InvalidArgument(format!("cannot import '{path}'")))?,
        };
        let resolved = paths::resolve(&self.root, &out, None)?;
        let hash_name = self.config.core.hash;
        let mut stage = Stage::new(resolved.manifest, resolved.wdir);
        stage.frozen = true;
        stage
            .deps
            .push(Dependency::import(url, path, rev.map(str::to_string), hash_name));
        stage.outs.push(Output::new(resolved.out, hash_name));

        let existing = self.graph.refresh()?;
        GraphValidator::new(&self.root).check(existing, std::slice::from_ref(&stage))?;

        sync_import(&mut stage, &self.ctx, false, false, None)?;
        tolerate_link_failure(stage.outs[0].checkout(&self.ctx, false).map(drop))?;
        manifest::dump(&stage)?;
        self.graph.invalidate();
        info!(stage = %stage.relpath(&self.root), "imported");
        Ok(stage)
    }

    /// Move the import stages named by `targets` (all imports when empty)
    /// to `rev`, or to whatever their current revision now resolves to,
    /// and check out the new content.
    pub fn update(&mut self, targets: &[PathBuf], rev: Option<&str>) -> RepoResult<Vec<Stage>> {
        let _lock = self.lock()?;
        let mut stages = self.import_stages(targets)?;
        for stage in &mut stages {
            update_import(stage, &self.ctx, rev)?;
            tolerate_link_failure(stage.outs[0].checkout(&self.ctx, false).map(drop))?;
            manifest::dump(stage)?;
        }
        self.graph.invalidate();
        Ok(stages)
    }

    /// Bring the content of import stages into the cache. See
    /// [`sync_import`] for `dry` and `force`.
    pub fn sync(
        &mut self,
        targets: &[PathBuf],
        dry: bool,
        force: bool,
        jobs: Option<usize>,
    ) -> RepoResult<Vec<Stage>> {
        // A dry run writes nothing, so it neither needs nor creates the lock.
        let _lock = if dry { None } else { Some(self.lock()?) };
        let mut stages = self.import_stages(targets)?;
        for stage in &mut stages {
            sync_import(stage, &self.ctx, dry, force, jobs)?;
            if !dry {
                manifest::dump(stage)?;
            }
        }
        self.graph.invalidate();
        Ok(stages)
    }

    fn import_stages(&mut self, targets: &[PathBuf]) -> RepoResult<Vec<Stage>> {
        let stages = self.collect(targets)?;
        if targets.is_empty() {
            return Ok(stages.into_iter().filter(Stage::is_import).collect());
        }
        if let Some(stage) = stages.iter().find(|s| !s.is_import()) {
            return Err(RepoError::InvalidArgument(format!(
                "'{}' is not an import stage",
                stage.relpath(&self.root)
            )));
        }
        Ok(stages)
    }
}

fn tolerate_link_failure(result: StageResult<()>) -> RepoResult<()> {
    match result {
        Err(e) if e.is_link_failure() => {
            warn!("{e}");
            Ok(())
        }
        other => Ok(other?),
    }
}
