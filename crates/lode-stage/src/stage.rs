//! The stage: unit of tracking and node of the dependency graph.

use std::path::{Path, PathBuf};
use std::process::Command;

use lode_cache::Changes;
use tracing::{debug, info};

use crate::context::StageContext;
use crate::dependency::Dependency;
use crate::error::{StageError, StageResult};
use crate::imports;
use crate::manifest;
use crate::output::Output;

/// A tracked unit: working directory, dependencies, outputs, an optional
/// command and a frozen flag.
///
/// A stage is identified by its manifest path. Frozen stages never
/// re-resolve their dependencies; imports are created frozen so that
/// their source is only consulted on an explicit update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    path: PathBuf,
    wdir: PathBuf,
    pub deps: Vec<Dependency>,
    pub outs: Vec<Output>,
    pub cmd: Option<String>,
    pub frozen: bool,
}

impl Stage {
    /// A stage whose manifest lives at `path`, run from `wdir`.
    pub fn new(path: impl Into<PathBuf>, wdir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wdir: wdir.into(),
            deps: Vec::new(),
            outs: Vec::new(),
            cmd: None,
            frozen: false,
        }
    }

    /// Manifest path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn wdir(&self) -> &Path {
        &self.wdir
    }

    /// Manifest path relative to `root`, for messages and commands.
    pub fn relpath(&self, root: &Path) -> String {
        let rel = self.path.strip_prefix(root).unwrap_or(&self.path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// A stage whose only dependency is an external import.
    pub fn is_import(&self) -> bool {
        self.cmd.is_none() && self.deps.len() == 1 && self.deps[0].is_import()
    }

    // ---------------------------------------------------------------
    // Save / commit
    // ---------------------------------------------------------------

    pub fn save(&mut self, ctx: &StageContext) -> StageResult<()> {
        self.save_deps(ctx)?;
        self.save_outs(ctx)
    }

    /// Record dependency state. Frozen imports that are already locked
    /// keep their lock.
    pub fn save_deps(&mut self, ctx: &StageContext) -> StageResult<()> {
        let frozen = self.frozen;
        for dep in &mut self.deps {
            let locked = dep.repo.as_ref().is_some_and(|r| r.rev_lock.is_some());
            if frozen && locked {
                continue;
            }
            dep.save(ctx)?;
        }
        Ok(())
    }

    pub fn save_outs(&mut self, ctx: &StageContext) -> StageResult<()> {
        for out in &mut self.outs {
            out.save(ctx)?;
        }
        Ok(())
    }

    /// Commit every cached output. All outputs are attempted; link
    /// failures are gathered into one [`StageError::CacheLink`].
    pub fn commit(&self, ctx: &StageContext) -> StageResult<()> {
        let mut reasons = Vec::new();
        for out in &self.outs {
            match out.commit(ctx) {
                Ok(()) => {}
                Err(e) if e.is_link_failure() => reasons.push(e.to_string()),
                Err(e) => return Err(e),
            }
        }
        if !reasons.is_empty() {
            return Err(StageError::CacheLink {
                stage: self.path.clone(),
                reasons,
            });
        }
        debug!(stage = %self.path.display(), "committed");
        Ok(())
    }

    /// Check out every cached output, gathering link failures like
    /// [`Stage::commit`].
    pub fn checkout(&self, ctx: &StageContext, relink: bool) -> StageResult<Changes> {
        let mut changes = Changes::default();
        let mut reasons = Vec::new();
        for out in &self.outs {
            match out.checkout(ctx, relink) {
                Ok(c) => changes.extend(c),
                Err(e) if e.is_link_failure() => reasons.push(e.to_string()),
                Err(e) => return Err(e),
            }
        }
        if !reasons.is_empty() {
            return Err(StageError::CacheLink {
                stage: self.path.clone(),
                reasons,
            });
        }
        Ok(changes)
    }

    // ---------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------

    pub fn changed_deps(&self, ctx: &StageContext) -> StageResult<bool> {
        if self.frozen {
            return Ok(false);
        }
        for dep in &self.deps {
            if dep.changed(ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn changed_outs(&self, ctx: &StageContext) -> bool {
        self.outs.iter().any(|o| o.changed(ctx))
    }

    pub fn changed(&self, ctx: &StageContext) -> StageResult<bool> {
        Ok(self.changed_deps(ctx)? || self.changed_outs(ctx))
    }

    /// Returns `true` if dependencies are unchanged and every output's
    /// recorded content is in the cache.
    pub fn already_cached(&self, ctx: &StageContext) -> StageResult<bool> {
        Ok(!self.changed_deps(ctx)? && self.outs.iter().all(|o| o.cache && o.in_cache(ctx)))
    }

    /// Returns `true` if an identical stage is already recorded at this
    /// manifest path and nothing it tracks has changed, so adding it again
    /// would be a no-op.
    pub fn can_be_skipped(&self, ctx: &StageContext) -> StageResult<bool> {
        if !self.path.is_file() {
            return Ok(false);
        }
        let Ok(existing) = manifest::load(&self.path) else {
            return Ok(false);
        };
        let same_shape = existing.wdir == self.wdir
            && existing.cmd == self.cmd
            && existing.deps.iter().map(|d| &d.path).eq(self.deps.iter().map(|d| &d.path))
            && existing.outs.iter().map(|o| &o.path).eq(self.outs.iter().map(|o| &o.path));
        if !same_shape || existing.changed(ctx)? {
            return Ok(false);
        }
        Ok(existing.outs.iter().all(|o| !o.cache || o.in_cache(ctx)))
    }

    // ---------------------------------------------------------------
    // Reproduce
    // ---------------------------------------------------------------

    /// Re-run the stage if anything it tracks changed. Returns `true` if
    /// it ran.
    pub fn reproduce(&mut self, ctx: &StageContext) -> StageResult<bool> {
        if !self.changed(ctx)? {
            debug!(stage = %self.path.display(), "stage is up to date");
            return Ok(false);
        }
        self.run(ctx)?;
        Ok(true)
    }

    fn run(&mut self, ctx: &StageContext) -> StageResult<()> {
        if self.is_import() {
            return imports::sync_import(self, ctx, false, false, None);
        }
        if let Some(cmd) = &self.cmd {
            info!(stage = %self.path.display(), %cmd, "running command");
            let status = Command::new("sh")
                .arg("-c")
                .arg(cmd)
                .current_dir(&self.wdir)
                .status()
                .map_err(|e| StageError::io(&self.wdir, e))?;
            if !status.success() {
                return Err(StageError::CommandFailed {
                    cmd: cmd.clone(),
                    code: status.code(),
                });
            }
        }
        self.save(ctx)?;
        self.commit(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_context;
    use lode_types::{HashName, PathInfo};
    use std::fs;

    fn data_stage(root: &Path, name: &str) -> Stage {
        let mut stage = Stage::new(root.join(format!("{name}.lode")), root);
        stage
            .outs
            .push(Output::new(PathInfo::local(root.join(name)), HashName::Md5));
        stage
    }

    #[test]
    fn relpath_uses_forward_slashes() {
        let stage = Stage::new("/repo/data/a.csv.lode", "/repo/data");
        assert_eq!(stage.relpath(Path::new("/repo")), "data/a.csv.lode");
    }

    #[test]
    fn kinds() {
        let dir = tempfile::tempdir().unwrap();
        let stage = data_stage(dir.path(), "f");
        assert!(stage.deps.is_empty());
        assert!(!stage.is_import());
    }

    #[test]
    fn save_commit_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = mock_context(dir.path());
        fs::write(dir.path().join("f"), "data").unwrap();

        let mut stage = data_stage(dir.path(), "f");
        assert!(!stage.can_be_skipped(&ctx).unwrap());
        stage.save(&ctx).unwrap();
        stage.commit(&ctx).unwrap();
        manifest::dump(&stage).unwrap();

        let fresh = data_stage(dir.path(), "f");
        assert!(fresh.can_be_skipped(&ctx).unwrap());

        fs::write(dir.path().join("f"), "changed").unwrap();
        assert!(!fresh.can_be_skipped(&ctx).unwrap());
    }

    #[test]
    fn commit_collects_link_failures_for_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = mock_context(dir.path());
        let cache = (*ctx.cache).clone().with_link_types(Vec::new());
        let ctx = StageContext {
            cache: std::sync::Arc::new(cache),
            ..ctx
        };
        fs::write(dir.path().join("a"), "1").unwrap();
        fs::write(dir.path().join("b"), "2").unwrap();
        let mut stage = Stage::new(dir.path().join("ab.lode"), dir.path());
        for name in ["a", "b"] {
            stage
                .outs
                .push(Output::new(PathInfo::local(dir.path().join(name)), HashName::Md5));
        }
        stage.save(&ctx).unwrap();

        let err = stage.commit(&ctx).unwrap_err();
        match &err {
            StageError::CacheLink { reasons, .. } => assert_eq!(reasons.len(), 2),
            other => panic!("unexpected: {other}"),
        }
        assert!(err.is_link_failure());
        // Content still reached the cache.
        assert!(stage.outs.iter().all(|o| o.in_cache(&ctx)));
    }

    #[test]
    fn reproduce_runs_command_when_outputs_change() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = mock_context(dir.path());
        let mut stage = data_stage(dir.path(), "gen.txt");
        stage.cmd = Some("echo generated > gen.txt".into());

        assert!(stage.reproduce(&ctx).unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("gen.txt")).unwrap().trim(),
            "generated"
        );
        assert!(stage.outs[0].in_cache(&ctx));
        assert!(!stage.reproduce(&ctx).unwrap());
    }

    #[test]
    fn failing_command_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = mock_context(dir.path());
        let mut stage = data_stage(dir.path(), "never");
        stage.cmd = Some("exit 3".into());
        let err = stage.reproduce(&ctx).unwrap_err();
        assert!(matches!(err, StageError::CommandFailed { code: Some(3), .. }));
    }

    #[test]
    fn frozen_stage_ignores_dependency_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = mock_context(dir.path());
        let input = dir.path().join("in");
        fs::write(&input, "1").unwrap();
        let mut stage = Stage::new(dir.path().join("s.lode"), dir.path());
        stage
            .deps
            .push(Dependency::local(PathInfo::local(&input), HashName::Md5));
        stage.save(&ctx).unwrap();
        fs::write(&input, "2").unwrap();

        assert!(stage.changed_deps(&ctx).unwrap());
        stage.frozen = true;
        assert!(!stage.changed_deps(&ctx).unwrap());
    }
}
