//! Import stages: re-pinning and synchronizing external data.

use std::ops::{Deref, DerefMut};

use tracing::{info, warn};

use crate::context::StageContext;
use crate::error::{StageError, StageResult};
use crate::stage::Stage;

/// Temporarily overrides a stage's frozen flag and restores the original
/// value when dropped, whichever way the scope is left.
pub struct FrozenGuard<'a> {
    stage: &'a mut Stage,
    restore: bool,
}

impl<'a> FrozenGuard<'a> {
    pub fn new(stage: &'a mut Stage, frozen: bool) -> Self {
        let previous = std::mem::replace(&mut stage.frozen, frozen);
        Self {
            stage,
            restore: previous,
        }
    }
}

impl Deref for FrozenGuard<'_> {
    type Target = Stage;

    fn deref(&self) -> &Stage {
        self.stage
    }
}

impl DerefMut for FrozenGuard<'_> {
    fn deref_mut(&mut self) -> &mut Stage {
        self.stage
    }
}

impl Drop for FrozenGuard<'_> {
    fn drop(&mut self) {
        self.stage.frozen = self.restore;
    }
}

fn check_import(stage: &Stage) -> StageResult<()> {
    if stage.deps.len() != 1 || stage.outs.len() != 1 || !stage.deps[0].is_import() {
        return Err(StageError::InvalidImport {
            stage: stage.path().to_path_buf(),
            deps: stage.deps.len(),
            outs: stage.outs.len(),
        });
    }
    Ok(())
}

/// Point the import at `rev` (or keep following its current one) and
/// re-run it with dependency resolution allowed.
pub fn update_import(stage: &mut Stage, ctx: &StageContext, rev: Option<&str>) -> StageResult<()> {
    check_import(stage)?;
    stage.deps[0].update(rev);
    let mut unfrozen = FrozenGuard::new(stage, false);
    unfrozen.reproduce(ctx)?;
    Ok(())
}

/// Bring an import's output into the cache.
///
/// With `dry` nothing is touched. Otherwise, unless `force` is set, content
/// that is already cached for an unchanged dependency is checked out
/// without contacting the source; in every other case the dependency is
/// re-locked and downloaded into the cache, and its hash becomes the
/// output's hash.
pub fn sync_import(
    stage: &mut Stage,
    ctx: &StageContext,
    dry: bool,
    force: bool,
    jobs: Option<usize>,
) -> StageResult<()> {
    check_import(stage)?;
    info!("Importing '{}' -> '{}'", stage.deps[0], stage.outs[0]);
    if dry {
        return Ok(());
    }

    if !force && stage.already_cached(ctx)? {
        // The content is safe in the cache; an unlinked workspace copy is
        // only worth a warning.
        match stage.outs[0].checkout(ctx, false) {
            Err(e) if e.is_link_failure() => warn!("{e}"),
            other => {
                other?;
            }
        }
        return Ok(());
    }

    stage.save_deps(ctx)?;
    let jobs = jobs.unwrap_or_else(|| ctx.jobs());
    let hash = stage.deps[0].download(ctx, jobs)?;
    stage.outs[0].hash = hash;
    Ok(())
}
