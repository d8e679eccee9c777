use std::fmt;

use lode_types::{HashInfo, HashName, PathInfo};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::StageContext;
use crate::error::{StageError, StageResult};

/// Where an imported dependency comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSource {
    pub url: String,
    /// Requested revision; `None` follows the default branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Immutable revision the dependency was last resolved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev_lock: Option<String>,
}

/// A declared input of a stage.
///
/// Local dependencies are workspace paths identified by their hash. Import
/// dependencies name a path inside an external repository and are
/// identified by the revision they were resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub path: PathInfo,
    pub hash: HashInfo,
    pub repo: Option<RepoSource>,
}

impl Dependency {
    pub fn local(path: PathInfo, hash_name: HashName) -> Self {
        Self {
            path,
            hash: HashInfo::unset(hash_name),
            repo: None,
        }
    }

    /// A dependency on `path` inside the repository at `url`.
    pub fn import(url: impl Into<String>, path: &str, rev: Option<String>, hash_name: HashName) -> Self {
        Self {
            path: PathInfo::local(path),
            hash: HashInfo::unset(hash_name),
            repo: Some(RepoSource {
                url: url.into(),
                rev,
                rev_lock: None,
            }),
        }
    }

    pub fn is_import(&self) -> bool {
        self.repo.is_some()
    }

    /// Re-point an import at `rev`. The lock is kept so that a change can be
    /// detected against it.
    pub fn update(&mut self, rev: Option<&str>) {
        if let (Some(repo), Some(rev)) = (self.repo.as_mut(), rev) {
            repo.rev = Some(rev.to_string());
        }
    }

    /// Record the current state: the resolved revision for imports, the
    /// content hash otherwise.
    pub fn save(&mut self, ctx: &StageContext) -> StageResult<()> {
        let Some(repo) = self.repo.as_mut() else {
            let path = self.path.as_path();
            if !path.exists() {
                return Err(StageError::DependencyDoesNotExist(self.path.to_string()));
            }
            self.hash = ctx.engine.hash_path(&path)?;
            return Ok(());
        };

        let rev = ctx.source.resolve_rev(&repo.url, repo.rev.as_deref())?;
        if !ctx.source.exists(&repo.url, self.path.path(), &rev)? {
            return Err(StageError::DependencyDoesNotExist(format!(
                "{}:{}@{rev}",
                repo.url, self.path
            )));
        }
        debug!(url = %repo.url, path = %self.path, %rev, "locked import revision");
        repo.rev_lock = Some(rev);
        Ok(())
    }

    /// Returns `true` if the dependency moved since it was saved.
    pub fn changed(&self, ctx: &StageContext) -> StageResult<bool> {
        match &self.repo {
            Some(repo) => {
                let Some(locked) = &repo.rev_lock else {
                    return Ok(true);
                };
                let current = ctx.source.resolve_rev(&repo.url, repo.rev.as_deref())?;
                Ok(&current != locked)
            }
            None => {
                let path = self.path.as_path();
                if !self.hash.is_set() || !path.exists() {
                    return Ok(true);
                }
                Ok(ctx.engine.hash_path(&path)? != self.hash)
            }
        }
    }

    /// Fetch an import's content at its locked revision straight into the
    /// cache and return the hash it is stored under.
    pub fn download(&self, ctx: &StageContext, jobs: usize) -> StageResult<HashInfo> {
        let Some(repo) = &self.repo else {
            return Err(StageError::Source(format!("'{}' is not an import", self.path)));
        };
        let rev = match &repo.rev_lock {
            Some(rev) => rev.clone(),
            None => ctx.source.resolve_rev(&repo.url, repo.rev.as_deref())?,
        };

        let staging = ctx.cache.staging_dir()?;
        let staged = staging.path().join("content");
        ctx.source
            .fetch(&repo.url, self.path.path(), &rev, &staged, jobs.max(1))?;

        let hash = ctx.engine.hash_path(&staged)?;
        ctx.cache.commit(&staged, &hash, &ctx.engine)?;
        ctx.engine.forget(&staged);
        debug!(url = %repo.url, path = %self.path, %hash, "downloaded into cache");
        Ok(hash)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repo {
            Some(repo) => write!(f, "{}/{}", repo.url.trim_end_matches('/'), self.path),
            None => write!(f, "{}", self.path),
        }
    }
}
