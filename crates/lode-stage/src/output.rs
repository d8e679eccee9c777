use std::fmt;

use lode_cache::Changes;
use lode_types::{HashInfo, HashName, PathInfo};
use tracing::debug;

use crate::context::StageContext;
use crate::error::{StageError, StageResult};

/// A data location owned by exactly one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub path: PathInfo,
    /// Unset until the output is saved.
    pub hash: HashInfo,
    /// Whether content is committed to the cache.
    pub cache: bool,
    pub desc: Option<String>,
}

impl Output {
    pub fn new(path: PathInfo, hash_name: HashName) -> Self {
        Self {
            path,
            hash: HashInfo::unset(hash_name),
            cache: true,
            desc: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.as_path().exists()
    }

    /// Directory outputs are known by their hash once saved, and by the
    /// workspace before that.
    pub fn is_dir(&self) -> bool {
        if self.hash.is_set() {
            return self.hash.is_dir();
        }
        self.path.as_path().is_dir()
    }

    /// Hash of the content currently in the workspace.
    pub fn current_hash(&self, ctx: &StageContext) -> StageResult<HashInfo> {
        if !self.exists() {
            return Err(StageError::OutputDoesNotExist(self.path.as_path()));
        }
        Ok(ctx.engine.hash_path(&self.path.as_path())?)
    }

    /// Record the hash of the workspace content.
    pub fn save(&mut self, ctx: &StageContext) -> StageResult<()> {
        self.hash = self.current_hash(ctx)?;
        debug!(out = %self.path, hash = %self.hash, "saved output");
        Ok(())
    }

    /// Returns `true` if the workspace no longer matches the recorded hash.
    pub fn changed(&self, ctx: &StageContext) -> bool {
        if !self.hash.is_set() || !self.exists() {
            return true;
        }
        self.current_hash(ctx).map_or(true, |h| h != self.hash)
    }

    /// Returns `true` if the recorded content is fully present in the cache.
    pub fn in_cache(&self, ctx: &StageContext) -> bool {
        self.hash.is_set() && ctx.cache.contains(&self.hash)
    }

    /// Copy the workspace content into the cache and link it back with the
    /// preferred strategy.
    pub fn commit(&self, ctx: &StageContext) -> StageResult<()> {
        if !self.cache {
            return Ok(());
        }
        let path = self.path.as_path();
        ctx.cache.commit(&path, &self.hash, &ctx.engine)?;
        ctx.cache.link_back(&path, &self.hash, &ctx.engine)?;
        Ok(())
    }

    /// Materialize the recorded content from the cache.
    pub fn checkout(&self, ctx: &StageContext, relink: bool) -> StageResult<Changes> {
        if !self.cache {
            return Ok(Changes::default());
        }
        Ok(ctx
            .cache
            .checkout(&self.path.as_path(), &self.hash, relink, &ctx.engine)?)
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_cache::CacheStore;
    use lode_hash::HashEngine;
    use std::fs;
    use std::sync::Arc;

    fn ctx(dir: &std::path::Path) -> StageContext {
        let engine = Arc::new(HashEngine::new(HashName::Md5).with_jobs(2));
        let cache = Arc::new(CacheStore::open(dir.join(".lode/cache")).unwrap());
        StageContext::new(engine, cache)
    }

    #[test]
    fn save_records_hash() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        fs::write(dir.path().join("f"), "hello").unwrap();
        let mut out = Output::new(PathInfo::local(dir.path().join("f")), HashName::Md5);
        assert!(!out.hash.is_set());
        out.save(&ctx).unwrap();
        assert_eq!(out.hash.value(), Some("5d41402abc4b2a76b9719d911017c592"));
        assert!(!out.changed(&ctx));
    }

    #[test]
    fn save_missing_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let mut out = Output::new(PathInfo::local(dir.path().join("nope")), HashName::Md5);
        assert!(matches!(out.save(&ctx), Err(StageError::OutputDoesNotExist(_))));
    }

    #[test]
    fn commit_then_checkout_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let path = dir.path().join("f");
        fs::write(&path, "content").unwrap();
        let mut out = Output::new(PathInfo::local(&path), HashName::Md5);
        out.save(&ctx).unwrap();
        out.commit(&ctx).unwrap();
        assert!(out.in_cache(&ctx));

        fs::remove_file(&path).unwrap();
        assert!(out.changed(&ctx));
        let changes = out.checkout(&ctx, false).unwrap();
        assert_eq!(changes.added.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    fn uncached_output_skips_cache() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let path = dir.path().join("metrics.json");
        fs::write(&path, "{}").unwrap();
        let mut out = Output::new(PathInfo::local(&path), HashName::Md5);
        out.cache = false;
        out.save(&ctx).unwrap();
        out.commit(&ctx).unwrap();
        assert!(!out.in_cache(&ctx));
    }
}
