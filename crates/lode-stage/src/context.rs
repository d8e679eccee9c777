use std::sync::Arc;

use lode_cache::CacheStore;
use lode_hash::HashEngine;

use crate::source::{GitImportSource, ImportSource};

/// Services a stage needs to hash, cache and import its data.
#[derive(Clone)]
pub struct StageContext {
    pub engine: Arc<HashEngine>,
    pub cache: Arc<CacheStore>,
    pub source: Arc<dyn ImportSource>,
}

impl StageContext {
    /// A context importing through git.
    pub fn new(engine: Arc<HashEngine>, cache: Arc<CacheStore>) -> Self {
        Self {
            engine,
            cache,
            source: Arc::new(GitImportSource::new()),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ImportSource>) -> Self {
        self.source = source;
        self
    }

    /// Default worker count for transfers.
    pub fn jobs(&self) -> usize {
        self.engine.jobs()
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("engine", &self.engine)
            .field("cache", &self.cache.root())
            .finish()
    }
}
