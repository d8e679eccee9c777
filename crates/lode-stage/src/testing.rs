//! Test doubles shared by this crate's unit tests.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lode_cache::CacheStore;
use lode_hash::HashEngine;
use lode_types::HashName;

use crate::context::StageContext;
use crate::error::{StageError, StageResult};
use crate::source::ImportSource;

/// In-memory import source that counts every call.
pub struct MockSource {
    head: Mutex<String>,
    pub resolves: AtomicUsize,
    pub fetches: AtomicUsize,
    pub fail_fetch: std::sync::atomic::AtomicBool,
}

impl MockSource {
    pub const REV_A: &'static str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    pub const REV_B: &'static str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    pub fn new() -> Self {
        Self {
            head: Mutex::new(Self::REV_A.to_string()),
            resolves: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            fail_fetch: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_head(&self, rev: &str) {
        *self.head.lock().unwrap() = rev.to_string();
    }

    pub fn calls(&self) -> usize {
        self.resolves.load(Ordering::SeqCst) + self.fetches.load(Ordering::SeqCst)
    }
}

impl ImportSource for MockSource {
    fn resolve_rev(&self, _url: &str, rev: Option<&str>) -> StageResult<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        match rev {
            Some(r) if r.len() == 40 => Ok(r.to_string()),
            Some("v2") => Ok(Self::REV_B.to_string()),
            Some(other) => Err(StageError::Source(format!("unknown revision {other}"))),
            None => Ok(self.head.lock().unwrap().clone()),
        }
    }

    fn exists(&self, _url: &str, path: &str, _rev: &str) -> StageResult<bool> {
        Ok(!path.contains("missing"))
    }

    fn fetch(&self, _url: &str, path: &str, rev: &str, dest: &Path, _jobs: usize) -> StageResult<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StageError::Source("network unreachable".into()));
        }
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(dest, format!("{path}@{rev}")).unwrap();
        Ok(())
    }
}

pub fn mock_context(root: &Path) -> (StageContext, Arc<MockSource>) {
    let engine = Arc::new(HashEngine::new(HashName::Md5).with_jobs(2));
    let cache = Arc::new(CacheStore::open(root.join(".lode/cache")).unwrap());
    let source = Arc::new(MockSource::new());
    let ctx = StageContext::new(engine, cache).with_source(source.clone());
    (ctx, source)
}
