//! Test doubles for repository tests.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use lode_stage::{ImportSource, StageError, StageResult};

/// Import source whose content is `<path>@<rev>`.
pub struct FakeSource {
    head: Mutex<String>,
    pub resolves: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl FakeSource {
    pub const REV_1: &'static str = "1111111111111111111111111111111111111111";
    pub const REV_2: &'static str = "2222222222222222222222222222222222222222";

    pub fn new() -> Self {
        Self {
            head: Mutex::new(Self::REV_1.to_string()),
            resolves: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_head(&self, rev: &str) {
        *self.head.lock().unwrap() = rev.to_string();
    }

    pub fn calls(&self) -> usize {
        self.resolves.load(Ordering::SeqCst) + self.fetches.load(Ordering::SeqCst)
    }
}

impl ImportSource for FakeSource {
    fn resolve_rev(&self, _url: &str, rev: Option<&str>) -> StageResult<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        match rev {
            Some(r) if r.len() == 40 => Ok(r.to_string()),
            Some("v2") => Ok(Self::REV_2.to_string()),
            Some(other) => Err(StageError::Source(format!("unknown revision {other}"))),
            None => Ok(self.head.lock().unwrap().clone()),
        }
    }

    fn exists(&self, _url: &str, path: &str, _rev: &str) -> StageResult<bool> {
        Ok(!path.contains("missing"))
    }

    fn fetch(&self, _url: &str, path: &str, rev: &str, dest: &Path, _jobs: usize) -> StageResult<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(dest, format!("{path}@{rev}")).unwrap();
        Ok(())
    }
}
