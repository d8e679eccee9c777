//! External, revision-addressable data sources for import stages.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use rayon::prelude::*;
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StageError, StageResult};

/// A versioned repository that import stages pull data from.
pub trait ImportSource: Send + Sync {
    /// Resolve `rev` (or the default branch) to an immutable revision id.
    fn resolve_rev(&self, url: &str, rev: Option<&str>) -> StageResult<String>;

    /// Returns `true` if `path` exists in the source at `rev`.
    fn exists(&self, url: &str, path: &str, rev: &str) -> StageResult<bool>;

    /// Materialize `path` at `rev` into `dest`, which must not exist yet.
    /// `jobs` bounds concurrent transfers where the source supports it.
    fn fetch(&self, url: &str, path: &str, rev: &str, dest: &Path, jobs: usize) -> StageResult<()>;
}

/// Imports from git repositories through the `git` executable.
///
/// Each (url, revision) pair is cloned at most once per instance; the
/// existence check and the fetch that follows it share that checkout.
#[derive(Debug, Default)]
pub struct GitImportSource {
    clones: Mutex<HashMap<(String, String), TempDir>>,
}

impl GitImportSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn git(&self, args: &[&str], cwd: Option<&Path>) -> StageResult<String> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!(?args, "running git");
        let output = cmd
            .output()
            .map_err(|e| StageError::Source(format!("failed to run git: {e}")))?;
        if !output.status.success() {
            return Err(StageError::Source(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn clone_at(&self, url: &str, rev: &str, into: &Path) -> StageResult<()> {
        let dest = into.to_string_lossy();
        self.git(&["clone", "--quiet", "--no-checkout", url, &dest], None)?;
        self.git(&["checkout", "--quiet", rev], Some(into))?;
        Ok(())
    }

    /// Working tree of `url` at `rev`, cloning it on first use.
    fn checkout(&self, url: &str, rev: &str) -> StageResult<PathBuf> {
        let mut clones = self
            .clones
            .lock()
            .map_err(|_| StageError::Source("git clone cache poisoned".into()))?;
        let key = (url.to_string(), rev.to_string());
        if let Some(dir) = clones.get(&key) {
            return Ok(dir.path().to_path_buf());
        }
        let scratch = tempfile::tempdir().map_err(|e| StageError::io(std::env::temp_dir(), e))?;
        self.clone_at(url, rev, scratch.path())?;
        let path = scratch.path().to_path_buf();
        clones.insert(key, scratch);
        Ok(path)
    }
}

fn is_full_sha(rev: &str) -> bool {
    rev.len() == 40 && rev.bytes().all(|b| b.is_ascii_hexdigit())
}

impl ImportSource for GitImportSource {
    fn resolve_rev(&self, url: &str, rev: Option<&str>) -> StageResult<String> {
        if let Some(rev) = rev.filter(|r| is_full_sha(r)) {
            return Ok(rev.to_lowercase());
        }
        let wanted = rev.unwrap_or("HEAD");
        let listing = self.git(&["ls-remote", url, wanted], None)?;
        listing
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .find(|sha| is_full_sha(sha))
            .map(str::to_string)
            .ok_or_else(|| StageError::Source(format!("unknown revision '{wanted}' in {url}")))
    }

    fn exists(&self, url: &str, path: &str, rev: &str) -> StageResult<bool> {
        Ok(self.checkout(url, rev)?.join(path).exists())
    }

    fn fetch(&self, url: &str, path: &str, rev: &str, dest: &Path, jobs: usize) -> StageResult<()> {
        let src = self.checkout(url, rev)?.join(path);
        if !src.exists() {
            return Err(StageError::DependencyDoesNotExist(format!("{url}:{path}@{rev}")));
        }
        copy_tree(&src, dest, jobs)
    }
}

/// Copy a file or directory tree with up to `jobs` concurrent file copies,
/// skipping git metadata.
pub(crate) fn copy_tree(src: &Path, dest: &Path, jobs: usize) -> StageResult<()> {
    if src.is_file() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| StageError::io(parent, e))?;
        }
        fs::copy(src, dest).map_err(|e| StageError::io(src, e))?;
        return Ok(());
    }
    let walker = WalkDir::new(src)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| StageError::Source(e.to_string()))?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| StageError::io(&target, e))?;
        } else {
            files.push((entry.into_path(), target));
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| StageError::Source(e.to_string()))?;
    pool.install(|| {
        files.par_iter().try_for_each(|(from, to)| {
            fs::copy(from, to).map(drop).map_err(|e| StageError::io(from, e))
        })
    })
}
