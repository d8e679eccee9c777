//! Process-wide repository lock.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs4::FileExt;
use tracing::debug;

use crate::error::{RepoError, RepoResult};

/// Exclusive advisory lock on `.lode/lock`, held for the duration of a
/// graph-mutating operation and released on drop.
#[derive(Debug)]
pub struct RepoLock {
    _file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Block until the lock is available.
    pub fn acquire(path: &Path) -> RepoResult<Self> {
        let file = open(path)?;
        file.lock_exclusive().map_err(|e| RepoError::io(path, e))?;
        debug!(path = %path.display(), "acquired repository lock");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock or fail with [`RepoError::Locked`] if it is held.
    pub fn try_acquire(path: &Path) -> RepoResult<Self> {
        let file = open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Err(RepoError::Locked(path.to_path_buf()))
            }
            Err(e) => return Err(RepoError::io(path, e)),
        }
        debug!(path = %path.display(), "acquired repository lock");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "released repository lock");
    }
}

fn open(path: &Path) -> RepoResult<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| RepoError::io(path, e))
}
