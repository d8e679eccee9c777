use std::path::Path;
use std::sync::Arc;

use lode_cache::{CacheStore, LinkType};
use lode_hash::HashEngine;
use lode_types::{HashInfo, PathInfo};
use tracing::debug;

use crate::backend::RemoteBackend;
use crate::error::{RemoteError, RemoteResult};

/// A remote on a locally mounted filesystem.
///
/// Uses the cache layout, so a cache directory can itself serve as a
/// remote. Fetches always copy.
#[derive(Debug)]
pub struct LocalRemote {
    location: PathInfo,
    store: CacheStore,
    engine: Arc<HashEngine>,
}

impl LocalRemote {
    pub fn open(location: PathInfo, engine: Arc<HashEngine>) -> RemoteResult<Self> {
        if !location.is_local() {
            return Err(RemoteError::Config(format!(
                "'{location}' is not a local path"
            )));
        }
        let store = CacheStore::open(location.as_path())?.with_link_types(vec![LinkType::Copy]);
        Ok(Self {
            location,
            store,
            engine,
        })
    }
}

impl RemoteBackend for LocalRemote {
    fn scheme(&self) -> &str {
        "local"
    }

    fn location(&self) -> &PathInfo {
        &self.location
    }

    fn store(&self, local: &Path) -> RemoteResult<HashInfo> {
        let hash = self.engine.hash_path(local)?;
        self.store.commit(local, &hash, &self.engine)?;
        debug!(path = %local.display(), %hash, remote = %self.location, "stored");
        Ok(hash)
    }

    fn fetch(&self, hash: &HashInfo, dest: &Path) -> RemoteResult<()> {
        if !self.store.contains(hash) {
            return Err(RemoteError::NotFound(hash.clone()));
        }
        self.store.checkout(dest, hash, true, &self.engine)?;
        debug!(path = %dest.display(), %hash, remote = %self.location, "fetched");
        Ok(())
    }

    fn exists(&self, hash: &HashInfo) -> RemoteResult<bool> {
        Ok(self.store.contains(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_types::HashName;
    use std::fs;

    fn remote(dir: &Path) -> LocalRemote {
        let engine = Arc::new(HashEngine::new(HashName::Md5).with_jobs(2));
        LocalRemote::open(PathInfo::local(dir.join("remote")), engine).unwrap()
    }

    #[test]
    fn store_then_fetch_file() {
        let dir = tempfile::tempdir().unwrap();
        let remote = remote(dir.path());
        let src = dir.path().join("data.csv");
        fs::write(&src, "a,b\n1,2\n").unwrap();

        let hash = remote.store(&src).unwrap();
        assert!(remote.exists(&hash).unwrap());

        let dest = dir.path().join("restored/data.csv");
        remote.fetch(&hash, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn store_then_fetch_directory() {
        let dir = tempfile::tempdir().unwrap();
        let remote = remote(dir.path());
        let src = dir.path().join("images");
        fs::create_dir_all(src.join("train")).unwrap();
        fs::write(src.join("train/0.png"), "zero").unwrap();
        fs::write(src.join("label.txt"), "cat").unwrap();

        let hash = remote.store(&src).unwrap();
        assert!(hash.is_dir());

        let dest = dir.path().join("out");
        remote.fetch(&hash, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("train/0.png")).unwrap(), "zero");
        assert_eq!(fs::read_to_string(dest.join("label.txt")).unwrap(), "cat");
    }

    #[test]
    fn fetch_unknown_hash_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let remote = remote(dir.path());
        let hash = HashInfo::new(HashName::Md5, "0".repeat(32)).unwrap();
        assert!(!remote.exists(&hash).unwrap());
        let err = remote.fetch(&hash, &dir.path().join("x")).unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[test]
    fn rejects_non_local_location() {
        let engine = Arc::new(HashEngine::new(HashName::Md5));
        let loc = PathInfo::parse("s3://bucket/prefix").unwrap();
        assert!(matches!(
            LocalRemote::open(loc, engine),
            Err(RemoteError::Config(_))
        ));
    }
}
