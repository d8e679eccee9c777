use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use lode_hash::{DirManifest, HashEngine};
use lode_types::HashInfo;
use rayon::prelude::*;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{CacheError, CacheResult};
use crate::link::{materialize, LinkType, DEFAULT_LINK_TYPES};

/// Name of the scratch directory inside the cache root.
const TMP_DIR: &str = "tmp";

/// Workspace paths touched by a checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn extend(&mut self, other: Changes) {
        self.added.extend(other.added);
        self.modified.extend(other.modified);
        self.deleted.extend(other.deleted);
    }
}

/// How aggressively a checkout replaces workspace files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Relink {
    /// Leave files whose content already matches.
    IfChanged,
    /// Re-link matching files unless they are already an independent copy
    /// made with the preferred strategy.
    Preferred,
    /// Always re-link.
    Always,
}

/// Filesystem-backed content-addressable cache.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    link_types: Vec<LinkType>,
}

impl CacheStore {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        let tmp = root.join(TMP_DIR);
        fs::create_dir_all(&tmp).map_err(|e| CacheError::io(&tmp, e))?;
        Ok(Self {
            root,
            link_types: DEFAULT_LINK_TYPES.to_vec(),
        })
    }

    /// Set the link strategy preference order.
    pub fn with_link_types(mut self, link_types: Vec<LinkType>) -> Self {
        self.link_types = link_types;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn link_types(&self) -> &[LinkType] {
        &self.link_types
    }

    /// On-disk location of the entry for `hash`.
    pub fn entry_path(&self, hash: &HashInfo) -> Option<PathBuf> {
        let (shard, rest) = hash.shard()?;
        Some(self.root.join(shard).join(rest))
    }

    /// A fresh scratch directory on the same filesystem as the cache, for
    /// staging downloads before they are committed.
    pub fn staging_dir(&self) -> CacheResult<TempDir> {
        let tmp = self.root.join(TMP_DIR);
        tempfile::Builder::new()
            .prefix("stage-")
            .tempdir_in(&tmp)
            .map_err(|e| CacheError::io(&tmp, e))
    }

    /// Returns `true` if the content for `hash` is fully present. For a
    /// directory hash every file in its manifest must be present too.
    pub fn contains(&self, hash: &HashInfo) -> bool {
        let Some(path) = self.entry_path(hash) else {
            return false;
        };
        if !path.is_file() {
            return false;
        }
        if !hash.is_dir() {
            return true;
        }
        match self.load_manifest(hash) {
            Ok(manifest) => manifest.entries().iter().all(|e| {
                manifest
                    .entry_hash(hash.name, e)
                    .is_ok_and(|h| self.entry_path(&h).is_some_and(|p| p.is_file()))
            }),
            Err(_) => false,
        }
    }

    pub fn load_manifest(&self, hash: &HashInfo) -> CacheResult<DirManifest> {
        let path = self
            .entry_path(hash)
            .ok_or_else(|| CacheError::Missing(hash.clone()))?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::Missing(hash.clone()));
            }
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        DirManifest::from_bytes(&bytes).map_err(|e| CacheError::Corrupt {
            hash: hash.clone(),
            reason: e.to_string(),
        })
    }

    /// Store the content at `path` under `hash`.
    ///
    /// The content is re-hashed as it lands in the cache; a difference from
    /// `hash` means the workspace changed after it was hashed and yields
    /// [`CacheError::HashMismatch`]. Committing present content is a no-op.
    pub fn commit(&self, path: &Path, hash: &HashInfo, engine: &HashEngine) -> CacheResult<()> {
        if !hash.is_set() {
            return Err(CacheError::Unset(path.to_path_buf()));
        }
        if hash.is_dir() {
            self.commit_dir(path, hash, engine)
        } else {
            self.commit_file(path, hash, engine)
        }
    }

    fn commit_file(&self, path: &Path, hash: &HashInfo, engine: &HashEngine) -> CacheResult<()> {
        let dest = self
            .entry_path(hash)
            .ok_or_else(|| CacheError::Unset(path.to_path_buf()))?;
        if dest.is_file() {
            debug!(path = %path.display(), %hash, "already cached");
            return Ok(());
        }

        let tmp_dir = self.root.join(TMP_DIR);
        let mut tmp = NamedTempFile::new_in(&tmp_dir).map_err(|e| CacheError::io(&tmp_dir, e))?;
        let mut src = File::open(path).map_err(|e| CacheError::io(path, e))?;
        io::copy(&mut src, tmp.as_file_mut()).map_err(|e| CacheError::io(path, e))?;

        let reopened = File::open(tmp.path()).map_err(|e| CacheError::io(tmp.path(), e))?;
        let actual = engine
            .hash_reader(reopened)
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        let expected = hash.value().unwrap_or_default();
        if actual != expected {
            return Err(CacheError::HashMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }

        self.persist(tmp, &dest)?;
        debug!(path = %path.display(), %hash, "committed to cache");
        Ok(())
    }

    fn commit_dir(&self, path: &Path, hash: &HashInfo, engine: &HashEngine) -> CacheResult<()> {
        let manifest = engine.build_manifest(path)?;
        let bytes = manifest.to_bytes()?;
        let digest = engine.hash_bytes(&bytes);
        let actual = HashInfo::dir(engine.name(), &digest)?;
        if &actual != hash {
            return Err(CacheError::HashMismatch {
                path: path.to_path_buf(),
                expected: hash.value().unwrap_or_default().to_string(),
                actual: actual.value().unwrap_or_default().to_string(),
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(engine.jobs())
            .build()
            .map_err(|e| CacheError::Pool(e.to_string()))?;
        pool.install(|| {
            manifest.entries().par_iter().try_for_each(|entry| {
                let file_hash = manifest.entry_hash(hash.name, entry)?;
                self.commit_file(&path.join(&entry.relpath), &file_hash, engine)
            })
        })?;

        // The manifest is written last so that its presence implies the
        // files it lists are present.
        let dest = self
            .entry_path(hash)
            .ok_or_else(|| CacheError::Unset(path.to_path_buf()))?;
        if !dest.is_file() {
            let tmp_dir = self.root.join(TMP_DIR);
            let mut tmp =
                NamedTempFile::new_in(&tmp_dir).map_err(|e| CacheError::io(&tmp_dir, e))?;
            io::Write::write_all(tmp.as_file_mut(), &bytes)
                .map_err(|e| CacheError::io(tmp.path(), e))?;
            self.persist(tmp, &dest)?;
        }
        info!(path = %path.display(), files = manifest.len(), "committed directory");
        Ok(())
    }

    fn persist(&self, tmp: NamedTempFile, dest: &Path) -> CacheResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let mut perms = tmp
            .as_file()
            .metadata()
            .map_err(|e| CacheError::io(tmp.path(), e))?
            .permissions();
        perms.set_readonly(true);
        fs::set_permissions(tmp.path(), perms).map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(dest).map_err(|e| CacheError::io(dest, e.error))?;
        Ok(())
    }

    /// Materialize `hash` at `path`.
    ///
    /// Unless `relink` is set, files whose content already matches are left
    /// untouched. Files inside a directory output that are not part of its
    /// manifest are removed. Link failures for individual files do not stop
    /// the rest of the checkout; they are returned together at the end.
    pub fn checkout(
        &self,
        path: &Path,
        hash: &HashInfo,
        relink: bool,
        engine: &HashEngine,
    ) -> CacheResult<Changes> {
        let mode = if relink { Relink::Always } else { Relink::IfChanged };
        self.checkout_with(path, hash, mode, engine)
    }

    /// Link freshly committed content back into the workspace with the
    /// preferred strategy, replacing the original file with a link where
    /// the strategy calls for one.
    pub fn link_back(&self, path: &Path, hash: &HashInfo, engine: &HashEngine) -> CacheResult<Changes> {
        self.checkout_with(path, hash, Relink::Preferred, engine)
    }

    fn checkout_with(
        &self,
        path: &Path,
        hash: &HashInfo,
        mode: Relink,
        engine: &HashEngine,
    ) -> CacheResult<Changes> {
        if !hash.is_set() {
            return Err(CacheError::Unset(path.to_path_buf()));
        }
        let mut changes = Changes::default();
        if hash.is_dir() {
            self.checkout_dir(path, hash, mode, engine, &mut changes)?;
        } else {
            self.checkout_file(path, hash, mode, engine, &mut changes)?;
        }
        Ok(changes)
    }

    fn checkout_file(
        &self,
        path: &Path,
        hash: &HashInfo,
        mode: Relink,
        engine: &HashEngine,
        changes: &mut Changes,
    ) -> CacheResult<()> {
        let src = self
            .entry_path(hash)
            .filter(|p| p.is_file())
            .ok_or_else(|| CacheError::Missing(hash.clone()))?;

        let existed = fs::symlink_metadata(path).is_ok();
        let matches = existed && self.is_materialized(&src, path, hash, engine);
        let keep = match mode {
            Relink::IfChanged => matches,
            Relink::Preferred => {
                matches
                    && match self.link_types.first() {
                        Some(LinkType::Symlink) => is_symlink(path),
                        Some(LinkType::Hardlink) => same_file(&src, path),
                        Some(_) => !is_symlink(path),
                        None => false,
                    }
            }
            Relink::Always => false,
        };
        if keep {
            return Ok(());
        }

        let used = materialize(&src, path, &self.link_types)?;
        engine.forget(path);
        debug!(path = %path.display(), link_type = %used, "checked out");
        if !existed {
            changes.added.push(path.to_path_buf());
        } else if !matches {
            changes.modified.push(path.to_path_buf());
        }
        Ok(())
    }

    fn checkout_dir(
        &self,
        path: &Path,
        hash: &HashInfo,
        mode: Relink,
        engine: &HashEngine,
        changes: &mut Changes,
    ) -> CacheResult<()> {
        let manifest = self.load_manifest(hash)?;
        if fs::symlink_metadata(path).is_ok_and(|m| !m.is_dir()) {
            fs::remove_file(path).map_err(|e| CacheError::io(path, e))?;
            changes.deleted.push(path.to_path_buf());
        }
        fs::create_dir_all(path).map_err(|e| CacheError::io(path, e))?;

        let mut failed_reasons = Vec::new();
        for entry in manifest.entries() {
            let file_hash = manifest.entry_hash(hash.name, entry)?;
            let target = path.join(&entry.relpath);
            match self.checkout_file(&target, &file_hash, mode, engine, changes) {
                Ok(()) => {}
                Err(CacheError::LinkFailed { path, reasons }) => {
                    failed_reasons.push(format!("{}: {}", path.display(), reasons.join(", ")));
                }
                Err(e) => return Err(e),
            }
        }

        let expected: BTreeSet<PathBuf> = manifest
            .entries()
            .iter()
            .map(|e| path.join(&e.relpath))
            .collect();
        let walker = WalkDir::new(path)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !engine.filter().is_ignored(e.path(), e.file_type().is_dir()));
        for stray in walker.filter_map(Result::ok) {
            if stray.file_type().is_dir() || expected.contains(stray.path()) {
                continue;
            }
            fs::remove_file(stray.path()).map_err(|e| CacheError::io(stray.path(), e))?;
            changes.deleted.push(stray.path().to_path_buf());
        }

        if !failed_reasons.is_empty() {
            return Err(CacheError::LinkFailed {
                path: path.to_path_buf(),
                reasons: failed_reasons,
            });
        }
        Ok(())
    }

    fn is_materialized(&self, src: &Path, path: &Path, hash: &HashInfo, engine: &HashEngine) -> bool {
        if is_symlink(path) {
            return fs::read_link(path).is_ok_and(|target| target == src);
        }
        engine
            .file_digest(path)
            .is_ok_and(|d| Some(d.as_str()) == hash.value())
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::symlink_metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_a: &Path, _b: &Path) -> bool {
    false
}
