use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use lode_types::{HashInfo, HashName};
use md5::{Digest, Md5};
use rayon::prelude::*;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{HashError, HashResult};
use crate::filter::IgnoreFilter;
use crate::manifest::{DirEntry, DirManifest};

/// Read buffer size for streamed hashing.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Incremental digest over one of the supported algorithms.
pub enum ContentDigest {
    Md5(Md5),
    Blake3(Box<blake3::Hasher>),
}

impl ContentDigest {
    pub fn new(name: HashName) -> Self {
        match name {
            HashName::Md5 => Self::Md5(Md5::new()),
            HashName::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Stat snapshot that must still match for a memoized digest to be reused.
#[derive(Clone, Debug, PartialEq, Eq)]
struct MemoEntry {
    name: HashName,
    size: u64,
    mtime: Option<SystemTime>,
    digest: String,
}

/// Computes content checksums for files and directory trees.
///
/// File digests are memoized per path for as long as size and mtime are
/// unchanged, so asking twice in one run (skip check, then save) reads the
/// file once.
pub struct HashEngine {
    name: HashName,
    jobs: usize,
    filter: IgnoreFilter,
    memo: RwLock<HashMap<PathBuf, MemoEntry>>,
}

impl HashEngine {
    pub fn new(name: HashName) -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            name,
            jobs,
            filter: IgnoreFilter::default(),
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Bound the number of worker threads used for directory hashing.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_filter(mut self, filter: IgnoreFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn name(&self) -> HashName {
        self.name
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn filter(&self) -> &IgnoreFilter {
        &self.filter
    }

    /// Hex digest of an in-memory buffer.
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut digest = ContentDigest::new(self.name);
        digest.update(data);
        digest.finalize_hex()
    }

    /// Hex digest of everything readable from `reader`.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<String> {
        let mut digest = ContentDigest::new(self.name);
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
        }
        Ok(digest.finalize_hex())
    }

    /// Hex digest of a file, reusing the memo when the file is unchanged.
    pub fn file_digest(&self, path: &Path) -> HashResult<String> {
        let meta = std::fs::metadata(path).map_err(|e| HashError::io(path, e))?;
        let size = meta.len();
        let mtime = meta.modified().ok();

        if let Ok(memo) = self.memo.read() {
            if let Some(hit) = memo.get(path) {
                if hit.name == self.name && hit.size == size && hit.mtime == mtime {
                    return Ok(hit.digest.clone());
                }
            }
        }

        let file = File::open(path).map_err(|e| HashError::io(path, e))?;
        let digest = self
            .hash_reader(file)
            .map_err(|e| HashError::io(path, e))?;

        if let Ok(mut memo) = self.memo.write() {
            memo.insert(
                path.to_path_buf(),
                MemoEntry {
                    name: self.name,
                    size,
                    mtime,
                    digest: digest.clone(),
                },
            );
        }
        Ok(digest)
    }

    /// Drop any memoized digest for `path`.
    pub fn forget(&self, path: &Path) {
        if let Ok(mut memo) = self.memo.write() {
            memo.remove(path);
        }
    }

    pub fn hash_file(&self, path: &Path) -> HashResult<HashInfo> {
        let digest = self.file_digest(path)?;
        Ok(HashInfo::new(self.name, digest)?)
    }

    /// List and hash every non-ignored file under `dir` in parallel.
    pub fn build_manifest(&self, dir: &Path) -> HashResult<DirManifest> {
        let mut files = Vec::new();
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.filter.is_ignored(e.path(), e.file_type().is_dir()));
        for entry in walker {
            let entry = entry.map_err(|e| HashError::Walk {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(dir) else {
                continue;
            };
            files.push((slash_path(rel), entry.into_path()));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| HashError::Pool(e.to_string()))?;
        let entries = pool.install(|| {
            files
                .par_iter()
                .map(|(rel, path)| Ok(DirEntry::new(rel.clone(), self.file_digest(path)?)))
                .collect::<HashResult<Vec<_>>>()
        })?;

        debug!(dir = %dir.display(), files = entries.len(), "built directory manifest");
        Ok(DirManifest::new(entries))
    }

    /// Hash a directory: the digest of its manifest plus the `.dir` suffix.
    pub fn hash_dir(&self, dir: &Path) -> HashResult<(HashInfo, DirManifest)> {
        let manifest = self.build_manifest(dir)?;
        let digest = self.hash_bytes(&manifest.to_bytes()?);
        Ok((HashInfo::dir(self.name, &digest)?, manifest))
    }

    /// Hash whatever lives at `path`.
    pub fn hash_path(&self, path: &Path) -> HashResult<HashInfo> {
        let meta = std::fs::metadata(path).map_err(|e| HashError::io(path, e))?;
        if meta.is_dir() {
            Ok(self.hash_dir(path)?.0)
        } else {
            self.hash_file(path)
        }
    }
}

impl std::fmt::Debug for HashEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashEngine")
            .field("name", &self.name)
            .field("jobs", &self.jobs)
            .finish()
    }
}

fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
