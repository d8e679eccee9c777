//! Directory manifests: the sorted listing whose digest identifies a
//! directory in the cache.

use serde::{Deserialize, Serialize};

use lode_types::{HashInfo, HashName};

use crate::error::{HashError, HashResult};

/// A single file inside a tracked directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Path relative to the directory root, `/`-separated.
    pub relpath: String,
    /// Hex digest of the file content.
    pub hash: String,
}

impl DirEntry {
    pub fn new(relpath: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            relpath: relpath.into(),
            hash: hash.into(),
        }
    }
}

impl PartialOrd for DirEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DirEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.relpath
            .cmp(&other.relpath)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

/// Listing of every file in a directory with its digest.
///
/// Entries are sorted by relative path, so the serialized form (and hence
/// the directory hash) does not depend on the order files were hashed in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirManifest {
    entries: Vec<DirEntry>,
}

impl DirManifest {
    pub fn new(mut entries: Vec<DirEntry>) -> Self {
        entries.sort();
        entries.dedup_by(|a, b| a.relpath == b.relpath);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn get(&self, relpath: &str) -> Option<&DirEntry> {
        self.entries
            .binary_search_by(|e| e.relpath.as_str().cmp(relpath))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// The `HashInfo` of one entry under the manifest's algorithm.
    pub fn entry_hash(&self, name: HashName, entry: &DirEntry) -> HashResult<HashInfo> {
        Ok(HashInfo::new(name, entry.hash.clone())?)
    }

    /// Canonical bytes: what gets stored in the cache and hashed.
    pub fn to_bytes(&self) -> HashResult<Vec<u8>> {
        serde_json::to_vec(&self.entries).map_err(|e| HashError::Serialization(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> HashResult<Self> {
        let entries: Vec<DirEntry> =
            serde_json::from_slice(data).map_err(|e| HashError::Serialization(e.to_string()))?;
        Ok(Self::new(entries))
    }
}
