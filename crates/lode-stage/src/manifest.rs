//! Durable stage records: one pretty-printed JSON file per stage.
//!
//! Paths inside a manifest are relative so a repository can be moved:
//! `wdir` is relative to the manifest's directory and output/dependency
//! paths are relative to `wdir`. Import dependency paths are kept as given,
//! since they point into another repository.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use lode_types::{normalize, HashInfo, HashName, PathInfo};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::dependency::{Dependency, RepoSource};
use crate::error::{StageError, StageResult};
use crate::output::Output;
use crate::stage::Stage;

/// File name suffix of stage manifests.
pub const MANIFEST_SUFFIX: &str = ".lode";

#[derive(Debug, Serialize, Deserialize)]
struct StageRecord {
    #[serde(default = "dot", skip_serializing_if = "is_dot")]
    wdir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cmd: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    frozen: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deps: Vec<DepRecord>,
    #[serde(default)]
    outs: Vec<OutRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DepRecord {
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<HashInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repo: Option<RepoSource>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OutRecord {
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<HashInfo>,
    #[serde(default = "yes", skip_serializing_if = "is_true")]
    cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    desc: Option<String>,
}

fn dot() -> String {
    ".".to_string()
}

fn is_dot(s: &str) -> bool {
    s == "."
}

fn yes() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Returns `true` if `path` names a stage manifest.
pub fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() > MANIFEST_SUFFIX.len() && n.ends_with(MANIFEST_SUFFIX))
}

/// Serialized form of `stage`. Identical stages give identical bytes.
pub fn to_bytes(stage: &Stage) -> StageResult<Vec<u8>> {
    let manifest_dir = parent_of(stage.path());
    let record = StageRecord {
        wdir: relative_path(stage.wdir(), &manifest_dir),
        cmd: stage.cmd.clone(),
        frozen: stage.frozen,
        deps: stage
            .deps
            .iter()
            .map(|d| DepRecord {
                path: if d.is_import() {
                    d.path.path().to_string()
                } else {
                    relative_path(&d.path.as_path(), stage.wdir())
                },
                hash: d.hash.is_set().then(|| d.hash.clone()),
                repo: d.repo.clone(),
            })
            .collect(),
        outs: stage
            .outs
            .iter()
            .map(|o| OutRecord {
                path: relative_path(&o.path.as_path(), stage.wdir()),
                hash: o.hash.is_set().then(|| o.hash.clone()),
                cache: o.cache,
                desc: o.desc.clone(),
            })
            .collect(),
    };
    let mut bytes = serde_json::to_vec_pretty(&record).map_err(|e| StageError::Manifest {
        path: stage.path().to_path_buf(),
        reason: e.to_string(),
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write `stage` to its manifest path, atomically. Rewriting an unchanged
/// stage leaves the file untouched.
pub fn dump(stage: &Stage) -> StageResult<()> {
    let path = stage.path();
    let bytes = to_bytes(stage)?;
    if fs::read(path).is_ok_and(|existing| existing == bytes) {
        debug!(path = %path.display(), "manifest unchanged");
        return Ok(());
    }
    let dir = parent_of(path);
    fs::create_dir_all(&dir).map_err(|e| StageError::io(&dir, e))?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StageError::io(&dir, e))?;
    tmp.write_all(&bytes).map_err(|e| StageError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StageError::io(path, e.error))?;
    debug!(path = %path.display(), "wrote manifest");
    Ok(())
}

/// Read the stage recorded at `path`.
pub fn load(path: &Path) -> StageResult<Stage> {
    let bytes = fs::read(path).map_err(|e| StageError::io(path, e))?;
    let record: StageRecord = serde_json::from_slice(&bytes).map_err(|e| StageError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let path = normalize(path);
    let wdir = normalize(&parent_of(&path).join(&record.wdir));
    let mut stage = Stage::new(path, wdir.clone());
    stage.cmd = record.cmd;
    stage.frozen = record.frozen;
    stage.deps = record
        .deps
        .into_iter()
        .map(|d| {
            let name = d.hash.as_ref().map(|h| h.name).unwrap_or_default();
            Dependency {
                path: if d.repo.is_some() {
                    PathInfo::local(&d.path)
                } else {
                    PathInfo::local(wdir.join(&d.path))
                },
                hash: d.hash.unwrap_or_else(|| HashInfo::unset(name)),
                repo: d.repo,
            }
        })
        .collect();
    stage.outs = record
        .outs
        .into_iter()
        .map(|o| {
            let name: HashName = o.hash.as_ref().map(|h| h.name).unwrap_or_default();
            Output {
                path: PathInfo::local(wdir.join(&o.path)),
                hash: o.hash.unwrap_or_else(|| HashInfo::unset(name)),
                cache: o.cache,
                desc: o.desc,
            }
        })
        .collect();
    Ok(stage)
}

/// Delete the manifest at `path`. A missing file is not an error.
pub fn remove(path: &Path) -> StageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed manifest");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StageError::io(path, e)),
    }
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `path` relative to `base`, using `..` where needed and `/` separators.
pub fn relative_path(path: &Path, base: &Path) -> String {
    let path = normalize(path);
    let base = normalize(base);
    let ours: Vec<Component> = path.components().collect();
    let theirs: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();
    let common = ours
        .iter()
        .zip(theirs.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat("..".to_string()).take(theirs.len() - common));
    parts.extend(
        ours[common..]
            .iter()
            .filter(|c| **c != Component::CurDir)
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    if parts.is_empty() {
        return ".".to_string();
    }
    parts.join("/")
}
