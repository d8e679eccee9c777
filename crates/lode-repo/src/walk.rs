//! Discovery of files that are not yet tracked.

use std::path::{Path, PathBuf};

use lode_hash::IgnoreFilter;
use lode_stage::is_manifest;
use walkdir::WalkDir;

use crate::error::{RepoError, RepoResult};
use crate::scm::Scm;

/// Lazily enumerate the files under `dir` that a recursive add should
/// track.
///
/// Skipped: SCM metadata and SCM-tracked files, stage manifests, lode's
/// own directory and anything matched by the ignore filter. The iterator
/// walks the filesystem as it is consumed and cannot be restarted.
pub fn walk_untracked<'a>(
    dir: &Path,
    scm: &'a dyn Scm,
    filter: &'a IgnoreFilter,
) -> impl Iterator<Item = RepoResult<PathBuf>> + 'a {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            e.depth() == 0
                || !(filter.is_ignored(e.path(), e.file_type().is_dir())
                    || scm.belongs_to_scm(e.path()))
        })
        .filter_map(move |entry| match entry {
            Ok(e) => {
                let path = e.path();
                let wanted = e.file_type().is_file() && !is_manifest(path) && !scm.is_tracked(path);
                wanted.then(|| Ok(path.to_path_buf()))
            }
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                Some(Err(RepoError::io(path, e.into())))
            }
        })
}
