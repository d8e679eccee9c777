//! Target resolution: from user-supplied strings to stage locations.

use std::path::{Path, PathBuf};

use lode_stage::MANIFEST_SUFFIX;
use lode_types::{normalize, PathInfo};

use crate::error::{RepoError, RepoResult};

/// Where a stage for one target lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Manifest file path.
    pub manifest: PathBuf,
    /// Working directory: the parent of the output.
    pub wdir: PathBuf,
    pub out: PathInfo,
}

/// Absolute form of `target`, relative paths being taken from `root`.
pub fn absolute(root: &Path, target: &Path) -> PathBuf {
    normalize(&root.join(target))
}

/// Compute the stage location for `target`.
///
/// The manifest is named after the output with the manifest suffix and
/// placed beside it, unless `fname` overrides the file name.
pub fn resolve(root: &Path, target: &Path, fname: Option<&str>) -> RepoResult<Resolved> {
    let path = absolute(root, target);
    if path == root || !path.starts_with(root) {
        return Err(RepoError::OutsideRepo(path));
    }
    let (Some(wdir), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(RepoError::OutsideRepo(path));
    };
    let manifest = match fname {
        Some(fname) => wdir.join(fname),
        None => wdir.join(format!("{}{MANIFEST_SUFFIX}", name.to_string_lossy())),
    };
    Ok(Resolved {
        manifest,
        wdir: wdir.to_path_buf(),
        out: PathInfo::local(&path),
    })
}

/// Expand glob patterns in `targets` when `enabled`.
///
/// A pattern that matches nothing is an error. With globbing disabled the
/// targets are returned literally, metacharacters included.
pub fn expand_globs(root: &Path, targets: &[String], enabled: bool) -> RepoResult<Vec<PathBuf>> {
    if !enabled {
        return Ok(targets.iter().map(|t| absolute(root, Path::new(t))).collect());
    }
    let mut expanded = Vec::new();
    for target in targets {
        let pattern = absolute(root, Path::new(target));
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|e| {
            RepoError::InvalidArgument(format!("invalid glob pattern '{target}': {e}"))
        })?;
        let before = expanded.len();
        for entry in paths {
            let path = entry.map_err(|e| RepoError::io(e.path().to_path_buf(), e.into_error()))?;
            expanded.push(normalize(&path));
        }
        if expanded.len() == before {
            return Err(RepoError::NoTargetsFound(target.clone()));
        }
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolve_places_manifest_beside_output() {
        let root = Path::new("/repo");
        let r = resolve(root, Path::new("data/images"), None).unwrap();
        assert_eq!(r.manifest, PathBuf::from("/repo/data/images.lode"));
        assert_eq!(r.wdir, PathBuf::from("/repo/data"));
        assert_eq!(r.out, PathInfo::local("/repo/data/images"));
    }

    #[test]
    fn resolve_honours_fname() {
        let r = resolve(Path::new("/repo"), Path::new("/repo/a/b.csv"), Some("custom.lode")).unwrap();
        assert_eq!(r.manifest, PathBuf::from("/repo/a/custom.lode"));
    }

    #[test]
    fn resolve_rejects_paths_outside_root() {
        let root = Path::new("/repo");
        assert!(matches!(
            resolve(root, Path::new("../elsewhere"), None),
            Err(RepoError::OutsideRepo(_))
        ));
        assert!(matches!(
            resolve(root, Path::new("."), None),
            Err(RepoError::OutsideRepo(_))
        ));
    }

    #[test]
    fn globs_expand_or_fail() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.csv"), "a").unwrap();
        fs::write(root.join("b.csv"), "b").unwrap();
        fs::write(root.join("c.txt"), "c").unwrap();

        let found = expand_globs(root, &["*.csv".into()], true).unwrap();
        assert_eq!(found, vec![root.join("a.csv"), root.join("b.csv")]);

        assert!(matches!(
            expand_globs(root, &["*.bin".into()], true),
            Err(RepoError::NoTargetsFound(p)) if p == "*.bin"
        ));
    }

    #[test]
    fn literal_targets_when_glob_disabled() {
        let root = Path::new("/repo");
        let found = expand_globs(root, &["data/*.csv".into()], false).unwrap();
        assert_eq!(found, vec![PathBuf::from("/repo/data/*.csv")]);
    }

    proptest::proptest! {
        #[test]
        fn manifest_sits_beside_any_nested_output(
            parts in proptest::collection::vec("[a-z]{1,8}", 1..5)
        ) {
            let root = Path::new("/repo");
            let target: PathBuf = parts.iter().collect();
            let r = resolve(root, &target, None).unwrap();
            let name = format!("{}.lode", parts[parts.len() - 1]);
            proptest::prop_assert_eq!(r.manifest.file_name().unwrap().to_str().unwrap(), name.as_str());
            proptest::prop_assert_eq!(r.manifest.parent().unwrap(), r.wdir.as_path());
            proptest::prop_assert!(r.wdir.starts_with(root));
        }
    }
}
