//! Ignore rules applied while hashing directories and walking workspaces.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{HashError, HashResult};

/// Name of the per-repository ignore file (gitignore syntax).
pub const IGNORE_FILE: &str = ".lodeignore";

/// Directory names that are never part of tracked content.
const ALWAYS_IGNORED: [&str; 3] = [".git", ".hg", ".lode"];

/// Matcher for paths that must not be hashed or tracked.
///
/// Meant to be used as a walk pruning predicate: it inspects the entry's own
/// name plus any `.lodeignore` rules, so pruned directories hide their
/// children without the children being checked.
#[derive(Clone, Debug, Default)]
pub struct IgnoreFilter {
    root: PathBuf,
    rules: Option<Gitignore>,
}

impl IgnoreFilter {
    /// A filter with only the built-in rules.
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rules: None,
        }
    }

    /// Load `<root>/.lodeignore` if it exists.
    pub fn load(root: &Path) -> HashResult<Self> {
        let file = root.join(IGNORE_FILE);
        if !file.is_file() {
            return Ok(Self::empty(root));
        }
        let mut builder = GitignoreBuilder::new(root);
        if let Some(err) = builder.add(&file) {
            return Err(HashError::Ignore(err.to_string()));
        }
        let rules = builder
            .build()
            .map_err(|e| HashError::Ignore(e.to_string()))?;
        Ok(Self {
            root: root.to_path_buf(),
            rules: Some(rules),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if `path` should be skipped.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let builtin = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| ALWAYS_IGNORED.contains(&n));
        if builtin {
            return true;
        }
        let Some(rules) = &self.rules else {
            return false;
        };
        if path.strip_prefix(&self.root).is_err() {
            return false;
        }
        rules.matched_path_or_any_parents(path, is_dir).is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_always_ignored() {
        let filter = IgnoreFilter::empty("/repo");
        assert!(filter.is_ignored(Path::new("/repo/.git"), true));
        assert!(filter.is_ignored(Path::new("/repo/sub/.lode"), true));
        assert!(!filter.is_ignored(Path::new("/repo/data.lode"), false));
    }

    #[test]
    fn rules_from_ignore_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IGNORE_FILE), "*.tmp\nscratch/\n").unwrap();
        let filter = IgnoreFilter::load(dir.path()).unwrap();

        assert!(filter.is_ignored(&dir.path().join("a.tmp"), false));
        assert!(filter.is_ignored(&dir.path().join("scratch"), true));
        assert!(filter.is_ignored(&dir.path().join("scratch/x.csv"), false));
        assert!(!filter.is_ignored(&dir.path().join("a.csv"), false));
    }

    #[test]
    fn paths_outside_root_only_use_builtin_rules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IGNORE_FILE), "*.tmp\n").unwrap();
        let filter = IgnoreFilter::load(dir.path()).unwrap();
        assert!(!filter.is_ignored(Path::new("/elsewhere/a.tmp"), false));
    }

    #[test]
    fn missing_ignore_file_is_empty_filter() {
        let dir = tempfile::tempdir().unwrap();
        let filter = IgnoreFilter::load(dir.path()).unwrap();
        assert!(!filter.is_ignored(&dir.path().join("a.tmp"), false));
    }
}
