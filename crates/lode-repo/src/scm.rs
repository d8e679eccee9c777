//! Source-control queries used when discovering untracked files.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use tracing::{debug, warn};

/// What the surrounding source-control system knows about a path.
pub trait Scm: Send + Sync {
    /// Returns `true` for the SCM's own metadata (`.git/...`).
    fn belongs_to_scm(&self, path: &Path) -> bool;

    /// Returns `true` if the SCM already tracks `path`.
    fn is_tracked(&self, path: &Path) -> bool;
}

/// No source control: nothing is tracked.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoScm;

impl Scm for NoScm {
    fn belongs_to_scm(&self, _path: &Path) -> bool {
        false
    }

    fn is_tracked(&self, _path: &Path) -> bool {
        false
    }
}

/// Git, queried through the `git` CLI. The tracked file list is read once.
#[derive(Debug)]
pub struct GitScm {
    root: PathBuf,
    tracked: OnceLock<HashSet<PathBuf>>,
}

impl GitScm {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tracked: OnceLock::new(),
        }
    }

    fn tracked(&self) -> &HashSet<PathBuf> {
        self.tracked.get_or_init(|| {
            let output = Command::new("git")
                .args(["ls-files", "-z"])
                .current_dir(&self.root)
                .output();
            match output {
                Ok(out) if out.status.success() => {
                    let files: HashSet<PathBuf> = out
                        .stdout
                        .split(|b| *b == 0)
                        .filter(|s| !s.is_empty())
                        .map(|s| self.root.join(String::from_utf8_lossy(s).as_ref()))
                        .collect();
                    debug!(count = files.len(), "loaded git tracked files");
                    files
                }
                Ok(out) => {
                    warn!(
                        "git ls-files failed: {}",
                        String::from_utf8_lossy(&out.stderr).trim()
                    );
                    HashSet::new()
                }
                Err(e) => {
                    warn!("unable to run git: {e}");
                    HashSet::new()
                }
            }
        })
    }
}

impl Scm for GitScm {
    fn belongs_to_scm(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root).is_ok_and(|rel| {
            rel.components()
                .any(|c| matches!(c, Component::Normal(n) if n == ".git"))
        })
    }

    fn is_tracked(&self, path: &Path) -> bool {
        self.tracked().contains(path)
    }
}

/// The SCM in use at `root`.
pub fn detect(root: &Path) -> Box<dyn Scm> {
    if root.join(".git").exists() {
        Box::new(GitScm::new(root))
    } else {
        Box::new(NoScm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_scm_tracks_nothing() {
        assert!(!NoScm.is_tracked(Path::new("/r/a")));
        assert!(!NoScm.belongs_to_scm(Path::new("/r/.git/HEAD")));
    }

    #[test]
    fn git_metadata_is_recognized() {
        let scm = GitScm::new("/r");
        assert!(scm.belongs_to_scm(Path::new("/r/.git/HEAD")));
        assert!(scm.belongs_to_scm(Path::new("/r/sub/.git/config")));
        assert!(!scm.belongs_to_scm(Path::new("/r/.gitignore")));
        assert!(!scm.belongs_to_scm(Path::new("/elsewhere/.git/HEAD")));
    }

    #[test]
    fn detect_looks_for_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        let scm = detect(dir.path());
        assert!(!scm.is_tracked(&dir.path().join("x")));

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let scm = detect(dir.path());
        assert!(scm.belongs_to_scm(&dir.path().join(".git/HEAD")));
    }
}
