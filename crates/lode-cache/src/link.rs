use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// How cached content is materialized into the workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Copy-on-write clone. Only supported by some filesystems.
    Reflink,
    Hardlink,
    Symlink,
    Copy,
}

/// Strategy order used when none is configured.
pub const DEFAULT_LINK_TYPES: [LinkType; 2] = [LinkType::Reflink, LinkType::Copy];

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reflink => "reflink",
            Self::Hardlink => "hardlink",
            Self::Symlink => "symlink",
            Self::Copy => "copy",
        }
    }

    /// Returns `true` if the workspace file is independent of the cache
    /// entry once linked.
    pub fn is_copy(&self) -> bool {
        matches!(self, Self::Reflink | Self::Copy)
    }

    /// Create `dst` from `src`. `dst` must not exist.
    pub fn link(&self, src: &Path, dst: &Path) -> io::Result<()> {
        match self {
            Self::Reflink => reflink_copy::reflink(src, dst)?,
            Self::Hardlink => fs::hard_link(src, dst)?,
            Self::Symlink => symlink(src, dst)?,
            Self::Copy => {
                fs::copy(src, dst)?;
            }
        }
        if self.is_copy() {
            // Cache entries are read-only; the workspace copy must not be.
            let mut perms = fs::metadata(dst)?.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(dst, perms)?;
        }
        Ok(())
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reflink" => Ok(Self::Reflink),
            "hardlink" => Ok(Self::Hardlink),
            "symlink" => Ok(Self::Symlink),
            "copy" => Ok(Self::Copy),
            other => Err(CacheError::UnknownLinkType(other.to_string())),
        }
    }
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

/// Materialize `src` at `dst` with the first strategy in `types` that works.
///
/// Each attempt links into a scratch directory next to `dst` and is renamed
/// over `dst` only on success, so an existing workspace file survives every
/// failed attempt. Returns [`CacheError::LinkFailed`] with one reason per
/// strategy when none succeeds.
pub fn materialize(src: &Path, dst: &Path, types: &[LinkType]) -> CacheResult<LinkType> {
    let parent = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;

    let mut reasons = Vec::new();
    for link_type in types {
        let scratch = tempfile::Builder::new()
            .prefix(".lode-link-")
            .tempdir_in(parent)
            .map_err(|e| CacheError::io(parent, e))?;
        let staged = scratch.path().join("entry");
        if let Err(e) = link_type.link(src, &staged) {
            debug!(path = %dst.display(), %link_type, error = %e, "link strategy failed");
            reasons.push(format!("{link_type}: {e}"));
            continue;
        }
        let replaced_dir = fs::symlink_metadata(dst).is_ok_and(|m| m.is_dir());
        if replaced_dir {
            fs::remove_dir_all(dst).map_err(|e| CacheError::io(dst, e))?;
        }
        fs::rename(&staged, dst).map_err(|e| CacheError::io(dst, e))?;
        return Ok(*link_type);
    }

    if types.is_empty() {
        reasons.push("no link types configured".to_string());
    }
    Err(CacheError::LinkFailed {
        path: dst.to_path_buf(),
        reasons,
    })
}
