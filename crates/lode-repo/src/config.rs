//! Repository configuration (`.lode/config.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use lode_cache::{LinkType, DEFAULT_LINK_TYPES};
use lode_remote::RemoteConfig;
use lode_types::HashName;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Default file count above which a recursive add warns.
pub const DEFAULT_LARGE_DIR_THRESHOLD: usize = 100;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub core: CoreConfig,
    pub cache: CacheConfig,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub remote: BTreeMap<String, RemoteConfig>,
}

/// `[core]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub hash: HashName,
    /// Worker count; defaults to the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    pub large_dir_threshold: usize,
    /// Remote used when none is named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            hash: HashName::default(),
            jobs: None,
            large_dir_threshold: DEFAULT_LARGE_DIR_THRESHOLD,
            remote: None,
        }
    }
}

/// `[cache]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Link strategies in order of preference.
    #[serde(rename = "type")]
    pub link_types: Vec<LinkType>,
    /// Cache location, relative paths are taken from the repository root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            link_types: DEFAULT_LINK_TYPES.to_vec(),
            dir: None,
        }
    }
}

impl RepoConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> RepoResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(RepoError::io(path, e)),
        };
        toml::from_str(&text).map_err(|e| RepoError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> RepoResult<()> {
        let text = toml::to_string_pretty(self).map_err(|e| RepoError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, text).map_err(|e| RepoError::io(path, e))
    }

    pub fn jobs(&self) -> usize {
        self.core.jobs.filter(|j| *j > 0).unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        })
    }

    /// Cache directory for a repository rooted at `root`.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        match &self.cache.dir {
            Some(dir) => root.join(dir),
            None => root.join(crate::repo::LODE_DIR).join("cache"),
        }
    }

    /// The remote called `name`, or the default remote.
    pub fn remote(&self, name: Option<&str>) -> RepoResult<&RemoteConfig> {
        let name = name.or(self.core.remote.as_deref()).ok_or_else(|| {
            RepoError::InvalidArgument(
                "no remote specified and no default remote is set in core.remote".into(),
            )
        })?;
        self.remote.get(name).ok_or_else(|| {
            lode_remote::RemoteError::NotConfigured {
                name: name.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepoConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, RepoConfig::default());
        assert_eq!(config.core.hash, HashName::Md5);
        assert_eq!(config.core.large_dir_threshold, 100);
        assert_eq!(config.cache.link_types, vec![LinkType::Reflink, LinkType::Copy]);
    }

    #[test]
    fn parses_all_sections() {
        let text = r#"
[core]
hash = "blake3"
jobs = 3
large_dir_threshold = 10
remote = "store"

[cache]
type = ["hardlink", "symlink"]
dir = "/var/cache/lode"

[remote.store]
url = "/mnt/store"
timeout = 30
"#;
        let config: RepoConfig = toml::from_str(text).unwrap();
        assert_eq!(config.core.hash, HashName::Blake3);
        assert_eq!(config.jobs(), 3);
        assert_eq!(config.cache.link_types, vec![LinkType::Hardlink, LinkType::Symlink]);
        assert_eq!(config.cache_dir(Path::new("/repo")), PathBuf::from("/var/cache/lode"));
        let remote = config.remote(None).unwrap();
        assert_eq!(remote.url, "/mnt/store");
        assert_eq!(remote.timeout, Some(30));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = RepoConfig::default();
        config.core.jobs = Some(2);
        config
            .remote
            .insert("backup".into(), RemoteConfig::new("/backup"));
        config.save(&path).unwrap();
        assert_eq!(RepoConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn unknown_remote_is_reported() {
        let config = RepoConfig::default();
        assert!(matches!(
            config.remote(None),
            Err(RepoError::InvalidArgument(_))
        ));
        assert!(matches!(
            config.remote(Some("nope")),
            Err(RepoError::Remote(lode_remote::RemoteError::NotConfigured { .. }))
        ));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[core\nhash = 1").unwrap();
        assert!(matches!(RepoConfig::load(&path), Err(RepoError::Config { .. })));
    }
}
