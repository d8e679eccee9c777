use std::fmt;
use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::error::TypeError;

/// Where a location lives: the local filesystem or a named remote scheme.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    Local,
    /// A remote scheme identifier such as `ssh`, `s3` or `gs`.
    Remote(String),
}

impl Scheme {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local => "local",
            Self::Remote(s) => s,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable location value.
///
/// Local paths are lexically normalized and always use `/` as separator so
/// that equality and prefix containment are plain string relations. Two
/// locations can only contain one another when scheme, host, user and port
/// all agree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathInfo {
    scheme: Scheme,
    host: Option<String>,
    user: Option<String>,
    port: Option<u16>,
    path: String,
}

impl PathInfo {
    /// A local filesystem location.
    pub fn local(path: impl AsRef<Path>) -> Self {
        let normalized = normalize(path.as_ref());
        Self {
            scheme: Scheme::Local,
            host: None,
            user: None,
            port: None,
            path: to_slash(&normalized),
        }
    }

    /// Parse a user-supplied location: either a URL (`ssh://user@host:22/p`)
    /// or a plain local path. `file://` URLs map to local paths.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if !s.contains("://") {
            return Ok(Self::local(s));
        }
        let url = Url::parse(s).map_err(|e| TypeError::InvalidUrl {
            url: s.to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() == "file" {
            return Ok(Self::local(url.path()));
        }
        let user = match url.username() {
            "" => None,
            u => Some(u.to_string()),
        };
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        Ok(Self {
            scheme: Scheme::Remote(url.scheme().to_string()),
            host: url.host_str().map(str::to_string),
            user,
            port: url.port(),
            path,
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_local(&self) -> bool {
        self.scheme == Scheme::Local
    }

    /// The location as a native path. Only meaningful for local locations.
    pub fn as_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.path.trim_end_matches('/');
        let idx = trimmed.rfind('/')?;
        let parent = if idx == 0 { "/" } else { &trimmed[..idx] };
        Some(self.with_path(parent.to_string()))
    }

    /// Append a relative `/`-separated path.
    pub fn join(&self, rel: &str) -> Self {
        if self.is_local() {
            return Self::local(Path::new(&self.path).join(rel));
        }
        let base = self.path.trim_end_matches('/');
        self.with_path(format!("{base}/{}", rel.trim_start_matches('/')))
    }

    /// Returns `true` if both locations share scheme, host, user and port.
    pub fn same_location(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && self.user == other.user
            && self.port == other.port
    }

    /// Returns `true` if `self` is a strict ancestor directory of `other`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        if !self.same_location(other) || other.path.len() <= self.path.len() {
            return false;
        }
        if !other.path.starts_with(&self.path) {
            return false;
        }
        self.path.ends_with('/') || other.path.as_bytes()[self.path.len()] == b'/'
    }

    fn with_path(&self, path: String) -> Self {
        Self {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            user: self.user.clone(),
            port: self.port,
            path,
        }
    }
}

impl fmt::Display for PathInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            return f.write_str(&self.path);
        }
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        if let Some(host) = &self.host {
            f.write_str(host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&self.path)
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into
/// their parent without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = out.has_root() && out.parent().is_none();
                if at_root {
                    continue;
                }
                if out.as_os_str().is_empty() || out.ends_with("..") {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

fn to_slash(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
