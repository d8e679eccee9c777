use std::path::PathBuf;
use std::time::Duration;

use lode_types::PathInfo;
use serde::{Deserialize, Serialize};

use crate::credentials::{CredentialCache, CredentialKey};
use crate::error::{RemoteError, RemoteResult};

/// Per-remote settings from `[remote.<name>]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    /// Overrides the user embedded in `url`.
    pub user: Option<String>,
    /// Overrides the port embedded in `url`.
    pub port: Option<u16>,
    pub password: Option<String>,
    /// Prompt for a password when none is configured.
    pub ask_password: bool,
    pub keyfile: Option<PathBuf>,
    /// Connection timeout in seconds.
    pub timeout: Option<u64>,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// The remote root parsed from `url`.
    pub fn location(&self) -> RemoteResult<PathInfo> {
        if self.url.trim().is_empty() {
            return Err(RemoteError::Config("remote url is empty".into()));
        }
        Ok(PathInfo::parse(&self.url)?)
    }

    pub fn effective_user(&self, location: &PathInfo) -> Option<String> {
        self.user
            .clone()
            .or_else(|| location.user().map(str::to_string))
    }

    pub fn effective_port(&self, location: &PathInfo) -> Option<u16> {
        self.port.or(location.port())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Key under which a prompted password is memoized.
    pub fn credential_key(&self, location: &PathInfo) -> CredentialKey {
        CredentialKey {
            host: location.host().unwrap_or_default().to_string(),
            user: self.effective_user(location),
            port: self.effective_port(location),
        }
    }

    /// The password to connect with: the configured one, a prompted one
    /// when `ask_password` is set, or none.
    pub fn resolve_password(
        &self,
        location: &PathInfo,
        credentials: &CredentialCache,
    ) -> RemoteResult<Option<String>> {
        if let Some(password) = &self.password {
            return Ok(Some(password.clone()));
        }
        if !self.ask_password {
            return Ok(None);
        }
        credentials
            .password(&self.credential_key(location))
            .map(Some)
    }
}
