use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{RemoteError, RemoteResult};

/// Identity a remote password belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// Asks the user for a password.
pub trait Prompter: Send + Sync {
    fn prompt_password(&self, key: &CredentialKey) -> RemoteResult<String>;
}

/// Prompter for non-interactive use: always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompter;

impl Prompter for NoPrompter {
    fn prompt_password(&self, key: &CredentialKey) -> RemoteResult<String> {
        Err(RemoteError::Credentials(format!(
            "a password is required for {key} but prompting is disabled"
        )))
    }
}

/// Process-wide memo of prompted passwords.
///
/// The lock is held across the prompt itself, so concurrent callers asking
/// for the same key wait for the first answer instead of prompting again.
pub struct CredentialCache {
    prompter: Box<dyn Prompter>,
    passwords: Mutex<HashMap<CredentialKey, String>>,
}

impl CredentialCache {
    pub fn new(prompter: Box<dyn Prompter>) -> Self {
        Self {
            prompter,
            passwords: Mutex::new(HashMap::new()),
        }
    }

    pub fn password(&self, key: &CredentialKey) -> RemoteResult<String> {
        let mut passwords = self
            .passwords
            .lock()
            .map_err(|_| RemoteError::Credentials("credential cache lock poisoned".into()))?;
        if let Some(password) = passwords.get(key) {
            return Ok(password.clone());
        }
        debug!(%key, "prompting for password");
        let password = self.prompter.prompt_password(key)?;
        passwords.insert(key.clone(), password.clone());
        Ok(password)
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(Box::new(NoPrompter))
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.passwords.lock().map(|p| p.len()).unwrap_or(0);
        f.debug_struct("CredentialCache")
            .field("cached", &cached)
            .finish()
    }
}
