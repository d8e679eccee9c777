use std::collections::HashMap;
use std::sync::Arc;

use lode_hash::HashEngine;
use lode_types::Scheme;
use tracing::debug;

use crate::backend::RemoteBackend;
use crate::config::RemoteConfig;
use crate::credentials::CredentialCache;
use crate::error::{RemoteError, RemoteResult};
use crate::local::LocalRemote;

/// Shared services handed to every backend constructor.
#[derive(Clone, Debug)]
pub struct BackendContext {
    pub engine: Arc<HashEngine>,
    pub credentials: Arc<CredentialCache>,
}

/// Builds a backend for one configured remote.
pub type BackendFactory =
    Arc<dyn Fn(&RemoteConfig, &BackendContext) -> RemoteResult<Box<dyn RemoteBackend>> + Send + Sync>;

/// Maps scheme identifiers to backend constructors.
#[derive(Clone, Default)]
pub struct RemoteRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl RemoteRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `local`/`file` backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let local: BackendFactory = Arc::new(
            |config: &RemoteConfig, ctx: &BackendContext| -> RemoteResult<Box<dyn RemoteBackend>> {
                let backend = LocalRemote::open(config.location()?, Arc::clone(&ctx.engine))?;
                Ok(Box::new(backend))
            },
        );
        registry.register("local", Arc::clone(&local));
        registry.register("file", local);
        registry
    }

    /// Register (or replace) the constructor for `scheme`.
    pub fn register(&mut self, scheme: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(scheme.into(), factory);
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Construct the backend for `config` based on its URL scheme.
    pub fn resolve(
        &self,
        config: &RemoteConfig,
        ctx: &BackendContext,
    ) -> RemoteResult<Box<dyn RemoteBackend>> {
        let location = config.location()?;
        let scheme = match location.scheme() {
            Scheme::Local => "local",
            Scheme::Remote(s) => s.as_str(),
        };
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| RemoteError::UnknownScheme(scheme.to_string()))?;
        debug!(scheme, url = %config.url, "resolving remote backend");
        factory(config, ctx)
    }
}

impl std::fmt::Debug for RemoteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
