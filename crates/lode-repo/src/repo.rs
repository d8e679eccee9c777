use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lode_cache::CacheStore;
use lode_graph::StageGraph;
use lode_hash::{HashEngine, IgnoreFilter};
use lode_remote::{BackendContext, CredentialCache, Prompter, RemoteBackend, RemoteRegistry};
use lode_stage::{is_manifest, ImportSource, Stage, StageContext};
use lode_types::{normalize, PathInfo};
use tracing::{debug, info};

use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};
use crate::lock::RepoLock;
use crate::paths;
use crate::progress::{NoProgress, Progress};
use crate::scm::{self, Scm};

/// Name of the bookkeeping directory at the repository root.
pub const LODE_DIR: &str = ".lode";
pub const CONFIG_FILE: &str = "config.toml";
pub const LOCK_FILE: &str = "lock";

/// An open lode repository.
pub struct Repo {
    pub(crate) root: PathBuf,
    pub(crate) config: RepoConfig,
    pub(crate) ctx: StageContext,
    pub(crate) graph: StageGraph,
    pub(crate) scm: Box<dyn Scm>,
    pub(crate) progress: Arc<dyn Progress>,
    remotes: RemoteRegistry,
    credentials: Arc<CredentialCache>,
    wait_for_lock: bool,
}

impl Repo {
    /// Create `.lode/` with a default config under `root` and open it.
    pub fn init(root: impl AsRef<Path>) -> RepoResult<Self> {
        let root = root.as_ref();
        let dir = root.join(LODE_DIR);
        if dir.exists() {
            return Err(RepoError::AlreadyInitialized(root.to_path_buf()));
        }
        fs::create_dir_all(&dir).map_err(|e| RepoError::io(&dir, e))?;
        let config = RepoConfig::default();
        config.save(&dir.join(CONFIG_FILE))?;
        let cache = config.cache_dir(root);
        fs::create_dir_all(&cache).map_err(|e| RepoError::io(&cache, e))?;
        info!(root = %root.display(), "initialized lode repository");
        Self::open_at(root)
    }

    /// Open the repository containing `path`, searching upwards.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let start = normalize(path.as_ref());
        let root = start
            .ancestors()
            .find(|p| p.join(LODE_DIR).is_dir())
            .ok_or_else(|| RepoError::NotARepo(start.clone()))?;
        Self::open_at(root)
    }

    fn open_at(root: &Path) -> RepoResult<Self> {
        let root = normalize(root);
        let config = RepoConfig::load(&root.join(LODE_DIR).join(CONFIG_FILE))?;
        let engine = HashEngine::new(config.core.hash)
            .with_jobs(config.jobs())
            .with_filter(IgnoreFilter::load(&root)?);
        let cache = CacheStore::open(config.cache_dir(&root))?
            .with_link_types(config.cache.link_types.clone());
        let ctx = StageContext::new(Arc::new(engine), Arc::new(cache));
        debug!(root = %root.display(), hash = %config.core.hash, "opened repository");
        Ok(Self {
            graph: StageGraph::new(&root),
            scm: scm::detect(&root),
            progress: Arc::new(NoProgress),
            remotes: RemoteRegistry::with_builtin(),
            credentials: Arc::new(CredentialCache::default()),
            wait_for_lock: false,
            root,
            config,
            ctx,
        })
    }

    pub fn with_source(mut self, source: Arc<dyn ImportSource>) -> Self {
        self.ctx = self.ctx.with_source(source);
        self
    }

    pub fn with_scm(mut self, scm: Box<dyn Scm>) -> Self {
        self.scm = scm;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.credentials = Arc::new(CredentialCache::new(prompter));
        self
    }

    pub fn with_registry(mut self, remotes: RemoteRegistry) -> Self {
        self.remotes = remotes;
        self
    }

    /// Wait for a concurrent writer to finish instead of failing with
    /// [`RepoError::Locked`].
    pub fn with_lock_wait(mut self, wait: bool) -> Self {
        self.wait_for_lock = wait;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// All recorded stages, freshly read from disk.
    pub fn stages(&mut self) -> RepoResult<Vec<Stage>> {
        Ok(self.graph.refresh()?.to_vec())
    }

    /// Take the repository lock. Fails with [`RepoError::Locked`] while
    /// another writer holds it, unless waiting was enabled with
    /// [`Repo::with_lock_wait`].
    pub fn lock(&self) -> RepoResult<RepoLock> {
        let path = self.root.join(LODE_DIR).join(LOCK_FILE);
        if self.wait_for_lock {
            RepoLock::acquire(&path)
        } else {
            RepoLock::try_acquire(&path)
        }
    }

    /// Backend for the remote called `name` (or the default remote).
    pub fn remote(&self, name: Option<&str>) -> RepoResult<Box<dyn RemoteBackend>> {
        let config = self.config.remote(name)?;
        let ctx = BackendContext {
            engine: Arc::clone(&self.ctx.engine),
            credentials: Arc::clone(&self.credentials),
        };
        Ok(self.remotes.resolve(config, &ctx)?)
    }

    /// Stages named by `targets`: manifest paths or tracked output paths.
    /// No targets means every stage.
    pub fn collect(&mut self, targets: &[PathBuf]) -> RepoResult<Vec<Stage>> {
        if targets.is_empty() {
            return self.stages();
        }
        self.graph.invalidate();
        let mut stages: Vec<Stage> = Vec::new();
        for target in targets {
            let path = paths::absolute(&self.root, target);
            let found = if is_manifest(&path) {
                self.graph.find(&path)?
            } else {
                self.graph.find_by_output(&PathInfo::local(&path))?
            };
            let stage =
                found.ok_or_else(|| RepoError::StageNotFound(target.display().to_string()))?;
            if !stages.iter().any(|s| s.path() == stage.path()) {
                stages.push(stage);
            }
        }
        Ok(stages)
    }
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("remotes", &self.remotes)
            .finish()
    }
}
