use std::path::Path;

use lode_types::{HashInfo, PathInfo};

use crate::error::RemoteResult;

/// Content-addressed remote storage.
///
/// All transports are used through this contract:
/// - `store` uploads a local file or directory and returns its hash.
/// - `fetch` downloads the content for a hash to a local path.
/// - `exists` answers without transferring content.
///
/// Implementations must be safe to share between worker threads.
pub trait RemoteBackend: Send + Sync {
    /// Scheme identifier this backend serves (`local`, `ssh`, ...).
    fn scheme(&self) -> &str;

    /// Root location of the remote.
    fn location(&self) -> &PathInfo;

    fn store(&self, local: &Path) -> RemoteResult<HashInfo>;

    fn fetch(&self, hash: &HashInfo, dest: &Path) -> RemoteResult<()>;

    fn exists(&self, hash: &HashInfo) -> RemoteResult<bool>;
}
