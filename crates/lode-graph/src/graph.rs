//! The live view of all recorded stages.

use std::path::{Path, PathBuf};

use lode_stage::{manifest, Stage};
use lode_types::PathInfo;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{GraphError, GraphResult};

/// Directories never scanned for manifests.
const SKIPPED_DIRS: [&str; 3] = [".git", ".hg", ".lode"];

/// Every stage recorded under a workspace root.
///
/// The view is built lazily from the manifests on disk and cached until
/// [`invalidate`](StageGraph::invalidate) is called, which every mutating
/// operation must do so later checks see the new state.
#[derive(Debug)]
pub struct StageGraph {
    root: PathBuf,
    stages: Option<Vec<Stage>>,
}

impl StageGraph {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stages: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop the cached view.
    pub fn invalidate(&mut self) {
        self.stages = None;
    }

    /// Rebuild the view from disk now.
    pub fn refresh(&mut self) -> GraphResult<&[Stage]> {
        self.invalidate();
        self.stages()
    }

    /// All stages, sorted by manifest path.
    pub fn stages(&mut self) -> GraphResult<&[Stage]> {
        if self.stages.is_none() {
            self.stages = Some(collect_stages(&self.root)?);
        }
        Ok(self.stages.as_deref().unwrap_or_default())
    }

    /// The stage recorded at `manifest_path`.
    pub fn find(&mut self, manifest_path: &Path) -> GraphResult<Option<Stage>> {
        let wanted = lode_types::normalize(manifest_path);
        Ok(self.stages()?.iter().find(|s| s.path() == wanted).cloned())
    }

    /// The stage whose output is exactly `path`.
    pub fn find_by_output(&mut self, path: &PathInfo) -> GraphResult<Option<Stage>> {
        Ok(self
            .stages()?
            .iter()
            .find(|s| s.outs.iter().any(|o| &o.path == path))
            .cloned())
    }
}

fn collect_stages(root: &Path) -> GraphResult<Vec<Stage>> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && e.file_name().to_str().is_some_and(|n| SKIPPED_DIRS.contains(&n)))
        });

    let mut stages = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| GraphError::Walk(e.to_string()))?;
        if entry.file_type().is_file() && manifest::is_manifest(entry.path()) {
            stages.push(manifest::load(entry.path())?);
        }
    }
    stages.sort_by(|a, b| a.path().cmp(b.path()));
    debug!(root = %root.display(), count = stages.len(), "loaded stage graph");
    Ok(stages)
}
