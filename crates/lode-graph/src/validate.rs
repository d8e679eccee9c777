//! Output conflict detection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lode_stage::Stage;
use lode_types::PathInfo;
use tracing::debug;

use crate::error::{GraphError, GraphResult};

/// Owner of one output in the combined graph.
#[derive(Clone, Copy, Debug)]
struct Owner {
    stage: usize,
    is_new: bool,
}

/// Checks proposed stages against the recorded graph.
///
/// A proposed stage replaces any recorded stage with the same manifest
/// path. Conflicts are only reported when at least one side is a proposed
/// stage; pre-existing conflicts between recorded stages are left alone.
#[derive(Clone, Debug)]
pub struct GraphValidator {
    root: PathBuf,
}

/// Every owner of one output path.
#[derive(Debug)]
struct Slot<'a> {
    path: &'a PathInfo,
    owners: Vec<Owner>,
}

impl Slot<'_> {
    fn has_new(&self) -> bool {
        self.owners.iter().any(|o| o.is_new)
    }
}

impl GraphValidator {
    /// `root` is used to print workspace-relative paths in messages.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn check(&self, existing: &[Stage], new: &[Stage]) -> GraphResult<()> {
        let mut combined: Vec<(&Stage, bool)> = existing
            .iter()
            .filter(|old| new.iter().all(|n| n.path() != old.path()))
            .map(|s| (s, false))
            .collect();
        combined.extend(new.iter().map(|s| (s, true)));

        let mut outputs: BTreeMap<String, Slot<'_>> = BTreeMap::new();
        for (idx, (stage, is_new)) in combined.iter().enumerate() {
            for out in &stage.outs {
                outputs
                    .entry(out.path.to_string())
                    .or_insert_with(|| Slot {
                        path: &out.path,
                        owners: Vec::new(),
                    })
                    .owners
                    .push(Owner {
                        stage: idx,
                        is_new: *is_new,
                    });
            }
        }

        self.check_duplicates(&combined, &outputs)?;
        self.check_overlaps(&combined, &outputs)?;
        debug!(existing = existing.len(), new = new.len(), "graph is consistent");
        Ok(())
    }

    fn check_duplicates(
        &self,
        combined: &[(&Stage, bool)],
        outputs: &BTreeMap<String, Slot<'_>>,
    ) -> GraphResult<()> {
        for slot in outputs.values() {
            if slot.owners.len() < 2 || !slot.has_new() {
                continue;
            }
            let stages = slot
                .owners
                .iter()
                .map(|o| self.display_stage(combined[o.stage].0))
                .collect();
            return Err(GraphError::Duplication {
                output: self.display_path(&slot.path.as_path()),
                stages,
            });
        }
        Ok(())
    }

    /// Reports the first output nested below an output of another stage,
    /// where at least one of the two stages is proposed.
    fn check_overlaps(
        &self,
        combined: &[(&Stage, bool)],
        outputs: &BTreeMap<String, Slot<'_>>,
    ) -> GraphResult<()> {
        for (key, parent) in outputs {
            let (lower, upper) = descendant_range(key);
            let nested = outputs
                .range(lower..upper)
                .map(|(_, slot)| slot)
                .filter(|slot| parent.path.is_ancestor_of(slot.path));
            for child in nested {
                if !(parent.has_new() || child.has_new()) {
                    continue;
                }
                let owner = parent.owners.iter().find(|p| {
                    child
                        .owners
                        .iter()
                        .any(|c| c.stage != p.stage && (c.is_new || p.is_new))
                });
                if let Some(owner) = owner {
                    return Err(GraphError::Overlap {
                        out: self.display_path(&child.path.as_path()),
                        parent: self.display_path(&parent.path.as_path()),
                        parent_stage: self.display_stage(combined[owner.stage].0),
                    });
                }
            }
        }
        Ok(())
    }

    fn display_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn display_stage(&self, stage: &Stage) -> String {
        stage.relpath(&self.root)
    }
}

/// Key bounds covering every path strictly below `path`.
fn descendant_range(path: &str) -> (String, String) {
    let mut lower = path.to_string();
    if !lower.ends_with('/') {
        lower.push('/');
    }
    let mut upper = lower.clone();
    upper.pop();
    // '0' sorts immediately after '/'.
    upper.push('0');
    (lower, upper)
}
