//! `add`: start tracking workspace paths.
//!
//! An invocation runs in two phases. First every target is expanded into
//! candidate stages and the whole batch is validated against the recorded
//! graph, so a conflict anywhere aborts before anything is written. Then
//! each stage is saved, committed and dumped in turn. A stage whose
//! content reached the cache but could not be linked back is remembered
//! and reported once at the end; any other failure stops the batch, and
//! stages finished before it stay recorded.

use std::path::{Path, PathBuf};

use lode_graph::GraphValidator;
use lode_stage::{manifest, Output, Stage, StageError};
use lode_types::PathInfo;
use tracing::{debug, info, warn};

use crate::error::{RepoError, RepoResult};
use crate::paths;
use crate::repo::Repo;
use crate::walk::walk_untracked;

/// Options for [`Repo::add`].
#[derive(Clone, Debug, Default)]
pub struct AddOptions {
    /// Track every file under directory targets as its own stage.
    pub recursive: bool,
    /// Record hashes without copying content into the cache.
    pub no_commit: bool,
    /// Manifest file name instead of `<output>.lode`.
    pub fname: Option<String>,
    /// Expand glob patterns in targets.
    pub glob: bool,
    /// Transfer the target straight to a remote instead of the cache.
    pub to_remote: bool,
    /// Output path for `to_remote`.
    pub out: Option<String>,
    /// Remote name for `to_remote`.
    pub remote: Option<String>,
    /// Description stored on each new output.
    pub desc: Option<String>,
}

impl AddOptions {
    /// Reject invalid combinations before any I/O.
    pub fn validate(&self, targets: &[String]) -> RepoResult<()> {
        if self.fname.is_some() && (self.recursive || targets.len() > 1) {
            return Err(RepoError::RecursiveAddingWhileUsingFilename);
        }
        if self.to_remote {
            let invalid = if targets.len() != 1 {
                Some("multiple targets")
            } else if self.no_commit {
                Some("--no-commit")
            } else if self.recursive {
                Some("--recursive")
            } else {
                None
            };
            if let Some(option) = invalid {
                return Err(RepoError::InvalidArgument(format!(
                    "{option} can't be used with --to-remote"
                )));
            }
        } else {
            let invalid = if self.out.is_some() {
                Some("--out")
            } else if self.remote.is_some() {
                Some("--remote")
            } else {
                None
            };
            if let Some(option) = invalid {
                return Err(RepoError::InvalidArgument(format!(
                    "{option} can't be used without --to-remote"
                )));
            }
        }
        Ok(())
    }
}

/// What an `add` produced.
#[derive(Clone, Debug, Default)]
pub struct AddResult {
    /// Every stage that was recorded, including ones with link failures.
    pub stages: Vec<Stage>,
    /// Manifest paths of stages whose outputs could not be linked back
    /// from the cache.
    pub link_failures: Vec<PathBuf>,
}

impl Repo {
    /// Track `targets`.
    pub fn add(&mut self, targets: &[String], opts: &AddOptions) -> RepoResult<AddResult> {
        opts.validate(targets)?;
        let _lock = self.lock()?;
        if opts.to_remote {
            return self.add_to_remote(&targets[0], opts);
        }

        let targets = paths::expand_globs(&self.root, targets, opts.glob)?;
        self.progress.add_total(targets.len() as isize);

        let mut planned: Vec<Stage> = Vec::new();
        for target in &targets {
            let sub_targets = self.expand_target(target, opts)?;
            self.progress.add_total(sub_targets.len() as isize - 1);
            let stages = self.create_stages(&sub_targets, opts)?;

            let mut batch = planned.clone();
            batch.extend(stages.iter().cloned());
            let existing = self.graph.refresh()?;
            GraphValidator::new(&self.root).check(existing, &batch)?;
            planned = batch;
        }

        let mut result = AddResult::default();
        for stage in planned {
            self.progress.update(&stage.relpath(&self.root));
            match self.process_stage(stage, opts) {
                Ok((stage, linked)) => {
                    if !linked {
                        result.link_failures.push(stage.path().to_path_buf());
                    }
                    result.stages.push(stage);
                }
                Err(e) => {
                    if matches!(e, RepoError::Stage(StageError::OutputDoesNotExist(_))) {
                        self.progress.add_total(-1);
                    }
                    self.progress.finish();
                    return Err(e);
                }
            }
        }
        self.progress.finish();

        if !result.link_failures.is_empty() {
            warn!("{}", self.link_failure_message(&result.link_failures));
        }
        info!(count = result.stages.len(), "added stages");
        Ok(result)
    }

    /// Sub-targets of one target: every untracked file when adding a
    /// directory recursively, the target itself otherwise.
    fn expand_target(&self, target: &Path, opts: &AddOptions) -> RepoResult<Vec<PathBuf>> {
        if !(opts.recursive && target.is_dir()) {
            return Ok(vec![target.to_path_buf()]);
        }
        let files: Vec<PathBuf> = walk_untracked(target, self.scm.as_ref(), self.ctx.engine.filter())
            .collect::<RepoResult<_>>()?;
        if files.len() > self.config.core.large_dir_threshold {
            let rel = manifest::relative_path(target, &self.root);
            warn!(
                "You are adding a large directory '{rel}' recursively. \
                 Consider tracking it as a whole instead with `lode add {rel}`."
            );
        }
        Ok(files)
    }

    /// Candidate stages for `sub_targets`, leaving out those already
    /// recorded unchanged.
    fn create_stages(&self, sub_targets: &[PathBuf], opts: &AddOptions) -> RepoResult<Vec<Stage>> {
        let mut stages = Vec::with_capacity(sub_targets.len());
        for path in sub_targets {
            let resolved = paths::resolve(&self.root, path, opts.fname.as_deref())?;
            let stage = self.new_stage(resolved, opts);
            if stage.can_be_skipped(&self.ctx)? {
                debug!(stage = %stage.path().display(), "unchanged, skipping");
                self.progress.add_total(-1);
                continue;
            }
            stages.push(stage);
        }
        Ok(stages)
    }

    fn new_stage(&self, resolved: paths::Resolved, opts: &AddOptions) -> Stage {
        let mut stage = Stage::new(resolved.manifest, resolved.wdir);
        let mut out = Output::new(resolved.out, self.config.core.hash);
        out.desc = opts.desc.clone();
        stage.outs.push(out);
        stage
    }

    /// Save, commit and dump one stage. The flag is `false` when content
    /// was committed but could not be linked back.
    fn process_stage(&mut self, mut stage: Stage, opts: &AddOptions) -> RepoResult<(Stage, bool)> {
        manifest::remove(stage.path())?;
        stage.save(&self.ctx)?;

        let mut linked = true;
        if !opts.no_commit {
            match stage.commit(&self.ctx) {
                Ok(()) => {}
                Err(e) if e.is_link_failure() => {
                    debug!(stage = %stage.path().display(), error = %e, "link failure");
                    linked = false;
                }
                Err(e) => return Err(e.into()),
            }
        }

        manifest::dump(&stage)?;
        self.graph.invalidate();
        Ok((stage, linked))
    }

    /// Hash `target` and transfer it directly to a remote; the local cache
    /// is never touched.
    fn add_to_remote(&mut self, target: &str, opts: &AddOptions) -> RepoResult<AddResult> {
        let source = PathInfo::parse(target)?;
        if !source.is_local() {
            return Err(RepoError::InvalidArgument(format!(
                "'{target}' is not a local path; only local sources can be transferred with --to-remote"
            )));
        }
        let source_path = paths::absolute(&self.root, &source.as_path());
        let out = opts
            .out
            .clone()
            .unwrap_or_else(|| source.name().to_string());
        let resolved = paths::resolve(&self.root, Path::new(&out), opts.fname.as_deref())?;
        let mut stage = self.new_stage(resolved, opts);

        let existing = self.graph.refresh()?;
        GraphValidator::new(&self.root).check(existing, std::slice::from_ref(&stage))?;

        let backend = self.remote(opts.remote.as_deref())?;
        self.progress.add_total(1);
        self.progress.update(&stage.relpath(&self.root));
        stage.outs[0].hash = backend.store(&source_path)?;
        self.progress.finish();
        info!(
            "Transferred '{}' to remote '{}' as '{}'",
            source_path.display(),
            backend.location(),
            stage.outs[0]
        );

        manifest::dump(&stage)?;
        self.graph.invalidate();
        Ok(AddResult {
            stages: vec![stage],
            link_failures: Vec::new(),
        })
    }

    fn link_failure_message(&self, failures: &[PathBuf]) -> String {
        let stages: Vec<String> = failures
            .iter()
            .map(|p| manifest::relative_path(p, &self.root))
            .collect();
        let reasons: Vec<String> = stages.iter().map(|s| format!("\t{s}")).collect();
        format!(
            "Some targets could not be linked from cache to workspace.\n{}\n\
             To re-link these targets, reconfigure cache types and then run:\n\n\
             \tlode checkout {}",
            reasons.join("\n"),
            stages.join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Progress;
    use lode_graph::GraphError;
    use std::fs;
    use std::sync::atomic::{AtomicIsize, Ordering};
    use std::sync::Arc;

    fn repo(dir: &Path) -> Repo {
        Repo::init(dir).unwrap()
    }

    fn targets(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn cache_entries(repo: &Repo) -> usize {
        walkdir::WalkDir::new(repo.context().cache.root())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && !e.path().starts_with(repo.context().cache.root().join("tmp")))
            .count()
    }

    // ---------------------------------------------------------------
    // Option validation
    // ---------------------------------------------------------------

    #[test]
    fn fname_with_recursive_is_rejected() {
        let opts = AddOptions {
            recursive: true,
            fname: Some("x.lode".into()),
            to_remote: true,
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(&targets(&["a"])),
            Err(RepoError::RecursiveAddingWhileUsingFilename)
        ));
    }

    #[test]
    fn to_remote_option_precedence() {
        let opts = AddOptions {
            to_remote: true,
            no_commit: true,
            recursive: true,
            ..Default::default()
        };
        let msg = opts.validate(&targets(&["a", "b"])).unwrap_err().to_string();
        assert_eq!(msg, "multiple targets can't be used with --to-remote");
        let msg = opts.validate(&targets(&["a"])).unwrap_err().to_string();
        assert_eq!(msg, "--no-commit can't be used with --to-remote");
    }

    #[test]
    fn remote_options_need_to_remote() {
        let opts = AddOptions {
            out: Some("o".into()),
            remote: Some("r".into()),
            ..Default::default()
        };
        let msg = opts.validate(&targets(&["a"])).unwrap_err().to_string();
        assert_eq!(msg, "--out can't be used without --to-remote");
        let opts = AddOptions {
            remote: Some("r".into()),
            ..Default::default()
        };
        let msg = opts.validate(&targets(&["a"])).unwrap_err().to_string();
        assert_eq!(msg, "--remote can't be used without --to-remote");
    }

    #[test]
    fn invalid_options_fail_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo(dir.path());
        let opts = AddOptions {
            out: Some("o".into()),
            ..Default::default()
        };
        assert!(repo.add(&targets(&["missing"]), &opts).is_err());
        assert!(!dir.path().join("missing.lode").exists());
    }

    // ---------------------------------------------------------------
    // Pipeline
    // ---------------------------------------------------------------

    #[test]
    fn recursive_add_creates_one_stage_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "data/a", "1");
        write(root, "data/b", "2");
        write(root, "data/sub/c", "3");
        let mut repo = repo(root);

        let opts = AddOptions {
            recursive: true,
            ..Default::default()
        };
        let result = repo.add(&targets(&["data"]), &opts).unwrap();

        assert_eq!(result.stages.len(), 3);
        assert!(result.link_failures.is_empty());
        for manifest in ["data/a.lode", "data/b.lode", "data/sub/c.lode"] {
            assert!(root.join(manifest).is_file(), "{manifest}");
        }
        assert_eq!(cache_entries(&repo), 3);
        assert_eq!(repo.stages().unwrap().len(), 3);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn large_directory_warns_and_adds_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "data/a", "1");
        write(root, "data/b", "2");
        write(root, "data/c", "3");
        let mut repo = repo(root);
        repo.config.core.large_dir_threshold = 1;

        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let opts = AddOptions {
            recursive: true,
            ..Default::default()
        };
        let result = tracing::subscriber::with_default(subscriber, || {
            repo.add(&targets(&["data"]), &opts)
        })
        .unwrap();

        assert_eq!(result.stages.len(), 3);
        assert_eq!(repo.stages().unwrap().len(), 3);
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("large directory 'data'"), "{output}");
        assert!(output.contains("lode add data"), "{output}");
    }

    #[test]
    fn small_directory_does_not_warn() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "data/a", "1");
        let mut repo = repo(root);

        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let opts = AddOptions {
            recursive: true,
            ..Default::default()
        };
        tracing::subscriber::with_default(subscriber, || repo.add(&targets(&["data"]), &opts))
            .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(!output.contains("large directory"), "{output}");
    }

    #[test]
    fn directory_add_tracks_it_as_a_whole() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "data/a", "1");
        write(root, "data/b", "2");
        let mut repo = repo(root);

        let result = repo.add(&targets(&["data"]), &AddOptions::default()).unwrap();
        assert_eq!(result.stages.len(), 1);
        assert!(result.stages[0].outs[0].hash.is_dir());
        // Two files plus the directory manifest.
        assert_eq!(cache_entries(&repo), 3);
    }

    #[test]
    fn adding_again_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a", "1");
        write(root, "b", "2");
        let mut repo = repo(root);

        let first = repo.add(&targets(&["a", "b"]), &AddOptions::default()).unwrap();
        assert_eq!(first.stages.len(), 2);
        let before = fs::read(root.join("a.lode")).unwrap();

        let second = repo.add(&targets(&["a", "b"]), &AddOptions::default()).unwrap();
        assert!(second.stages.is_empty());
        assert_eq!(fs::read(root.join("a.lode")).unwrap(), before);
    }

    #[test]
    fn changed_content_is_re_added() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a", "1");
        let mut repo = repo(root);
        let first = repo.add(&targets(&["a"]), &AddOptions::default()).unwrap();

        // The committed copy may be read-only when linked; replace it.
        fs::remove_file(root.join("a")).unwrap();
        write(root, "a", "2");
        let second = repo.add(&targets(&["a"]), &AddOptions::default()).unwrap();
        assert_eq!(second.stages.len(), 1);
        assert_ne!(second.stages[0].outs[0].hash, first.stages[0].outs[0].hash);
    }

    #[test]
    fn overlap_in_one_invocation_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "data/sub/file", "x");
        let mut repo = repo(root);

        let err = repo
            .add(&targets(&["data", "data/sub/file"]), &AddOptions::default())
            .unwrap_err();
        match err {
            RepoError::Graph(GraphError::Overlap { out, parent, .. }) => {
                assert_eq!(out, "data/sub/file");
                assert_eq!(parent, "data");
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(!root.join("data.lode").exists());
        assert!(!root.join("data/sub/file.lode").exists());
        assert_eq!(cache_entries(&repo), 0);
    }

    #[test]
    fn overlap_with_recorded_stage() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "data/sub/file", "x");
        let mut repo = repo(root);
        repo.add(&targets(&["data"]), &AddOptions::default()).unwrap();

        let err = repo
            .add(&targets(&["data/sub/file"]), &AddOptions::default())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'data/sub/file'"), "{msg}");
        assert!(msg.contains("lode commit data.lode"), "{msg}");
    }

    #[test]
    fn same_output_twice_is_a_duplication() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a", "1");
        let mut repo = repo(root);

        let err = repo
            .add(&targets(&["a", "./a"]), &AddOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Graph(GraphError::Duplication { ref output, .. }) if output == "a"
        ));
    }

    #[test]
    fn missing_target_fails_but_keeps_earlier_stages() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a", "1");
        let mut repo = repo(root);

        let err = repo
            .add(&targets(&["a", "nope"]), &AddOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Stage(StageError::OutputDoesNotExist(_))
        ));
        assert!(root.join("a.lode").is_file());
        assert!(!root.join("nope.lode").exists());
    }

    #[test]
    fn no_commit_records_hash_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a", "1");
        let mut repo = repo(root);
        let opts = AddOptions {
            no_commit: true,
            ..Default::default()
        };
        let result = repo.add(&targets(&["a"]), &opts).unwrap();
        assert!(result.stages[0].outs[0].hash.is_set());
        assert_eq!(cache_entries(&repo), 0);
    }

    #[test]
    fn link_failure_is_collected_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a", "1");
        write(root, "b", "2");
        Repo::init(root).unwrap();
        let mut config = crate::config::RepoConfig::default();
        config.cache.link_types = Vec::new();
        config.save(&root.join(".lode/config.toml")).unwrap();
        let mut repo = Repo::open(root).unwrap();

        let result = repo.add(&targets(&["a", "b"]), &AddOptions::default()).unwrap();

        assert_eq!(result.stages.len(), 2);
        assert_eq!(
            result.link_failures,
            vec![root.join("a.lode"), root.join("b.lode")]
        );
        assert!(root.join("a.lode").is_file());
        assert_eq!(cache_entries(&repo), 2);
        let msg = repo.link_failure_message(&result.link_failures);
        assert_eq!(msg.matches("a.lode").count(), 2);
        assert!(msg.ends_with("\tlode checkout a.lode b.lode"));
    }

    #[test]
    fn glob_targets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "x1.csv", "1");
        write(root, "x2.csv", "2");
        write(root, "y.txt", "3");
        let mut repo = repo(root);
        let opts = AddOptions {
            glob: true,
            ..Default::default()
        };
        let result = repo.add(&targets(&["*.csv"]), &opts).unwrap();
        assert_eq!(result.stages.len(), 2);
        assert!(!root.join("y.txt.lode").exists());
    }

    #[test]
    fn fname_names_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a", "1");
        let mut repo = repo(root);
        let opts = AddOptions {
            fname: Some("custom.lode".into()),
            desc: Some("first file".into()),
            ..Default::default()
        };
        repo.add(&targets(&["a"]), &opts).unwrap();
        let stage = manifest::load(&root.join("custom.lode")).unwrap();
        assert_eq!(stage.outs[0].desc.as_deref(), Some("first file"));
    }

    #[derive(Default)]
    struct Counting {
        total: AtomicIsize,
        updates: AtomicIsize,
    }

    impl Progress for Counting {
        fn add_total(&self, delta: isize) {
            self.total.fetch_add(delta, Ordering::SeqCst);
        }

        fn update(&self, _label: &str) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn progress_total_follows_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "data/a", "1");
        write(root, "data/b", "2");
        write(root, "c", "3");
        let progress = Arc::new(Counting::default());
        let mut repo = repo(root).with_progress(Arc::clone(&progress) as Arc<dyn Progress>);

        let opts = AddOptions {
            recursive: true,
            ..Default::default()
        };
        repo.add(&targets(&["data", "c"]), &opts).unwrap();
        assert_eq!(progress.total.load(Ordering::SeqCst), 3);
        assert_eq!(progress.updates.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn to_remote_skips_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        fs::create_dir_all(&root).unwrap();
        write(dir.path(), "src/big.bin", "payload");
        Repo::init(&root).unwrap();
        let mut config = crate::config::RepoConfig::default();
        config.core.remote = Some("store".into());
        config.remote.insert(
            "store".into(),
            lode_remote::RemoteConfig::new(dir.path().join("remote").to_string_lossy()),
        );
        config.save(&root.join(".lode/config.toml")).unwrap();
        let mut repo = Repo::open(&root).unwrap();

        let opts = AddOptions {
            to_remote: true,
            out: Some("model.bin".into()),
            ..Default::default()
        };
        let source = dir.path().join("src/big.bin");
        let result = repo
            .add(&[source.to_string_lossy().into_owned()], &opts)
            .unwrap();

        let stage = &result.stages[0];
        assert_eq!(stage.path(), root.join("model.bin.lode"));
        assert!(stage.outs[0].hash.is_set());
        assert!(!root.join("model.bin").exists());
        assert_eq!(cache_entries(&repo), 0);
        assert!(repo.remote(None).unwrap().exists(&stage.outs[0].hash).unwrap());
    }
}
