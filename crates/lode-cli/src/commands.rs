use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use lode_remote::{CredentialKey, Prompter, RemoteError, RemoteResult};
use lode_repo::{AddOptions, CheckoutOptions, CheckoutStats, LogProgress, Repo};
use lode_stage::Stage;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let cwd = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine the working directory")?,
    };
    debug!(cwd = %cwd.display(), "running command");
    let session = Session {
        cwd,
        wait_for_lock: cli.wait_for_lock,
    };
    match cli.command {
        Command::Init(args) => cmd_init(&session, args),
        Command::Add(args) => cmd_add(&session, args),
        Command::Checkout(args) => cmd_checkout(&session, args),
        Command::Commit(args) => cmd_commit(&session, args),
        Command::Import(args) => cmd_import(&session, args),
        Command::Update(args) => cmd_update(&session, args),
        Command::Sync(args) => cmd_sync(&session, args),
    }
}

/// Asks for remote passwords on the terminal.
struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn prompt_password(&self, key: &CredentialKey) -> RemoteResult<String> {
        let mut stderr = io::stderr();
        write!(stderr, "Password for {key}: ")
            .and_then(|_| stderr.flush())
            .map_err(|e| RemoteError::Credentials(e.to_string()))?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| RemoteError::Credentials(e.to_string()))?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Invocation-wide settings shared by every command.
struct Session {
    cwd: PathBuf,
    wait_for_lock: bool,
}

impl Session {
    fn open(&self) -> anyhow::Result<Repo> {
        Ok(Repo::open(&self.cwd)?
            .with_prompter(Box::new(StdinPrompter))
            .with_lock_wait(self.wait_for_lock))
    }
}

/// Targets are given relative to the invocation directory; the library
/// resolves relative paths against the repository root.
fn from_cwd(cwd: &Path, targets: Vec<PathBuf>) -> Vec<PathBuf> {
    targets.into_iter().map(|t| cwd.join(t)).collect()
}

fn is_url(target: &str) -> bool {
    target.contains("://")
}

fn arg_from_cwd(cwd: &Path, arg: String) -> String {
    if is_url(&arg) {
        arg
    } else {
        cwd.join(arg).to_string_lossy().into_owned()
    }
}

fn print_stages(verb: &str, stages: &[Stage], root: &Path) {
    for stage in stages {
        println!("  {} {}", verb.green(), stage.relpath(root));
    }
}

fn cmd_init(session: &Session, args: InitArgs) -> anyhow::Result<()> {
    let cwd = session.cwd.as_path();
    let root = args.path.map(|p| cwd.join(p)).unwrap_or_else(|| cwd.to_path_buf());
    let repo = Repo::init(&root)?;
    println!(
        "{} Initialized lode repository in {}",
        "✓".green().bold(),
        repo.root().display().to_string().bold()
    );
    Ok(())
}

fn cmd_add(session: &Session, args: AddArgs) -> anyhow::Result<()> {
    let cwd = session.cwd.as_path();
    let targets: Vec<String> = args
        .targets
        .into_iter()
        .map(|t| arg_from_cwd(cwd, t))
        .collect();
    let opts = AddOptions {
        recursive: args.recursive,
        no_commit: args.no_commit,
        fname: args.fname,
        glob: args.glob,
        to_remote: args.to_remote,
        out: args.out.map(|o| arg_from_cwd(cwd, o)),
        remote: args.remote,
        desc: args.desc,
    };
    let mut repo = session.open()?.with_progress(Arc::new(LogProgress::new("Adding")));
    let result = repo.add(&targets, &opts)?;
    print_stages("added:", &result.stages, repo.root());
    if result.link_failures.is_empty() {
        println!("{} {} stage(s) recorded", "✓".green().bold(), result.stages.len());
    } else {
        println!(
            "{} {} stage(s) recorded, {} not linked into the workspace",
            "!".yellow().bold(),
            result.stages.len(),
            result.link_failures.len()
        );
    }
    Ok(())
}

fn print_stats(stats: &CheckoutStats) {
    if stats.is_empty() {
        println!("Workspace is up to date.");
        return;
    }
    for path in &stats.added {
        println!("  {} {path}", "A".green());
    }
    for path in &stats.modified {
        println!("  {} {path}", "M".yellow());
    }
    for path in &stats.deleted {
        println!("  {} {path}", "D".red());
    }
}

fn cmd_checkout(session: &Session, args: CheckoutArgs) -> anyhow::Result<()> {
    let cwd = session.cwd.as_path();
    let mut repo = session.open()?;
    let opts = CheckoutOptions { relink: args.relink };
    let stats = repo.checkout(&from_cwd(cwd, args.targets), opts)?;
    print_stats(&stats);
    Ok(())
}

fn cmd_commit(session: &Session, args: CommitArgs) -> anyhow::Result<()> {
    let cwd = session.cwd.as_path();
    let mut repo = session.open()?;
    let stages = repo.commit(&from_cwd(cwd, args.targets))?;
    print_stages("committed:", &stages, repo.root());
    println!("{} {} stage(s) committed", "✓".green().bold(), stages.len());
    Ok(())
}

fn cmd_import(session: &Session, args: ImportArgs) -> anyhow::Result<()> {
    let cwd = session.cwd.as_path();
    let mut repo = session.open()?;
    let out = args.out.map(|o| cwd.join(o));
    let stage = repo.import(&args.url, &args.path, out.as_deref(), args.rev.as_deref())?;
    println!(
        "{} Imported {} from {} into {}",
        "✓".green().bold(),
        args.path.yellow(),
        args.url.blue(),
        stage.relpath(repo.root()).bold()
    );
    Ok(())
}

fn cmd_update(session: &Session, args: UpdateArgs) -> anyhow::Result<()> {
    let cwd = session.cwd.as_path();
    let mut repo = session.open()?;
    let stages = repo.update(&from_cwd(cwd, args.targets), args.rev.as_deref())?;
    print_stages("updated:", &stages, repo.root());
    Ok(())
}

fn cmd_sync(session: &Session, args: SyncArgs) -> anyhow::Result<()> {
    let cwd = session.cwd.as_path();
    let mut repo = session.open()?;
    let stages = repo.sync(&from_cwd(cwd, args.targets), args.dry, args.force, args.jobs)?;
    let verb = if args.dry { "checked:" } else { "synced:" };
    print_stages(verb, &stages, repo.root());
    Ok(())
}
