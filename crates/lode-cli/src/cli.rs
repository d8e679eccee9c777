use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lode",
    about = "Track large data files next to your code",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Wait for another lode process to release the repository
    #[arg(long, global = true)]
    pub wait_for_lock: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a lode repository
    Init(InitArgs),
    /// Track files or directories
    Add(AddArgs),
    /// Restore tracked outputs from the cache
    Checkout(CheckoutArgs),
    /// Record and cache changes to tracked outputs
    Commit(CommitArgs),
    /// Track data from another repository
    Import(ImportArgs),
    /// Move imports to a new revision
    Update(UpdateArgs),
    /// Download imported data into the cache
    Sync(SyncArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(required = true)]
    pub targets: Vec<String>,
    /// Track every file under the given directories separately
    #[arg(short = 'R', long)]
    pub recursive: bool,
    /// Record the manifest without caching the data
    #[arg(long)]
    pub no_commit: bool,
    /// Manifest file name to use instead of `<target>.lode`
    #[arg(long = "file")]
    pub fname: Option<String>,
    /// Expand wildcards in targets
    #[arg(long)]
    pub glob: bool,
    /// Upload straight to a remote without caching locally
    #[arg(long)]
    pub to_remote: bool,
    /// Destination path inside the workspace
    #[arg(short, long)]
    pub out: Option<String>,
    /// Remote to upload to
    #[arg(short, long)]
    pub remote: Option<String>,
    /// Description recorded on the output
    #[arg(long)]
    pub desc: Option<String>,
}

#[derive(Args)]
pub struct CheckoutArgs {
    pub targets: Vec<PathBuf>,
    /// Re-link outputs even when they are unchanged
    #[arg(long)]
    pub relink: bool,
}

#[derive(Args)]
pub struct CommitArgs {
    pub targets: Vec<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    pub url: String,
    pub path: String,
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    #[arg(long)]
    pub rev: Option<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub targets: Vec<PathBuf>,
    #[arg(long)]
    pub rev: Option<String>,
}

#[derive(Args)]
pub struct SyncArgs {
    pub targets: Vec<PathBuf>,
    /// Only record what would be downloaded
    #[arg(long)]
    pub dry: bool,
    /// Download even when the content is already cached
    #[arg(short, long)]
    pub force: bool,
    #[arg(short, long)]
    pub jobs: Option<usize>,
}
