//! hubsync - replay git push events against a hubsync database.
//!
//! The binary feeds the same entry point a webhook receiver would: it reads a
//! push payload from disk and runs it through `GitCallback::handle_push`.

mod commands;

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Exit status asking the caller to redeliver the push (EX_TEMPFAIL).
const EXIT_RETRY: u8 = 75;

#[derive(Parser, Debug)]
#[command(name = "hubsync")]
#[command(about = "Reconcile repository tags and runtime frameworks from push events")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load repositories and the runtime framework catalog from a JSON file
    Catalog {
        #[arg(long, env = "HUBSYNC_DB")]
        db: PathBuf,
        /// Catalog file
        file: PathBuf,
    },
    /// Process a push event payload
    Apply(ApplyArgs),
    /// Print the derived state of a repository as JSON
    Show {
        #[arg(long, env = "HUBSYNC_DB")]
        db: PathBuf,
        /// Full repository name, e.g. models_acme/bert-base
        repository: String,
    },
}

#[derive(ClapArgs, Debug)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["git_url", "checkout"])))]
pub struct ApplyArgs {
    #[arg(long, env = "HUBSYNC_DB")]
    pub db: PathBuf,

    /// Push event payload (JSON)
    pub event: PathBuf,

    /// Base URL of the git server's HTTP API
    #[arg(long, env = "HUBSYNC_GIT_URL")]
    pub git_url: Option<String>,

    /// Directory holding working trees as <types>/<namespace>/<name>
    #[arg(long)]
    pub checkout: Option<PathBuf>,

    /// Moderation service base URL; enables the sensitive check
    #[arg(long, env = "HUBSYNC_MODERATION_URL")]
    pub moderation_url: Option<String>,

    /// Branch used for repositories without a recorded default branch
    #[arg(long, default_value = "main")]
    pub default_branch: String,

    /// Give up on the push after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    match args.command {
        Command::Catalog { db, file } => {
            commands::load_catalog(&db, &file)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Apply(apply) => match commands::apply(&apply).await? {
            commands::ApplyStatus::Success => Ok(ExitCode::SUCCESS),
            commands::ApplyStatus::Retry => Ok(ExitCode::from(EXIT_RETRY)),
            commands::ApplyStatus::Failed => Ok(ExitCode::FAILURE),
        },
        Command::Show { db, repository } => {
            let report = commands::show(&db, &repository)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
