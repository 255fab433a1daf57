use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use phasegate::logging::{self, LoggingConfig};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "phasegate")]
#[command(version, about = "Phase-gated development workflow enforced through git hooks")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit log events on stderr as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new phasegate project
    Init {
        /// Also install the git hook scripts
        #[arg(long)]
        install_hooks: bool,
        /// Replace existing hooks not written by phasegate
        #[arg(long)]
        force: bool,
    },
    /// Write git hook scripts that call `phasegate hook`
    InstallHooks {
        #[arg(long)]
        force: bool,
    },
    /// Run a checkpoint (called from git hooks)
    Hook {
        /// post-checkout, pre-commit, commit-msg, pre-push or post-merge
        checkpoint: String,
        /// Arguments git passed to the hook
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Inspect and drive the phase state machine
    Phase {
        #[command(subcommand)]
        command: PhaseCommands,
    },
    /// Manage stored workflow artifacts
    Artifacts {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
    /// Inspect or reset checkpoint retry budgets
    Retry {
        #[command(subcommand)]
        command: RetryCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show recent checkpoint executions and failures
    Log {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand, Clone)]
pub enum PhaseCommands {
    /// Show the current phase and what is needed to leave it
    Status,
    /// List recorded transitions
    History,
    /// Move to another phase
    Transition {
        /// Phase code (P0-P7) or name
        target: String,
    },
    /// Run the implementation registered for a phase
    Execute {
        /// Defaults to the current phase
        phase: Option<String>,
        #[arg(long, default_value = "")]
        task: String,
    },
    /// Record an evidence value (JSON, or a plain string)
    Evidence {
        key: String,
        /// Defaults to true
        value: Option<String>,
    },
    /// Discard workflow state and history
    Reset {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ArtifactCommands {
    /// List artifacts
    List {
        #[arg(long = "type")]
        artifact_type: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show an artifact's metadata
    Show {
        id: String,
        /// Print the content as well
        #[arg(long)]
        content: bool,
    },
    /// Store a file as a new draft artifact
    Store {
        artifact_type: String,
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },
    /// Re-score an artifact and set its status from the score
    Validate { id: String },
    /// Set an artifact's status
    SetStatus { id: String, status: String },
    /// Remove artifacts older than the retention window
    Cleanup {
        #[arg(long)]
        retention_days: Option<u32>,
        #[arg(long)]
        dry_run: bool,
    },
    /// List the artifacts a checkpoint reads
    ForHook { hook: String },
    /// Show store statistics
    Stats,
}

#[derive(Subcommand, Clone)]
pub enum RetryCommands {
    /// Show retry state per hook
    Status,
    /// Clear retry state for one hook, or all
    Clear { hook: Option<String> },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default phasegate.toml file
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let guard = logging::init(&LoggingConfig {
        verbose: cli.verbose,
        json: cli.json_logs,
        log_dir: Some(phasegate::init::get_data_dir(&project_dir).join("logs")),
    });

    match &cli.command {
        Commands::Init {
            install_hooks,
            force,
        } => cmd::cmd_init(&project_dir, *install_hooks, *force)?,
        Commands::InstallHooks { force } => cmd::cmd_install_hooks(&project_dir, *force)?,
        Commands::Hook { checkpoint, args } => {
            let code = cmd::cmd_hook(&project_dir, &cli, checkpoint, args).await?;
            drop(guard);
            std::process::exit(code);
        }
        Commands::Phase { command } => cmd::cmd_phase(&project_dir, &cli, command.clone()).await?,
        Commands::Artifacts { command } => cmd::cmd_artifacts(&project_dir, &cli, command.clone())?,
        Commands::Retry { command } => cmd::cmd_retry(&project_dir, &cli, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Log { limit } => cmd::cmd_log(&project_dir, &cli, *limit)?,
    }

    Ok(())
}
