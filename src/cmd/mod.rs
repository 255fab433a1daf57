//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled           |
//! |-------------|----------------------------|
//! | `project`   | `Init`, `InstallHooks`     |
//! | `hook`      | `Hook`                     |
//! | `phase`     | `Phase`                    |
//! | `artifacts` | `Artifacts`                |
//! | `retry`     | `Retry`, `Log`             |
//! | `config`    | `Config`                   |

pub mod artifacts;
pub mod config;
pub mod hook;
pub mod phase;
pub mod project;
pub mod retry;

pub use artifacts::cmd_artifacts;
pub use config::cmd_config;
pub use hook::cmd_hook;
pub use phase::cmd_phase;
pub use project::{cmd_init, cmd_install_hooks};
pub use retry::{cmd_log, cmd_retry};

use anyhow::Result;
use phasegate::{WorkflowConfig, WorkflowContext};
use std::path::Path;

use super::Cli;

/// Build the session for commands that need an initialized project.
pub(crate) fn load_workflow(project_dir: &Path, cli: &Cli) -> Result<WorkflowContext> {
    load_workflow_with_retention(project_dir, cli, None)
}

pub(crate) fn load_workflow_with_retention(
    project_dir: &Path,
    cli: &Cli,
    retention_days: Option<u32>,
) -> Result<WorkflowContext> {
    if !phasegate::init::is_initialized(project_dir) {
        anyhow::bail!("Project is not initialized. Run 'phasegate init' first.");
    }
    let config = WorkflowConfig::with_cli_args(project_dir.to_path_buf(), cli.verbose, retention_days)?;
    WorkflowContext::new(config)
}
