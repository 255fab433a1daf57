//! `phasegate hook <checkpoint>`: the entry point git hook scripts call.

use anyhow::Result;
use console::style;
use phasegate::hooks::{Checkpoint, HookContext, HookResult};
use std::path::Path;

use super::super::Cli;

/// Run a checkpoint and return the exit status for the hook script.
///
/// Output goes to stderr, which git shows to the user.
pub async fn cmd_hook(project_dir: &Path, cli: &Cli, checkpoint: &str, args: &[String]) -> Result<i32> {
    let checkpoint: Checkpoint = checkpoint.parse()?;

    if !phasegate::init::is_initialized(project_dir) {
        eprintln!(
            "phasegate: {} skipped, project not initialized (run 'phasegate init')",
            checkpoint
        );
        return Ok(0);
    }

    let workflow = super::load_workflow(project_dir, cli)?;
    let context = HookContext::from_git_args(checkpoint, args);
    let result = workflow.run_hook(checkpoint, &context).await;

    print_result(checkpoint, &result, cli.verbose);
    Ok(result.exit_code())
}

fn print_result(checkpoint: Checkpoint, result: &HookResult, verbose: bool) {
    let label = if result.allows_git() {
        style("passed").green().bold()
    } else if checkpoint.can_block() {
        style("blocked").red().bold()
    } else {
        style("failed").red().bold()
    };
    eprintln!("phasegate {}: {}", checkpoint, label);
    for line in result.message.lines() {
        eprintln!("  {}", line);
    }
    if let Some(ref warning) = result.warning {
        eprintln!("  {} {}", style("warning:").yellow(), warning);
    }
    if verbose && let Some(ref details) = result.details {
        let rendered = serde_json::to_string_pretty(details).unwrap_or_default();
        eprintln!("{}", textwrap::indent(&rendered, "  "));
    }
}
