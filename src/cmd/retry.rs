//! Retry state and execution log commands.

use anyhow::Result;
use console::style;
use phasegate::hooks::Checkpoint;
use std::path::Path;

use super::super::{Cli, RetryCommands};

pub fn cmd_retry(project_dir: &Path, cli: &Cli, command: RetryCommands) -> Result<()> {
    let workflow = super::load_workflow(project_dir, cli)?;
    let retry_state = &workflow.retry_state;

    match command {
        RetryCommands::Status => {
            let entries = retry_state.all()?;
            if entries.is_empty() {
                println!("No retry state recorded.");
                return Ok(());
            }
            println!("{:<16} {:>8} {:<16} {:<22} State", "Hook", "Attempts", "Last error", "Last attempt");
            for (hook, state, live) in entries {
                let max = hook
                    .parse::<Checkpoint>()
                    .map(|c| workflow.failures.hooks().for_checkpoint(c).retry.max_attempts.to_string())
                    .unwrap_or_else(|_| "?".to_string());
                println!(
                    "{:<16} {:>8} {:<16} {:<22} {}",
                    hook,
                    format!("{}/{}", state.attempt_count, max),
                    state.error_type.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
                    state.last_attempt.format("%Y-%m-%d %H:%M:%S"),
                    if live { style("live").yellow() } else { style("expired").dim() }
                );
            }
        }
        RetryCommands::Clear { hook: Some(hook) } => {
            retry_state.clear(&hook)?;
            println!("Cleared retry state for {}.", hook);
        }
        RetryCommands::Clear { hook: None } => {
            retry_state.clear_all()?;
            println!("Cleared all retry state.");
        }
    }

    Ok(())
}

pub fn cmd_log(project_dir: &Path, cli: &Cli, limit: usize) -> Result<()> {
    let workflow = super::load_workflow(project_dir, cli)?;

    let executions = workflow.router.execution_log().tail(limit)?;
    println!();
    println!("Recent checkpoint executions");
    println!("============================");
    if executions.is_empty() {
        println!("(none)");
    }
    for record in &executions {
        let outcome = if record.success {
            style("ok").green()
        } else {
            style("FAIL").red()
        };
        let phase = record.phase.map(|p| p.code()).unwrap_or("--");
        println!(
            "{} {:<14} {:<3} {:<4} {:>6}ms  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.checkpoint.as_str(),
            phase,
            outcome,
            record.duration_ms,
            record.message.lines().next().unwrap_or_default()
        );
    }

    let failures = workflow.failures.failure_log().tail(limit)?;
    println!();
    println!("Recent failures");
    println!("===============");
    if failures.is_empty() {
        println!("(none)");
    }
    for failure in &failures {
        println!(
            "{} {:<14} {:<12} #{:<3} {:<20} {}",
            failure.timestamp.format("%Y-%m-%d %H:%M:%S"),
            failure.hook,
            failure.error_type.as_str(),
            failure.failure_count,
            failure.strategy.as_str(),
            failure.error_message.lines().next().unwrap_or_default()
        );
    }
    println!();
    Ok(())
}
