//! Phase status, history, transition and execution commands.

use anyhow::{Context, Result};
use console::style;
use phasegate::Phase;
use phasegate::phase::{PhaseEngine, WorkflowState};
use std::path::Path;

use super::super::{Cli, PhaseCommands};

pub async fn cmd_phase(project_dir: &Path, cli: &Cli, command: PhaseCommands) -> Result<()> {
    let workflow = super::load_workflow(project_dir, cli)?;
    let engine = &workflow.engine;

    match command {
        PhaseCommands::Status => print_status(engine, &workflow.config.checkpoint_map())?,
        PhaseCommands::History => {
            let history = engine.history()?;
            if history.is_empty() {
                println!("No transitions recorded.");
                return Ok(());
            }
            println!("{:<4} {:<22} {:<20} {:<20} Reason", "#", "Timestamp", "From", "To");
            for record in history {
                println!(
                    "{:<4} {:<22} {:<20} {:<20} {}",
                    record.sequence,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.from_phase.to_string(),
                    record.to_phase.to_string(),
                    record.reason
                );
            }
        }
        PhaseCommands::Transition { target } => {
            let target: Phase = target.parse()?;
            let result = engine.transition_to(target)?;
            println!(
                "{} {} -> {}",
                style("Transitioned").green().bold(),
                result.from_phase,
                result.to_phase
            );
            println!("  {}", result.reason);
            for warning in &result.warnings {
                println!("  {} {}", style("warning:").yellow(), warning);
            }
        }
        PhaseCommands::Execute { phase, task } => {
            let phase = match phase {
                Some(p) => p.parse()?,
                None => engine.current_phase()?,
            };
            let result = engine.execute_phase(phase, &task).await;
            if result.success {
                println!("{} {} ({}ms)", style("Executed").green().bold(), phase, result.duration_ms);
            } else {
                println!("{} {}", style("Failed").red().bold(), phase);
            }
            if !result.output.is_null() {
                println!("{}", serde_json::to_string_pretty(&result.output)?);
            }
            for error in &result.errors {
                println!("  {} {}", style("error:").red(), error);
            }
            for warning in &result.warnings {
                println!("  {} {}", style("warning:").yellow(), warning);
            }
            if !result.success {
                anyhow::bail!("{} implementation failed", phase.code());
            }
        }
        PhaseCommands::Evidence { key, value } => {
            let value = match value {
                None => serde_json::Value::Bool(true),
                Some(raw) => serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)),
            };
            engine
                .record_evidence(&key, value.clone())
                .with_context(|| format!("Failed to record evidence '{}'", key))?;
            println!("Recorded {} = {}", key, value);
        }
        PhaseCommands::Reset { force } => {
            if !force {
                println!("This discards the current phase, evidence and transition history.");
                println!("Re-run with --force to confirm.");
                return Ok(());
            }
            engine.reset()?;
            println!("Workflow reset to {}.", Phase::DEFAULT);
        }
    }

    Ok(())
}

fn print_status(
    engine: &PhaseEngine,
    checkpoints: &std::collections::BTreeMap<phasegate::hooks::Checkpoint, Phase>,
) -> Result<()> {
    let state = engine.state()?;
    let phase = state.current_phase;

    println!();
    println!("Current phase: {}", style(phase).bold());
    println!("  {}", phase.description());
    println!(
        "  entered {} ({} transitions so far)",
        state.phase_entered_at.format("%Y-%m-%d %H:%M:%S"),
        state.transitions
    );

    let rules = engine.rules();
    let targets: Vec<String> = rules
        .allowed_targets(phase)
        .iter()
        .map(|p| p.to_string())
        .collect();
    println!();
    if targets.is_empty() {
        println!("Next: none (terminal phase)");
    } else {
        println!("Next: {}", targets.join(", "));
    }

    print_exit_conditions(engine, &state);

    let bound: Vec<&str> = checkpoints
        .iter()
        .filter(|(_, p)| **p == phase)
        .map(|(c, _)| c.as_str())
        .collect();
    if !bound.is_empty() {
        println!();
        println!("Checkpoints running {} checks: {}", phase.code(), bound.join(", "));
    }

    if !state.evidence.is_empty() {
        println!();
        println!("Evidence:");
        for (key, value) in &state.evidence {
            println!("  {} = {}", key, value);
        }
    }
    println!();
    Ok(())
}

fn print_exit_conditions(engine: &PhaseEngine, state: &WorkflowState) {
    let rules = engine.rules();
    let phase = state.current_phase;
    let preconditions = rules.preconditions_for(phase);
    let gates = rules.gates_for(phase);
    if preconditions.is_empty() && gates.is_empty() {
        return;
    }

    let mark = |ok: bool| {
        if ok {
            style("✓").green()
        } else {
            style("✗").red()
        }
    };
    println!();
    println!("To leave {}:", phase.code());
    for precondition in preconditions {
        println!(
            "  {} {}: {}",
            mark(precondition.is_met(state)),
            precondition.name,
            precondition.description
        );
    }
    for gate in gates {
        println!("  {} {}: {}", mark(gate.passes(state)), gate.name, gate.description);
    }
}
