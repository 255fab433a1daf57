//! Configuration view and validation commands, `phasegate config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use phasegate::init::{get_data_dir, init_project};
    use phasegate::workflow_config::{CONFIG_FILE, PhasegateToml, WorkflowConfig};

    let data_dir = get_data_dir(project_dir);
    let config_path = data_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("phasegate Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No phasegate.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = PhasegateToml::load_or_default(&data_dir)?;
            if let Some(ref name) = toml.project.name {
                println!("[project]");
                println!("  name = \"{}\"", name);
                println!();
            }

            println!("[phases]");
            println!("  enforce_gates = {}", toml.phases.enforce_gates);
            for (phase, implementation) in &toml.phases.implementations {
                println!(
                    "  {} implementation = \"{}\" ({}s)",
                    phase.code(),
                    implementation.command,
                    implementation.timeout_secs
                );
            }
            println!();

            println!("Checkpoints:");
            let map = toml.checkpoint_map();
            for (checkpoint, hook) in toml.hooks.resolved() {
                let phase = map
                    .get(&checkpoint)
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unmapped".to_string());
                println!(
                    "  {:<14} {:<20} {:<20} timeout {}s, {} attempts{}{}",
                    checkpoint.as_str(),
                    phase,
                    hook.strategy.as_str(),
                    hook.timeout_secs,
                    hook.retry.max_attempts,
                    if hook.required_gates.is_empty() {
                        String::new()
                    } else {
                        format!(", gates [{}]", hook.required_gates.join(", "))
                    },
                    if hook.enabled { "" } else { " (disabled)" }
                );
            }
            println!();

            println!("[artifacts]");
            println!(
                "  compression_threshold_bytes = {}",
                toml.artifacts.compression_threshold_bytes
            );
            println!("  retention_days = {}", toml.artifacts.retention_days);
            println!("  store_check_reports = {}", toml.artifacts.store_check_reports);
            println!();

            println!("[checks]");
            println!("  min_agents = {}", toml.checks.min_agents);
            println!("  max_subject_length = {}", toml.checks.max_subject_length);
            for (name, analyzer) in &toml.checks.analyzers {
                println!("  analyzer {} = \"{}\"", name, analyzer.command);
            }
            for (category, fixer) in &toml.fixers {
                println!("  fixer {} = \"{}\"", category, fixer.command);
            }
            println!();

            if config_path.exists() {
                // Show effective values (including env overrides)
                let config = WorkflowConfig::new(project_dir.to_path_buf())?;
                println!("Effective values (with env/CLI overrides):");
                println!("  enforce_gates = {}", config.enforce_gates());
                println!("  retention_days = {}", config.retention_days());
                println!("  skip_checks = {}", config.skip_checks());
                println!();
            } else {
                println!("Run 'phasegate config init' to create a phasegate.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No phasegate.toml found. Using defaults (valid).");
                return Ok(());
            }

            let config = WorkflowConfig::new(project_dir.to_path_buf())?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("phasegate.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            init_project(project_dir)?;

            println!("Created phasegate.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [phases] enforce_gates, checkpoint_map, implementations");
            println!("  - [checks] analyzers and commit/branch patterns");
            println!("  - [hooks.<checkpoint>] strategy, retry, timeout_secs, required_gates");
            println!("  - [fixers.<category>] auto-fix commands");
            println!();
        }
    }

    Ok(())
}
