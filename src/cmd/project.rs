//! Project initialization and git hook installation.

use anyhow::Result;
use std::path::Path;

pub fn cmd_init(project_dir: &Path, install_hooks: bool, force: bool) -> Result<()> {
    use phasegate::init::init_project;

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized phasegate project at {}",
            result.data_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .phasegate/");
        println!("  ├── phasegate.toml  # Configuration (use `phasegate config show`)");
        println!("  ├── artifacts/      # Stored workflow artifacts");
        println!("  ├── logs/           # Checkpoint executions and failures");
        println!("  └── reports/        # Manual intervention reports");
        println!();
    } else {
        println!(
            "phasegate project already initialized at {}",
            result.data_dir.display()
        );
        println!("Directory structure verified.");
    }

    if install_hooks {
        cmd_install_hooks(project_dir, force)?;
    } else if result.created {
        println!("Next steps:");
        println!("  1. Run `phasegate install-hooks` to enforce checkpoints on git operations");
        println!("  2. Run `phasegate phase status` to see what the current phase needs");
    }

    Ok(())
}

pub fn cmd_install_hooks(project_dir: &Path, force: bool) -> Result<()> {
    use phasegate::init::install_git_hooks;

    let report = install_git_hooks(project_dir, force)?;
    println!("Git hooks in {}:", report.hooks_dir.display());
    for checkpoint in &report.installed {
        println!("  {} {}", console::style("installed").green(), checkpoint);
    }
    for checkpoint in &report.skipped {
        println!(
            "  {} {} (existing hook; use --force to replace)",
            console::style("skipped").yellow(),
            checkpoint
        );
    }
    Ok(())
}
