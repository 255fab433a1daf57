//! Artifact store commands.

use anyhow::{Context, Result};
use console::style;
use phasegate::artifacts::{
    ArtifactContent, ArtifactFilter, ArtifactMetadata, ArtifactStatus, ArtifactType,
};
use phasegate::hooks::Checkpoint;
use std::path::Path;

use super::super::{ArtifactCommands, Cli};

pub fn cmd_artifacts(project_dir: &Path, cli: &Cli, command: ArtifactCommands) -> Result<()> {
    let retention = match &command {
        ArtifactCommands::Cleanup { retention_days, .. } => *retention_days,
        _ => None,
    };
    let workflow = super::load_workflow_with_retention(project_dir, cli, retention)?;
    let store = &workflow.store;

    match command {
        ArtifactCommands::List {
            artifact_type,
            status,
            tag,
        } => {
            let filter = ArtifactFilter {
                artifact_type: artifact_type.as_deref().map(str::parse::<ArtifactType>).transpose()?,
                status: status.as_deref().map(str::parse::<ArtifactStatus>).transpose()?,
                name: None,
                tag,
            };
            let items = store.list(&filter)?;
            if items.is_empty() {
                println!("No artifacts found.");
                return Ok(());
            }
            println!(
                "{:<32} {:<18} {:<24} {:>3} {:<10} {:>6}",
                "ID", "Type", "Name", "Ver", "Status", "Score"
            );
            for m in &items {
                println!(
                    "{:<32} {:<18} {:<24} {:>3} {:<10} {:>6.1}",
                    m.id,
                    m.artifact_type.as_str(),
                    truncate(&m.name, 24),
                    m.version,
                    m.status.as_str(),
                    m.quality_score
                );
            }
            println!();
            println!("{} artifact(s)", items.len());
        }
        ArtifactCommands::Show { id, content } => {
            if content {
                let artifact = store.retrieve(&id)?;
                print_metadata(&artifact.metadata);
                println!();
                match artifact.content {
                    ArtifactContent::Binary(bytes) => println!("({} bytes of binary content)", bytes.len()),
                    other => println!("{}", other.as_text()),
                }
            } else {
                print_metadata(&store.metadata(&id)?);
            }
        }
        ArtifactCommands::Store {
            artifact_type,
            name,
            file,
            tags,
            depends_on,
        } => {
            let artifact_type: ArtifactType = artifact_type.parse()?;
            let raw = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let id = store.store(artifact_type, &name, ArtifactContent::detect_bytes(raw), tags, depends_on)?;
            let meta = store.metadata(&id)?;
            println!("Stored {} (version {}, score {:.1})", id, meta.version, meta.quality_score);
        }
        ArtifactCommands::Validate { id } => {
            let meta = store.validate(&id)?;
            println!(
                "{} scored {:.1} ({}) -> {}",
                meta.id, meta.quality_score, meta.quality_level, meta.status
            );
            for issue in &meta.issues {
                println!("  {} {}", style("issue:").yellow(), issue);
            }
            for recommendation in &meta.recommendations {
                println!("  {} {}", style("hint:").dim(), recommendation);
            }
        }
        ArtifactCommands::SetStatus { id, status } => {
            let status: ArtifactStatus = status.parse()?;
            let meta = store.update_status(&id, status)?;
            println!("{} is now {}", meta.id, meta.status);
        }
        ArtifactCommands::Cleanup { dry_run, .. } => {
            let days = workflow.config.retention_days();
            let report = store.cleanup(days, dry_run)?;
            if report.candidates.is_empty() {
                println!("Nothing older than {} days to remove.", days);
                return Ok(());
            }
            for id in &report.candidates {
                println!("  {}", id);
            }
            if report.dry_run {
                println!("Would remove {} artifact(s) (dry run).", report.candidates.len());
            } else {
                println!(
                    "Removed {} artifact(s), freed {} bytes.",
                    report.removed, report.bytes_freed
                );
            }
        }
        ArtifactCommands::ForHook { hook } => {
            let checkpoint: Checkpoint = hook.parse()?;
            let items = workflow.router.artifacts_for(checkpoint)?;
            if items.is_empty() {
                println!("No usable artifacts for {}.", hook);
            }
            for m in &items {
                println!("{:<32} {:<18} {}", m.id, m.artifact_type.as_str(), m.name);
            }
        }
        ArtifactCommands::Stats => {
            let stats = store.stats()?;
            println!("Artifacts:      {}", stats.total);
            println!("Average score:  {:.2}", stats.average_score);
            println!("Compressed:     {}", stats.compressed);
            println!("Original bytes: {}", stats.original_bytes);
            println!("Stored bytes:   {}", stats.stored_bytes);
            if !stats.by_type.is_empty() {
                println!();
                println!("By type:");
                for (t, n) in &stats.by_type {
                    println!("  {:<18} {}", t, n);
                }
            }
            if !stats.by_status.is_empty() {
                println!();
                println!("By status:");
                for (s, n) in &stats.by_status {
                    println!("  {:<18} {}", s, n);
                }
            }
        }
    }

    Ok(())
}

fn print_metadata(m: &ArtifactMetadata) {
    println!("{}", style(&m.id).bold());
    println!("  type:      {}", m.artifact_type);
    println!("  name:      {} (version {})", m.name, m.version);
    println!("  status:    {}", m.status);
    println!("  quality:   {:.1} ({})", m.quality_score, m.quality_level);
    println!(
        "  scores:    completeness {:.0}, accuracy {:.0}, consistency {:.0}, timeliness {:.0}",
        m.validation.completeness, m.validation.accuracy, m.validation.consistency, m.validation.timeliness
    );
    println!(
        "  size:      {} bytes ({} stored{})",
        m.size_bytes,
        m.stored_bytes,
        if m.compressed { ", gzip" } else { "" }
    );
    println!("  checksum:  {}", m.checksum);
    if !m.tags.is_empty() {
        println!("  tags:      {}", m.tags.join(", "));
    }
    if !m.dependencies.is_empty() {
        println!("  depends:   {}", m.dependencies.join(", "));
    }
    println!("  created:   {}", m.created_at.to_rfc3339());
    for issue in &m.issues {
        println!("  {} {}", style("issue:").yellow(), issue);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
