//! Initialization for phasegate projects.
//!
//! `phasegate init` creates the data directory:
//!
//! ```text
//! .phasegate/
//! ├── phasegate.toml   # Configuration (commented defaults)
//! ├── artifacts/       # Artifact payloads and index.json
//! ├── logs/            # failures.jsonl, hook executions, rolling tracing log
//! └── reports/         # Manual intervention reports
//! ```
//!
//! Workflow state, transition history and retry state are created on first use.
//! `phasegate install-hooks` writes one small script per checkpoint into the
//! repository's hooks directory.

use crate::hooks::Checkpoint;
use crate::workflow_config::{CONFIG_FILE, DATA_DIR};
use anyhow::{Context, Result};
use git2::Repository;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marks hook scripts written by phasegate.
pub const HOOK_MARKER: &str = "# managed by phasegate";

const SUBDIRECTORIES: &[&str] = &["artifacts", "logs", "reports"];

const DEFAULT_CONFIG: &str = r#"# phasegate configuration
#
# Every key is optional; the values shown are the defaults.

[project]
# name = "my-service"

[phases]
enforce_gates = true

# Remap checkpoints to phases:
# [phases.checkpoint_map]
# post-merge = "P7"

# Run a command when `phasegate phase execute` targets a phase:
# [phases.implementations.P3]
# command = "./scripts/implement.sh"
# timeout_secs = 600

[artifacts]
compression_threshold_bytes = 4096
retention_days = 30
store_check_reports = true

[retry]
state_ttl_secs = 3600

[checks]
min_agents = 1
max_subject_length = 72
# ignore_staged = ["*.lock"]

# Analyzers run at the quality gate and later phases:
# [checks.analyzers.tests]
# command = "cargo test --quiet"

# Per-checkpoint failure handling:
# [hooks.pre-push]
# strategy = "retry"
# timeout_secs = 600
# required_gates = ["tests"]

# Auto-fix commands by error category:
# [fixers.format]
# command = "cargo fmt"
"#;

/// Result of initializing a phasegate project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the .phasegate directory
    pub data_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Create `.phasegate/` in `project_dir`, or complete a partial one.
///
/// An existing phasegate.toml is never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let data_dir = get_data_dir(project_dir);
    let created = !data_dir.exists();

    for name in SUBDIRECTORIES {
        let dir = data_dir.join(name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let config_file = data_dir.join(CONFIG_FILE);
    if !config_file.exists() {
        std::fs::write(&config_file, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to create {}", config_file.display()))?;
    }

    info!(dir = %data_dir.display(), created, "Initialized phasegate project");
    Ok(InitResult { data_dir, created })
}

/// Check if a project is already initialized with phasegate.
pub fn is_initialized(project_dir: &Path) -> bool {
    get_data_dir(project_dir).is_dir()
}

/// Get the path to the data directory for a project.
pub fn get_data_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(DATA_DIR)
}

#[derive(Debug, Default)]
pub struct HookInstallReport {
    pub hooks_dir: PathBuf,
    pub installed: Vec<Checkpoint>,
    /// Existing hooks not written by phasegate, left untouched
    pub skipped: Vec<Checkpoint>,
}

/// The script git runs for `checkpoint`.
pub fn hook_script(checkpoint: Checkpoint) -> String {
    format!(
        "#!/bin/sh\n{}\nexec \"${{PHASEGATE_BIN:-phasegate}}\" hook {} \"$@\"\n",
        HOOK_MARKER,
        checkpoint.as_str()
    )
}

/// Write a hook script for every checkpoint into the repository's hooks directory.
///
/// Hooks that phasegate did not write are only replaced with `force`.
pub fn install_git_hooks(project_dir: &Path, force: bool) -> Result<HookInstallReport> {
    let repo = Repository::discover(project_dir)
        .with_context(|| format!("Not a git repository: {}", project_dir.display()))?;
    let hooks_dir = repo.path().join("hooks");
    std::fs::create_dir_all(&hooks_dir)
        .with_context(|| format!("Failed to create {}", hooks_dir.display()))?;

    let mut report = HookInstallReport {
        hooks_dir: hooks_dir.clone(),
        ..Default::default()
    };
    for checkpoint in Checkpoint::all() {
        let path = hooks_dir.join(checkpoint.as_str());
        if path.exists() && !force {
            let existing = std::fs::read_to_string(&path).unwrap_or_default();
            if !existing.contains(HOOK_MARKER) {
                debug!(hook = checkpoint.as_str(), "Leaving existing hook in place");
                report.skipped.push(*checkpoint);
                continue;
            }
        }
        std::fs::write(&path, hook_script(*checkpoint))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        make_executable(&path)?;
        report.installed.push(*checkpoint);
    }
    info!(
        installed = report.installed.len(),
        skipped = report.skipped.len(),
        "Installed git hooks"
    );
    Ok(report)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to make {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow_config::PhasegateToml;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_structure() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path()).unwrap();

        assert!(result.created);
        assert_eq!(result.data_dir, dir.path().join(".phasegate"));
        for name in SUBDIRECTORIES {
            assert!(result.data_dir.join(name).is_dir(), "missing {}", name);
        }
        assert!(is_initialized(dir.path()));
    }

    #[test]
    fn test_default_config_parses_to_defaults() {
        let parsed = PhasegateToml::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, PhasegateToml::default());
    }

    #[test]
    fn test_init_project_keeps_existing_config() {
        let dir = tempdir().unwrap();
        init_project(dir.path()).unwrap();
        let config = dir.path().join(".phasegate").join(CONFIG_FILE);
        std::fs::write(&config, "[artifacts]\nretention_days = 7\n").unwrap();

        let again = init_project(dir.path()).unwrap();
        assert!(!again.created);
        assert!(std::fs::read_to_string(&config).unwrap().contains("retention_days = 7"));
    }

    #[test]
    fn test_install_git_hooks_writes_every_checkpoint() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();

        let report = install_git_hooks(dir.path(), false).unwrap();
        assert_eq!(report.installed.len(), Checkpoint::all().len());

        let script = std::fs::read_to_string(report.hooks_dir.join("pre-push")).unwrap();
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("hook pre-push \"$@\""));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(report.hooks_dir.join("pre-push"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_install_git_hooks_respects_foreign_hooks() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let hooks_dir = repo.path().join("hooks");
        std::fs::create_dir_all(&hooks_dir).unwrap();
        std::fs::write(hooks_dir.join("pre-commit"), "#!/bin/sh\nmake lint\n").unwrap();

        let report = install_git_hooks(dir.path(), false).unwrap();
        assert_eq!(report.skipped, vec![Checkpoint::PreCommit]);
        assert!(std::fs::read_to_string(hooks_dir.join("pre-commit")).unwrap().contains("make lint"));

        let forced = install_git_hooks(dir.path(), true).unwrap();
        assert!(forced.skipped.is_empty());
        assert!(std::fs::read_to_string(hooks_dir.join("pre-commit")).unwrap().contains(HOOK_MARKER));
    }

    #[test]
    fn test_install_git_hooks_outside_repo_fails() {
        let dir = tempdir().unwrap();
        assert!(install_git_hooks(dir.path(), false).is_err());
    }
}
