//! Unified configuration for phasegate.
//!
//! Settings are layered, later sources winning:
//! 1. `.phasegate/phasegate.toml`
//! 2. Environment variables (`PHASEGATE_RETENTION_DAYS`, `PHASEGATE_ENFORCE_GATES`, `PHASEGATE_SKIP`)
//! 3. CLI arguments
//!
//! # Example phasegate.toml
//!
//! ```toml
//! [project]
//! name = "my-service"
//!
//! [phases]
//! enforce_gates = true
//!
//! [phases.checkpoint_map]
//! post-merge = "P7"
//!
//! [phases.implementations.P3]
//! command = "./scripts/implement.sh"
//!
//! [artifacts]
//! retention_days = 14
//!
//! [checks]
//! min_agents = 2
//! ignore_staged = ["*.lock"]
//!
//! [checks.analyzers.tests]
//! command = "cargo test --quiet"
//!
//! [hooks.pre-push]
//! strategy = "retry"
//! timeout_secs = 600
//!
//! [fixers.format]
//! command = "cargo fmt"
//! ```

use crate::failure::ErrorCategory;
use crate::hooks::{CheckSettings, Checkpoint, HooksConfig, default_checkpoint_map};
use crate::phase::Phase;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The name of the phasegate data directory.
pub const DATA_DIR: &str = ".phasegate";

/// The configuration file inside the data directory.
pub const CONFIG_FILE: &str = "phasegate.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name shown in status output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A shell command registered as a phase implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationCommand {
    pub command: String,
    #[serde(default = "default_implementation_timeout")]
    pub timeout_secs: u64,
    /// Passed to the implementation as `config` in its context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<toml::Value>,
}

fn default_implementation_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasesSection {
    /// When false, only the edge table is checked on transitions
    #[serde(default = "default_true")]
    pub enforce_gates: bool,
    /// Checkpoint→phase overrides; unlisted checkpoints keep their default
    #[serde(default)]
    pub checkpoint_map: BTreeMap<Checkpoint, Phase>,
    #[serde(default)]
    pub implementations: BTreeMap<Phase, ImplementationCommand>,
}

impl Default for PhasesSection {
    fn default() -> Self {
        Self {
            enforce_gates: true,
            checkpoint_map: BTreeMap::new(),
            implementations: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsSection {
    /// Payloads larger than this are gzip-compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold_bytes: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Store each successful check pass as a `check_report` artifact
    #[serde(default = "default_true")]
    pub store_check_reports: bool,
}

fn default_compression_threshold() -> usize {
    4096
}

fn default_retention_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            compression_threshold_bytes: default_compression_threshold(),
            retention_days: default_retention_days(),
            store_check_reports: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    /// Retry state older than this is ignored
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
}

fn default_state_ttl() -> u64 {
    3600
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl(),
        }
    }
}

/// A shell command registered as the fixer for an error category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixerCommand {
    pub command: String,
    #[serde(default = "default_fixer_timeout")]
    pub timeout_secs: u64,
}

fn default_fixer_timeout() -> u64 {
    120
}

/// The complete phasegate.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhasegateToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub phases: PhasesSection,
    #[serde(default)]
    pub artifacts: ArtifactsSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub checks: CheckSettings,
    /// Per-checkpoint failure handling overrides
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub fixers: BTreeMap<ErrorCategory, FixerCommand>,
}

impl PhasegateToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse phasegate.toml")
    }

    /// Load `<data_dir>/phasegate.toml`, or defaults when it does not exist.
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize phasegate.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Default map with the `[phases.checkpoint_map]` overrides applied.
    pub fn checkpoint_map(&self) -> BTreeMap<Checkpoint, Phase> {
        let mut map = default_checkpoint_map();
        map.extend(self.phases.checkpoint_map.iter().map(|(c, p)| (*c, *p)));
        map
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.artifacts.retention_days == 0 {
            warnings.push("artifacts.retention_days is 0; cleanup removes every non-deployed artifact".to_string());
        }
        if self.retry.state_ttl_secs == 0 {
            warnings.push("retry.state_ttl_secs is 0; retry budgets never accumulate".to_string());
        }

        for (phase, implementation) in &self.phases.implementations {
            if implementation.command.trim().is_empty() {
                warnings.push(format!("Implementation for {} has an empty command", phase));
            }
        }
        for (category, fixer) in &self.fixers {
            if !category.is_fixable() {
                warnings.push(format!(
                    "Fixer for '{}' will never run; that category is not fixable",
                    category
                ));
            }
            if fixer.command.trim().is_empty() {
                warnings.push(format!("Fixer for '{}' has an empty command", category));
            }
        }

        let map = self.checkpoint_map();
        let mut seen: BTreeMap<Phase, Checkpoint> = BTreeMap::new();
        for (checkpoint, phase) in &map {
            if let Some(other) = seen.insert(*phase, *checkpoint) {
                warnings.push(format!(
                    "Checkpoints '{}' and '{}' both map to {}",
                    other, checkpoint, phase
                ));
            }
        }
        for (checkpoint, config) in self.hooks.resolved() {
            let phase = map.get(&checkpoint).copied().unwrap_or(checkpoint.default_phase());
            let known = crate::hooks::PhaseCheckSet::for_phase(phase).check_names();
            for gate in &config.required_gates {
                if !known.contains(&gate.as_str()) {
                    warnings.push(format!(
                        "Hook '{}' requires gate '{}', which {} does not run",
                        checkpoint, gate, phase
                    ));
                }
            }
        }

        warnings.extend(self.checks.validate());
        warnings.extend(self.hooks.validate());
        warnings
    }
}

/// Unified configuration for a phasegate session.
///
/// It merges settings from:
/// 1. phasegate.toml file
/// 2. Environment variables
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub project_dir: PathBuf,
    /// Path to the .phasegate directory
    pub data_dir: PathBuf,
    pub toml: PhasegateToml,
    pub verbose: bool,
    /// CLI override for artifacts.retention_days
    pub cli_retention_days: Option<u32>,
}

impl WorkflowConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let data_dir = project_dir.join(DATA_DIR);
        let toml = PhasegateToml::load_or_default(&data_dir)?;

        Ok(Self {
            project_dir,
            data_dir,
            toml,
            verbose: false,
            cli_retention_days: None,
        })
    }

    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        retention_days: Option<u32>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli_retention_days = retention_days;
        Ok(config)
    }

    /// Whether preconditions and gates are enforced (env can override file).
    pub fn enforce_gates(&self) -> bool {
        if let Ok(env_val) = std::env::var("PHASEGATE_ENFORCE_GATES") {
            return parse_flag(&env_val);
        }
        self.toml.phases.enforce_gates
    }

    /// Retention window (CLI → env → file).
    pub fn retention_days(&self) -> u32 {
        if let Some(days) = self.cli_retention_days {
            return days;
        }
        std::env::var("PHASEGATE_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.toml.artifacts.retention_days)
    }

    /// `PHASEGATE_SKIP=1` bypasses every checkpoint check.
    pub fn skip_checks(&self) -> bool {
        std::env::var("PHASEGATE_SKIP")
            .map(|v| parse_flag(&v))
            .unwrap_or(false)
    }

    pub fn checkpoint_map(&self) -> BTreeMap<Checkpoint, Phase> {
        self.toml.checkpoint_map()
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if let Ok(value) = std::env::var("PHASEGATE_RETENTION_DAYS")
            && value.trim().parse::<u32>().is_err()
        {
            warnings.push(format!(
                "PHASEGATE_RETENTION_DAYS='{}' is not a number and is ignored",
                value
            ));
        }
        warnings
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}
