//! Phase check sets and the pluggable quality-check registry.
//!
//! Each phase runs a fixed list of built-in checks (branch naming, staged
//! files, commit message format, ...) followed by analyzer sub-checks that
//! dispatch to the `CheckRegistry`. Analyzers run concurrently; results are
//! always reported in the documented order.

use super::executor::CommandExecutor;
use super::types::{Checkpoint, HookContext};
use super::vcs::VcsMetadata;
use crate::artifacts::ArtifactType;
use crate::failure::ErrorCategory;
use crate::phase::Phase;
use crate::util::panic_message;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const CODE_QUALITY: &str = "code_quality";
pub const SECURITY: &str = "security";
pub const TESTS: &str = "tests";
pub const PERFORMANCE: &str = "performance";
pub const REVIEW: &str = "review";
pub const DEPLOYMENT: &str = "deployment";

pub const DEFAULT_BRANCH_PATTERN: &str = r"^(main|master|develop|(feature|feat|fix|bugfix|hotfix|release|chore|docs|refactor|test)/[A-Za-z0-9._/-]+)$";
pub const DEFAULT_COMMIT_PATTERN: &str = r"^((feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert)(\([A-Za-z0-9._/-]+\))?!?: \S.*|Merge .+)$";

/// Result returned by a quality check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub success: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    /// Overrides the category derived from the check name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

impl CheckOutcome {
    pub fn passed() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(issues: Vec<String>) -> Self {
        Self {
            success: false,
            issues,
            category: None,
        }
    }
}

/// Everything a check may look at, also piped as JSON to command checks.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInput {
    pub phase: Phase,
    pub checkpoint: Checkpoint,
    pub context: HookContext,
    pub vcs: VcsMetadata,
    /// Content of the usable artifacts loaded for the phase
    pub artifacts: BTreeMap<ArtifactType, serde_json::Value>,
}

impl CheckInput {
    pub fn artifact(&self, artifact_type: ArtifactType) -> Option<&serde_json::Value> {
        self.artifacts.get(&artifact_type)
    }
}

#[async_trait]
pub trait QualityCheck: Send + Sync {
    async fn run(&self, input: &CheckInput) -> Result<CheckOutcome>;
}

/// A quality check backed by a shell command.
///
/// The `CheckInput` is written to stdin. A JSON `CheckOutcome` on stdout is
/// used as-is; otherwise the exit code decides and output lines become issues.
pub struct CommandCheck {
    name: String,
    command: String,
    executor: CommandExecutor,
    timeout: Duration,
}

impl CommandCheck {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        executor: CommandExecutor,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            executor,
            timeout,
        }
    }
}

#[async_trait]
impl QualityCheck for CommandCheck {
    async fn run(&self, input: &CheckInput) -> Result<CheckOutcome> {
        let env = [
            ("PHASEGATE_PHASE", input.phase.code().to_string()),
            ("PHASEGATE_CHECKPOINT", input.checkpoint.to_string()),
            ("PHASEGATE_CHECK", self.name.clone()),
        ];
        let output = self
            .executor
            .run(&self.command, input, self.timeout, &env)
            .await
            .with_context(|| format!("Failed to run analyzer '{}'", self.name))?;

        if let Some(outcome) = output.json::<CheckOutcome>() {
            return Ok(outcome);
        }
        if output.timed_out {
            return Ok(CheckOutcome {
                success: false,
                issues: vec![output.failure_reason(&format!("Analyzer '{}'", self.name))],
                category: Some(ErrorCategory::Timeout),
            });
        }
        if output.success() {
            return Ok(CheckOutcome::passed());
        }
        let mut issues = output.lines();
        if issues.is_empty() {
            issues.push(output.failure_reason(&format!("Analyzer '{}'", self.name)));
        }
        Ok(CheckOutcome::failed(issues))
    }
}

/// Analyzers by name.
#[derive(Default, Clone)]
pub struct CheckRegistry {
    checks: HashMap<String, Arc<dyn QualityCheck>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, check: Arc<dyn QualityCheck>) {
        self.checks.insert(name.into(), check);
    }

    pub fn has(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run one analyzer. Unregistered analyzers pass with a warning.
    pub async fn run(&self, name: &str, input: &CheckInput) -> SubCheck {
        let Some(check) = self.checks.get(name).cloned() else {
            return SubCheck::passed(name).with_warning(format!(
                "No analyzer registered for '{}'; check skipped",
                name
            ));
        };

        let outcome = AssertUnwindSafe(check.run(input)).catch_unwind().await;
        match outcome {
            Ok(Ok(outcome)) => SubCheck::from_outcome(name, outcome),
            Ok(Err(e)) => SubCheck::failed(
                name,
                ErrorCategory::Exception,
                vec![format!("Analyzer '{}' errored: {:#}", name, e)],
            ),
            Err(payload) => SubCheck::failed(
                name,
                ErrorCategory::Exception,
                vec![format!(
                    "Analyzer '{}' panicked: {}",
                    name,
                    panic_message(payload.as_ref())
                )],
            ),
        }
    }

    /// Run analyzers concurrently; results keep the order of `names`.
    pub async fn run_all(&self, names: &[&str], input: &CheckInput) -> Vec<SubCheck> {
        join_all(names.iter().map(|name| self.run(name, input))).await
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.names())
            .finish()
    }
}

/// Category a failing analyzer is tagged with when it does not say.
pub fn analyzer_category(name: &str) -> ErrorCategory {
    match name {
        CODE_QUALITY => ErrorCategory::Format,
        SECURITY => ErrorCategory::Security,
        TESTS => ErrorCategory::Test,
        PERFORMANCE => ErrorCategory::Performance,
        DEPLOYMENT => ErrorCategory::Dependency,
        other => ErrorCategory::normalize(other),
    }
}

/// One named sub-check within a phase check pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCheck {
    pub name: String,
    pub success: bool,
    pub category: ErrorCategory,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Fails the pass even when it is not listed in `required_gates`
    #[serde(default)]
    pub mandatory: bool,
}

impl SubCheck {
    pub fn passed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            category: ErrorCategory::Unknown,
            issues: Vec::new(),
            warnings: Vec::new(),
            mandatory: false,
        }
    }

    pub fn failed(name: &str, category: ErrorCategory, issues: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            category,
            issues,
            warnings: Vec::new(),
            mandatory: false,
        }
    }

    fn from_outcome(name: &str, outcome: CheckOutcome) -> Self {
        if outcome.success {
            let mut check = Self::passed(name);
            check.warnings = outcome.issues;
            return check;
        }
        let category = outcome.category.unwrap_or_else(|| {
            let default = analyzer_category(name);
            if default != ErrorCategory::Unknown {
                default
            } else {
                outcome
                    .issues
                    .first()
                    .map(|i| ErrorCategory::normalize(i))
                    .unwrap_or(ErrorCategory::Unknown)
            }
        });
        Self::failed(name, category, outcome.issues)
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// Built-in checks that need no external analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    BranchNaming,
    StagedFiles,
    MinAgents,
    ParallelExecution,
    CommitMessageFormat,
    NoConflicts,
}

impl BuiltinCheck {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinCheck::BranchNaming => "branch_naming",
            BuiltinCheck::StagedFiles => "staged_files",
            BuiltinCheck::MinAgents => "min_agents",
            BuiltinCheck::ParallelExecution => "parallel_execution",
            BuiltinCheck::CommitMessageFormat => "commit_message_format",
            BuiltinCheck::NoConflicts => "no_conflicts",
        }
    }
}

/// What a phase checks and which artifacts it reads.
#[derive(Debug, Clone, Copy)]
pub struct PhaseCheckSet {
    pub required_artifacts: &'static [ArtifactType],
    pub advisory_artifacts: &'static [ArtifactType],
    pub builtins: &'static [BuiltinCheck],
    pub analyzers: &'static [&'static str],
}

impl PhaseCheckSet {
    pub fn for_phase(phase: Phase) -> Self {
        use ArtifactType as A;
        use BuiltinCheck as B;
        match phase {
            Phase::Discovery => Self {
                required_artifacts: &[],
                advisory_artifacts: &[A::Requirements],
                builtins: &[],
                analyzers: &[],
            },
            Phase::Planning => Self {
                required_artifacts: &[],
                advisory_artifacts: &[A::Requirements, A::Plan],
                builtins: &[B::BranchNaming],
                analyzers: &[],
            },
            Phase::AgentSelection => Self {
                required_artifacts: &[],
                advisory_artifacts: &[A::AgentSelection],
                builtins: &[B::StagedFiles, B::MinAgents, B::ParallelExecution],
                analyzers: &[],
            },
            Phase::Implementation => Self {
                required_artifacts: &[],
                advisory_artifacts: &[A::Plan],
                builtins: &[B::CommitMessageFormat],
                analyzers: &[],
            },
            Phase::QualityGate => Self {
                required_artifacts: &[],
                advisory_artifacts: &[A::Code, A::TestResults],
                builtins: &[],
                analyzers: &[CODE_QUALITY, SECURITY, TESTS, PERFORMANCE],
            },
            Phase::Review => Self {
                required_artifacts: &[],
                advisory_artifacts: &[A::ReviewReport],
                builtins: &[],
                analyzers: &[REVIEW],
            },
            Phase::Integration => Self {
                required_artifacts: &[],
                advisory_artifacts: &[A::TestResults],
                builtins: &[B::NoConflicts],
                analyzers: &[TESTS],
            },
            Phase::Deployment => Self {
                required_artifacts: &[A::DeploymentConfig],
                advisory_artifacts: &[],
                builtins: &[],
                analyzers: &[DEPLOYMENT],
            },
        }
    }

    pub fn artifact_types(&self) -> impl Iterator<Item = (ArtifactType, bool)> + '_ {
        self.required_artifacts
            .iter()
            .map(|t| (*t, true))
            .chain(self.advisory_artifacts.iter().map(|t| (*t, false)))
    }

    pub fn artifact_type_list(&self) -> Vec<ArtifactType> {
        self.artifact_types().map(|(t, _)| t).collect()
    }

    /// Names of every sub-check this set can produce.
    pub fn check_names(&self) -> Vec<&'static str> {
        self.builtins
            .iter()
            .map(|b| b.name())
            .chain(self.analyzers.iter().copied())
            .collect()
    }
}

/// An analyzer backed by a shell command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerCommand {
    pub command: String,
    /// The hook timeout still applies when it is shorter
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_secs: u64,
}

fn default_analyzer_timeout() -> u64 {
    300
}

/// The `[checks]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSettings {
    #[serde(default = "default_min_agents")]
    pub min_agents: u32,
    #[serde(default = "default_branch_pattern")]
    pub branch_pattern: String,
    #[serde(default = "default_commit_pattern")]
    pub commit_pattern: String,
    #[serde(default = "default_max_subject_length")]
    pub max_subject_length: usize,
    /// Globs for staged paths that do not count as staged work
    #[serde(default)]
    pub ignore_staged: Vec<String>,
    #[serde(default)]
    pub analyzers: BTreeMap<String, AnalyzerCommand>,
}

fn default_min_agents() -> u32 {
    1
}

fn default_branch_pattern() -> String {
    DEFAULT_BRANCH_PATTERN.to_string()
}

fn default_commit_pattern() -> String {
    DEFAULT_COMMIT_PATTERN.to_string()
}

fn default_max_subject_length() -> usize {
    72
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            min_agents: default_min_agents(),
            branch_pattern: default_branch_pattern(),
            commit_pattern: default_commit_pattern(),
            max_subject_length: default_max_subject_length(),
            ignore_staged: Vec::new(),
            analyzers: BTreeMap::new(),
        }
    }
}

impl CheckSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Err(e) = Regex::new(&self.branch_pattern) {
            warnings.push(format!("Invalid checks.branch_pattern: {}", e));
        }
        if let Err(e) = Regex::new(&self.commit_pattern) {
            warnings.push(format!("Invalid checks.commit_pattern: {}", e));
        }
        for pattern in &self.ignore_staged {
            if let Err(e) = glob::Pattern::new(pattern) {
                warnings.push(format!("Invalid checks.ignore_staged glob '{}': {}", pattern, e));
            }
        }
        if self.max_subject_length == 0 {
            warnings.push("checks.max_subject_length is 0; every commit will fail".to_string());
        }
        for (name, analyzer) in &self.analyzers {
            if analyzer.command.trim().is_empty() {
                warnings.push(format!("Analyzer '{}' has an empty command", name));
            }
        }
        warnings
    }
}

/// Compiled built-in check settings.
#[derive(Debug, Clone)]
pub struct BuiltinChecks {
    branch_pattern: Regex,
    commit_pattern: Regex,
    max_subject_length: usize,
    min_agents: u32,
    ignore_staged: Vec<glob::Pattern>,
}

impl BuiltinChecks {
    pub fn from_settings(settings: &CheckSettings) -> Result<Self> {
        let ignore_staged = settings
            .ignore_staged
            .iter()
            .map(|p| glob::Pattern::new(p).with_context(|| format!("Invalid ignore_staged glob '{}'", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            branch_pattern: Regex::new(&settings.branch_pattern)
                .context("Invalid checks.branch_pattern")?,
            commit_pattern: Regex::new(&settings.commit_pattern)
                .context("Invalid checks.commit_pattern")?,
            max_subject_length: settings.max_subject_length,
            min_agents: settings.min_agents,
            ignore_staged,
        })
    }

    pub fn run(&self, check: BuiltinCheck, input: &CheckInput) -> SubCheck {
        let name = check.name();
        match check {
            BuiltinCheck::BranchNaming => self.branch_naming(name, input.vcs.branch.as_deref()),
            BuiltinCheck::StagedFiles => self.staged_files(name, &input.vcs.staged_files),
            BuiltinCheck::MinAgents => self.min_agents(name, input.artifact(ArtifactType::AgentSelection)),
            BuiltinCheck::ParallelExecution => {
                parallel_execution(name, input.artifact(ArtifactType::AgentSelection))
            }
            BuiltinCheck::CommitMessageFormat => self.commit_message(name, &input.context),
            BuiltinCheck::NoConflicts => {
                if input.vcs.has_conflicts {
                    SubCheck::failed(
                        name,
                        ErrorCategory::Dependency,
                        vec!["The index has unresolved merge conflicts".to_string()],
                    )
                } else {
                    SubCheck::passed(name)
                }
            }
        }
    }

    fn branch_naming(&self, name: &str, branch: Option<&str>) -> SubCheck {
        match branch {
            None => SubCheck::passed(name)
                .with_warning("Not on a branch; branch naming not checked"),
            Some(branch) if self.branch_pattern.is_match(branch) => SubCheck::passed(name),
            Some(branch) => SubCheck::failed(
                name,
                ErrorCategory::Format,
                vec![format!(
                    "Branch '{}' does not match naming pattern {}",
                    branch,
                    self.branch_pattern.as_str()
                )],
            ),
        }
    }

    fn staged_files(&self, name: &str, staged: &[std::path::PathBuf]) -> SubCheck {
        let counted = staged
            .iter()
            .filter(|path| !self.ignore_staged.iter().any(|p| p.matches_path(path)))
            .count();
        if counted > 0 {
            SubCheck::passed(name)
        } else if staged.is_empty() {
            SubCheck::failed(name, ErrorCategory::Unknown, vec!["No files are staged".to_string()])
        } else {
            SubCheck::failed(
                name,
                ErrorCategory::Unknown,
                vec![format!(
                    "All {} staged files match checks.ignore_staged",
                    staged.len()
                )],
            )
        }
    }

    fn min_agents(&self, name: &str, selection: Option<&serde_json::Value>) -> SubCheck {
        let Some(selection) = selection else {
            return SubCheck::passed(name)
                .with_warning("No agent_selection artifact; agent count not checked");
        };
        let count = agent_count(selection);
        if count >= self.min_agents as usize {
            SubCheck::passed(name)
        } else {
            SubCheck::failed(
                name,
                ErrorCategory::Dependency,
                vec![format!(
                    "Agent selection assigns {} agent(s); at least {} required",
                    count, self.min_agents
                )],
            )
        }
    }

    fn commit_message(&self, name: &str, context: &HookContext) -> SubCheck {
        let Some(message) = context.field_str("commit_message") else {
            return match context.field_str("commit_msg_file") {
                Some(file) => SubCheck::failed(
                    name,
                    ErrorCategory::Exception,
                    vec![format!("Could not read commit message file {}", file)],
                ),
                None => SubCheck::passed(name)
                    .with_warning("No commit message supplied; format not checked"),
            };
        };

        let Some(subject) = commit_subject(message) else {
            return SubCheck::failed(name, ErrorCategory::Format, vec!["Commit message is empty".to_string()]);
        };

        let mut issues = Vec::new();
        if !self.commit_pattern.is_match(subject) {
            issues.push(format!(
                "Commit subject '{}' does not match {}",
                subject,
                self.commit_pattern.as_str()
            ));
        }
        let length = subject.chars().count();
        if length > self.max_subject_length {
            issues.push(format!(
                "Commit subject is {} characters; limit is {}",
                length, self.max_subject_length
            ));
        }
        if issues.is_empty() {
            SubCheck::passed(name)
        } else {
            SubCheck::failed(name, ErrorCategory::Format, issues)
        }
    }
}

fn parallel_execution(name: &str, selection: Option<&serde_json::Value>) -> SubCheck {
    let Some(selection) = selection else {
        return SubCheck::passed(name)
            .with_warning("No agent_selection artifact; parallel execution flag not checked");
    };
    match selection.get("parallel_execution") {
        Some(serde_json::Value::Bool(_)) => SubCheck::passed(name),
        Some(other) => SubCheck::failed(
            name,
            ErrorCategory::Format,
            vec![format!("parallel_execution must be true or false, found {}", other)],
        ),
        None if agent_count(selection) > 1 => SubCheck::failed(
            name,
            ErrorCategory::Format,
            vec!["Several agents are assigned but parallel_execution is not declared".to_string()],
        ),
        None => SubCheck::passed(name),
    }
}

/// Number of agents in an agent_selection document.
///
/// Accepts `{"agents": [...]}`, `{"agent_count": n}` or a bare array.
pub fn agent_count(selection: &serde_json::Value) -> usize {
    if let Some(agents) = selection.get("agents").and_then(|a| a.as_array()) {
        return agents.len();
    }
    if let Some(n) = selection.get("agent_count").and_then(|n| n.as_u64()) {
        return n as usize;
    }
    selection.as_array().map(|a| a.len()).unwrap_or(0)
}

/// First line of a commit message that is neither blank nor a `#` comment.
pub fn commit_subject(message: &str) -> Option<&str> {
    message
        .lines()
        .map(str::trim_end)
        .find(|line| !line.trim().is_empty() && !line.starts_with('#'))
}

/// Aggregated result of one phase check pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub phase: Phase,
    pub checkpoint: Checkpoint,
    pub checks: Vec<SubCheck>,
    /// Pass-level warnings such as missing advisory artifacts
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub required_gates: Vec<String>,
}

impl CheckReport {
    pub fn new(phase: Phase, checkpoint: Checkpoint, required_gates: Vec<String>) -> Self {
        Self {
            phase,
            checkpoint,
            checks: Vec::new(),
            warnings: Vec::new(),
            required_gates,
        }
    }

    pub fn push(&mut self, check: SubCheck) {
        self.checks.push(check);
    }

    fn is_blocking(&self, check: &SubCheck) -> bool {
        !check.success
            && (check.mandatory
                || self.required_gates.is_empty()
                || self.required_gates.iter().any(|g| g == &check.name))
    }

    /// Failed sub-checks that fail the pass.
    pub fn blocking_failures(&self) -> Vec<&SubCheck> {
        self.checks.iter().filter(|c| self.is_blocking(c)).collect()
    }

    /// Failed sub-checks downgraded to warnings because they are not required gates.
    pub fn demoted_failures(&self) -> Vec<&SubCheck> {
        self.checks
            .iter()
            .filter(|c| !c.success && !self.is_blocking(c))
            .collect()
    }

    pub fn passed(&self) -> bool {
        self.blocking_failures().is_empty()
    }

    pub fn primary_category(&self) -> Option<ErrorCategory> {
        self.blocking_failures().first().map(|c| c.category)
    }

    /// `name: issue` for every blocking failure.
    pub fn issues(&self) -> Vec<String> {
        self.blocking_failures()
            .iter()
            .flat_map(|c| c.issues.iter().map(move |i| format!("{}: {}", c.name, i)))
            .collect()
    }

    pub fn all_warnings(&self) -> Vec<String> {
        let mut warnings = self.warnings.clone();
        for check in &self.checks {
            warnings.extend(check.warnings.iter().cloned());
        }
        for check in self.demoted_failures() {
            warnings.push(format!(
                "{} failed but is not a required gate: {}",
                check.name,
                check.issues.join("; ")
            ));
        }
        warnings
    }

    pub fn summary(&self) -> String {
        let failures = self.blocking_failures();
        if failures.is_empty() {
            return format!(
                "{} checks passed for {} {} ({} sub-checks)",
                self.checkpoint,
                self.phase.code(),
                self.phase.name(),
                self.checks.len()
            );
        }
        let names: Vec<String> = failures
            .iter()
            .map(|c| match c.issues.first() {
                Some(issue) => format!("{} ({})", c.name, issue),
                None => c.name.clone(),
            })
            .collect();
        format!(
            "{} of {} {} checks failed for {} {}: {}",
            failures.len(),
            self.checks.len(),
            self.checkpoint,
            self.phase.code(),
            self.phase.name(),
            names.join("; ")
        )
    }
}

/// Read the commit message named by `commit_msg_file`, relative to `project_dir`.
pub fn read_commit_message(project_dir: &Path, context: &HookContext) -> Option<String> {
    let file = context.field_str("commit_msg_file")?;
    let path = Path::new(file);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    };
    std::fs::read_to_string(&path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn input(phase: Phase, checkpoint: Checkpoint) -> CheckInput {
        CheckInput {
            phase,
            checkpoint,
            context: HookContext::new(checkpoint),
            vcs: VcsMetadata::default(),
            artifacts: BTreeMap::new(),
        }
    }

    fn builtins() -> BuiltinChecks {
        BuiltinChecks::from_settings(&CheckSettings::default()).unwrap()
    }

    struct Fixed(CheckOutcome);

    #[async_trait]
    impl QualityCheck for Fixed {
        async fn run(&self, _input: &CheckInput) -> Result<CheckOutcome> {
            Ok(self.0.clone())
        }
    }

    struct Slow(Duration, bool);

    #[async_trait]
    impl QualityCheck for Slow {
        async fn run(&self, _input: &CheckInput) -> Result<CheckOutcome> {
            tokio::time::sleep(self.0).await;
            Ok(if self.1 {
                CheckOutcome::passed()
            } else {
                CheckOutcome::failed(vec!["slow failure".into()])
            })
        }
    }

    #[test]
    fn test_branch_naming() {
        let checks = builtins();
        let mut i = input(Phase::Planning, Checkpoint::PostCheckout);
        i.vcs.branch = Some("feature/login-form".into());
        assert!(checks.run(BuiltinCheck::BranchNaming, &i).success);

        i.vcs.branch = Some("my-random-branch".into());
        let result = checks.run(BuiltinCheck::BranchNaming, &i);
        assert!(!result.success);
        assert_eq!(result.category, ErrorCategory::Format);

        i.vcs.branch = None;
        let detached = checks.run(BuiltinCheck::BranchNaming, &i);
        assert!(detached.success);
        assert_eq!(detached.warnings.len(), 1);
    }

    #[test]
    fn test_commit_message_format() {
        let checks = builtins();
        let mut i = input(Phase::Implementation, Checkpoint::CommitMsg);

        i.context = HookContext::new(Checkpoint::CommitMsg)
            .with_field("commit_message", "# comment\n\nfeat(auth): add login\n\nbody");
        assert!(checks.run(BuiltinCheck::CommitMessageFormat, &i).success);

        i.context = HookContext::new(Checkpoint::CommitMsg).with_field("commit_message", "added stuff");
        assert!(!checks.run(BuiltinCheck::CommitMessageFormat, &i).success);

        let long = format!("fix: {}", "x".repeat(80));
        i.context = HookContext::new(Checkpoint::CommitMsg).with_field("commit_message", long);
        let result = checks.run(BuiltinCheck::CommitMessageFormat, &i);
        assert!(result.issues.iter().any(|m| m.contains("limit is 72")));

        i.context = HookContext::new(Checkpoint::CommitMsg).with_field("commit_message", "# only comments\n");
        assert!(!checks.run(BuiltinCheck::CommitMessageFormat, &i).success);

        i.context = HookContext::new(Checkpoint::CommitMsg).with_field("commit_message", "Merge branch 'main' into feature/x");
        assert!(checks.run(BuiltinCheck::CommitMessageFormat, &i).success);
    }

    #[test]
    fn test_unreadable_commit_file_fails() {
        let checks = builtins();
        let mut i = input(Phase::Implementation, Checkpoint::CommitMsg);
        i.context = HookContext::new(Checkpoint::CommitMsg).with_field("commit_msg_file", "/nonexistent/MSG");
        let result = checks.run(BuiltinCheck::CommitMessageFormat, &i);
        assert!(!result.success);
        assert_eq!(result.category, ErrorCategory::Exception);
    }

    #[test]
    fn test_staged_files_respects_ignore_globs() {
        let settings = CheckSettings {
            ignore_staged: vec!["*.lock".into(), "docs/**".into()],
            ..Default::default()
        };
        let checks = BuiltinChecks::from_settings(&settings).unwrap();
        let mut i = input(Phase::AgentSelection, Checkpoint::PreCommit);

        assert!(!checks.run(BuiltinCheck::StagedFiles, &i).success);

        i.vcs.staged_files = vec![PathBuf::from("Cargo.lock"), PathBuf::from("docs/intro.md")];
        let ignored = checks.run(BuiltinCheck::StagedFiles, &i);
        assert!(!ignored.success);
        assert!(ignored.issues[0].contains("ignore_staged"));

        i.vcs.staged_files.push(PathBuf::from("src/lib.rs"));
        assert!(checks.run(BuiltinCheck::StagedFiles, &i).success);
    }

    #[test]
    fn test_agent_selection_checks() {
        let settings = CheckSettings {
            min_agents: 2,
            ..Default::default()
        };
        let checks = BuiltinChecks::from_settings(&settings).unwrap();
        let mut i = input(Phase::AgentSelection, Checkpoint::PreCommit);

        let missing = checks.run(BuiltinCheck::MinAgents, &i);
        assert!(missing.success);
        assert!(!missing.warnings.is_empty());

        i.artifacts.insert(ArtifactType::AgentSelection, json!({"agents": ["backend"]}));
        assert!(!checks.run(BuiltinCheck::MinAgents, &i).success);
        assert!(checks.run(BuiltinCheck::ParallelExecution, &i).success);

        i.artifacts.insert(ArtifactType::AgentSelection, json!({"agents": ["backend", "frontend"]}));
        assert!(checks.run(BuiltinCheck::MinAgents, &i).success);
        assert!(!checks.run(BuiltinCheck::ParallelExecution, &i).success);

        i.artifacts.insert(
            ArtifactType::AgentSelection,
            json!({"agents": ["backend", "frontend"], "parallel_execution": true}),
        );
        assert!(checks.run(BuiltinCheck::ParallelExecution, &i).success);

        i.artifacts.insert(ArtifactType::AgentSelection, json!({"agent_count": 3, "parallel_execution": "yes"}));
        assert!(checks.run(BuiltinCheck::MinAgents, &i).success);
        assert!(!checks.run(BuiltinCheck::ParallelExecution, &i).success);
    }

    #[test]
    fn test_check_set_tables() {
        let p4 = PhaseCheckSet::for_phase(Phase::QualityGate);
        assert_eq!(p4.analyzers, &[CODE_QUALITY, SECURITY, TESTS, PERFORMANCE]);
        let p7 = PhaseCheckSet::for_phase(Phase::Deployment);
        assert_eq!(p7.required_artifacts, &[ArtifactType::DeploymentConfig]);
        assert!(PhaseCheckSet::for_phase(Phase::Discovery).check_names().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_analyzer_passes_with_warning() {
        let registry = CheckRegistry::new();
        let result = registry.run(SECURITY, &input(Phase::QualityGate, Checkpoint::PrePush)).await;
        assert!(result.success);
        assert!(result.warnings[0].contains("No analyzer registered"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_keeps_documented_order() {
        let mut registry = CheckRegistry::new();
        registry.register(CODE_QUALITY, Arc::new(Slow(Duration::from_secs(3), true)));
        registry.register(SECURITY, Arc::new(Slow(Duration::from_secs(1), false)));
        registry.register(TESTS, Arc::new(Fixed(CheckOutcome::passed())));

        let names = [CODE_QUALITY, SECURITY, TESTS, PERFORMANCE];
        let results = registry
            .run_all(&names, &input(Phase::QualityGate, Checkpoint::PrePush))
            .await;

        let order: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, names.to_vec());
        assert!(!results[1].success);
        assert_eq!(results[1].category, ErrorCategory::Security);
        assert!(results[3].success);
    }

    #[test]
    fn test_required_gates_demote_other_failures() {
        let mut report = CheckReport::new(Phase::QualityGate, Checkpoint::PrePush, vec![TESTS.into()]);
        report.push(SubCheck::passed(TESTS));
        report.push(SubCheck::failed(PERFORMANCE, ErrorCategory::Performance, vec!["p99 regressed".into()]));
        assert!(report.passed());
        assert!(report.all_warnings().iter().any(|w| w.contains("p99 regressed")));

        report.push(SubCheck::failed("required_artifacts", ErrorCategory::Dependency, vec!["missing".into()]).mandatory());
        assert!(!report.passed());
        assert_eq!(report.primary_category(), Some(ErrorCategory::Dependency));
    }

    #[test]
    fn test_summary_names_failures() {
        let mut report = CheckReport::new(Phase::QualityGate, Checkpoint::PrePush, vec![]);
        report.push(SubCheck::passed(CODE_QUALITY));
        report.push(SubCheck::failed(SECURITY, ErrorCategory::Security, vec!["CVE-2024-1".into()]));
        let summary = report.summary();
        assert!(summary.contains("1 of 2"));
        assert!(summary.contains("security (CVE-2024-1)"));
        assert_eq!(report.issues(), vec!["security: CVE-2024-1".to_string()]);
    }

    #[tokio::test]
    async fn test_command_check_outcomes() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new(dir.path());
        let i = input(Phase::QualityGate, Checkpoint::PrePush);

        let ok = CommandCheck::new(TESTS, "test \"$PHASEGATE_PHASE\" = P4", executor.clone(), Duration::from_secs(5));
        assert!(ok.run(&i).await.unwrap().success);

        let failing = CommandCheck::new(TESTS, "echo '2 tests failed'; exit 1", executor.clone(), Duration::from_secs(5));
        let outcome = failing.run(&i).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.issues, vec!["2 tests failed".to_string()]);

        let json_check = CommandCheck::new(
            SECURITY,
            r#"echo '{"success": false, "issues": ["leaked key"], "category": "security"}'"#,
            executor,
            Duration::from_secs(5),
        );
        let outcome = json_check.run(&i).await.unwrap();
        assert_eq!(outcome.category, Some(ErrorCategory::Security));
    }
}
