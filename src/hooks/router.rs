//! Maps git checkpoints to phases and runs each phase's check set.

use super::checks::{BuiltinChecks, CheckInput, CheckRegistry, CheckReport, CheckSettings, PhaseCheckSet, SubCheck, read_commit_message};
use super::config::{HookConfig, HooksConfig};
use super::types::{Checkpoint, HookContext, HookResult};
use super::vcs::{VcsMetadata, collect_metadata};
use crate::artifacts::{ArtifactContent, ArtifactMetadata, ArtifactStore, ArtifactType};
use crate::failure::{CheckpointRunner, ErrorCategory, FixRequest, FixerRegistry, RetryStateStore};
use crate::phase::{Phase, PhaseEngine};
use crate::storage::Journal;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One line of `logs/executions.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub checkpoint: Checkpoint,
    pub phase: Option<Phase>,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Default checkpoint→phase mapping.
pub fn default_checkpoint_map() -> BTreeMap<Checkpoint, Phase> {
    Checkpoint::all()
        .iter()
        .map(|c| (*c, c.default_phase()))
        .collect()
}

pub struct HookRouter {
    project_dir: PathBuf,
    engine: Arc<PhaseEngine>,
    store: Arc<ArtifactStore>,
    retry_state: Arc<RetryStateStore>,
    fixers: Arc<FixerRegistry>,
    checkpoint_map: BTreeMap<Checkpoint, Phase>,
    hooks: HooksConfig,
    checks: CheckRegistry,
    builtins: BuiltinChecks,
    executions: Journal<ExecutionRecord>,
    store_check_reports: bool,
    skip: bool,
}

struct Evaluation {
    report: CheckReport,
    fixes: Vec<serde_json::Value>,
    artifact_ids: Vec<String>,
}

impl HookRouter {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        logs_dir: impl Into<PathBuf>,
        engine: Arc<PhaseEngine>,
        store: Arc<ArtifactStore>,
        retry_state: Arc<RetryStateStore>,
        fixers: Arc<FixerRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            project_dir: project_dir.into(),
            engine,
            store,
            retry_state,
            fixers,
            checkpoint_map: default_checkpoint_map(),
            hooks: HooksConfig::default(),
            checks: CheckRegistry::new(),
            builtins: BuiltinChecks::from_settings(&CheckSettings::default())?,
            executions: Journal::new(logs_dir.into().join("executions.jsonl")),
            store_check_reports: true,
            skip: false,
        })
    }

    pub fn with_checkpoint_map(mut self, map: BTreeMap<Checkpoint, Phase>) -> Self {
        self.checkpoint_map = map;
        self
    }

    pub fn with_hooks(mut self, hooks: HooksConfig) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_checks(mut self, checks: CheckRegistry) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_settings(mut self, settings: &CheckSettings) -> Result<Self> {
        self.builtins = BuiltinChecks::from_settings(settings)?;
        Ok(self)
    }

    pub fn with_check_reports(mut self, enabled: bool) -> Self {
        self.store_check_reports = enabled;
        self
    }

    /// Bypass every check (`PHASEGATE_SKIP=1`).
    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn phase_for(&self, checkpoint: Checkpoint) -> Option<Phase> {
        self.checkpoint_map.get(&checkpoint).copied()
    }

    pub fn execution_log(&self) -> &Journal<ExecutionRecord> {
        &self.executions
    }

    /// Run the checks of the phase mapped to `checkpoint`.
    ///
    /// Check failures come back as a failed `HookResult`; errors are reserved
    /// for broken local state such as a corrupt artifact index.
    pub async fn execute_workflow_hook(
        &self,
        checkpoint: Checkpoint,
        context: &HookContext,
    ) -> Result<HookResult> {
        let started = Instant::now();
        let phase = self.phase_for(checkpoint);

        let outcome = match phase {
            _ if self.skip => Ok(HookResult::success(format!("{} checks bypassed", checkpoint))
                .with_warning("PHASEGATE_SKIP is set; no checks were run")),
            None => Ok(HookResult::failure(
                format!("No phase is mapped to checkpoint {}", checkpoint),
                ErrorCategory::Unknown,
            )),
            Some(phase) => self.run_phase_checks(checkpoint, phase, context).await,
        };

        let (success, message) = match &outcome {
            Ok(result) => (result.success, result.message.clone()),
            Err(e) => (false, format!("{:#}", e)),
        };
        let record = ExecutionRecord {
            timestamp: Utc::now(),
            checkpoint,
            phase,
            success,
            message,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        if let Err(e) = self.executions.append(&record) {
            warn!(checkpoint = %checkpoint, error = %format!("{:#}", e), "Failed to append execution log");
        }
        outcome
    }

    /// Artifacts a run of `checkpoint` would load, under this router's checkpoint map.
    pub fn artifacts_for(&self, checkpoint: Checkpoint) -> Result<Vec<ArtifactMetadata>> {
        let Some(phase) = self.phase_for(checkpoint) else {
            return Ok(Vec::new());
        };
        let types = PhaseCheckSet::for_phase(phase).artifact_type_list();
        Ok(self.store.latest_usable_of(&types)?)
    }

    async fn run_phase_checks(
        &self,
        checkpoint: Checkpoint,
        phase: Phase,
        context: &HookContext,
    ) -> Result<HookResult> {
        let config = self.hooks.for_checkpoint(checkpoint);
        let mut context = context.clone();
        if context.field_str("commit_message").is_none()
            && let Some(message) = read_commit_message(&self.project_dir, &context)
        {
            context = context.with_field("commit_message", message);
        }
        let vcs = collect_metadata(&self.project_dir);

        info!(checkpoint = %checkpoint, phase = %phase, "Running phase checks");
        let evaluation = match tokio::time::timeout(
            config.timeout(),
            self.evaluate(checkpoint, phase, &context, vcs, &config),
        )
        .await
        {
            Ok(evaluation) => evaluation?,
            Err(_) => {
                warn!(checkpoint = %checkpoint, timeout_secs = config.timeout_secs, "Phase checks timed out");
                return Ok(HookResult::failure(
                    format!(
                        "{} checks for {} timed out after {}s",
                        checkpoint,
                        phase.code(),
                        config.timeout_secs
                    ),
                    ErrorCategory::Timeout,
                ));
            }
        };

        let Evaluation {
            report,
            fixes,
            artifact_ids,
        } = evaluation;
        let warnings = report.all_warnings();
        let mut details = json!({
            "phase": phase.code(),
            "checks": report.checks,
            "warnings": warnings,
        });
        if !fixes.is_empty() {
            details["fixes"] = json!(fixes);
        }

        if !report.passed() {
            details["failures"] = json!(report.issues());
            let category = report.primary_category().unwrap_or(ErrorCategory::Unknown);
            return Ok(HookResult::failure(report.summary(), category).with_details(details));
        }

        self.record_success(checkpoint, phase, &report, artifact_ids);
        let mut result = HookResult::success(report.summary()).with_details(details);
        if !warnings.is_empty() {
            result = result.with_warning(warnings.join("; "));
        }
        Ok(result)
    }

    /// Check pass, then at most one fix pass and one re-run.
    async fn evaluate(
        &self,
        checkpoint: Checkpoint,
        phase: Phase,
        context: &HookContext,
        vcs: VcsMetadata,
        config: &HookConfig,
    ) -> Result<Evaluation> {
        let (input, mut report, artifact_ids) = self.prepare(checkpoint, phase, context, vcs, config)?;
        self.run_checks(phase, &input, &mut report).await;

        let mut fixes = Vec::new();
        if report.passed() {
            return Ok(Evaluation {
                report,
                fixes,
                artifact_ids,
            });
        }

        let attempts = self.retry_state.attempts(checkpoint.as_str())?;
        if attempts >= config.retry.max_attempts {
            debug!(checkpoint = %checkpoint, attempts, "Retry budget spent; skipping fix pass");
            return Ok(Evaluation {
                report,
                fixes,
                artifact_ids,
            });
        }

        let mut fixed_any = false;
        let mut seen: Vec<ErrorCategory> = Vec::new();
        for failure in report.blocking_failures() {
            if seen.contains(&failure.category) {
                continue;
            }
            seen.push(failure.category);
            let request = FixRequest {
                hook: checkpoint.as_str().to_string(),
                category: failure.category,
                message: report.summary(),
                issues: failure.issues.clone(),
            };
            if let Some(outcome) = self.fixers.apply(&request).await {
                fixed_any |= outcome.success;
                fixes.push(json!({
                    "category": failure.category,
                    "success": outcome.success,
                    "message": outcome.message,
                }));
            }
        }

        if fixed_any {
            info!(checkpoint = %checkpoint, "Re-running checks after auto-fix");
            let mut rerun = CheckReport::new(phase, checkpoint, config.required_gates.clone());
            rerun.warnings = report.warnings.clone();
            rerun.checks = report.checks.iter().filter(|c| c.mandatory).cloned().collect();
            self.run_checks(phase, &input, &mut rerun).await;
            report = rerun;
        }

        Ok(Evaluation {
            report,
            fixes,
            artifact_ids,
        })
    }

    /// Load the phase's artifacts and build the check input.
    fn prepare(
        &self,
        checkpoint: Checkpoint,
        phase: Phase,
        context: &HookContext,
        vcs: VcsMetadata,
        config: &HookConfig,
    ) -> Result<(CheckInput, CheckReport, Vec<String>)> {
        let set = PhaseCheckSet::for_phase(phase);
        let mut report = CheckReport::new(phase, checkpoint, config.required_gates.clone());
        let mut artifacts: BTreeMap<ArtifactType, serde_json::Value> = BTreeMap::new();
        let mut artifact_ids = Vec::new();
        let mut missing_required = Vec::new();

        for (artifact_type, required) in set.artifact_types() {
            match self.store.latest(artifact_type, true)? {
                Some(meta) => {
                    let artifact = self.store.retrieve(&meta.id)?;
                    let value = match artifact.content {
                        ArtifactContent::Json { value, .. } => value,
                        other => serde_json::Value::String(other.as_text()),
                    };
                    artifacts.insert(artifact_type, value);
                    artifact_ids.push(meta.id);
                }
                None if required => missing_required.push(artifact_type),
                None => report.warnings.push(format!(
                    "No validated {} artifact; {} checks run without it",
                    artifact_type,
                    phase.code()
                )),
            }
        }

        if !missing_required.is_empty() {
            let issues = missing_required
                .iter()
                .map(|t| format!("A validated {} artifact is required for {} {}", t, phase.code(), phase.name()))
                .collect();
            report.push(SubCheck::failed("required_artifacts", ErrorCategory::Dependency, issues).mandatory());
        }

        let input = CheckInput {
            phase,
            checkpoint,
            context: context.clone(),
            vcs,
            artifacts,
        };
        Ok((input, report, artifact_ids))
    }

    async fn run_checks(&self, phase: Phase, input: &CheckInput, report: &mut CheckReport) {
        let set = PhaseCheckSet::for_phase(phase);
        for builtin in set.builtins {
            report.push(self.builtins.run(*builtin, input));
        }
        for check in self.checks.run_all(set.analyzers, input).await {
            report.push(check);
        }
    }

    fn record_success(
        &self,
        checkpoint: Checkpoint,
        phase: Phase,
        report: &CheckReport,
        artifact_ids: Vec<String>,
    ) {
        let key = format!("checkpoint.{}", checkpoint);
        if let Err(e) = self.engine.record_evidence(&key, json!(Utc::now().to_rfc3339())) {
            warn!(checkpoint = %checkpoint, error = %format!("{:#}", e), "Failed to record checkpoint evidence");
        }

        if !self.store_check_reports {
            return;
        }
        let content = match serde_json::to_value(report) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to serialize check report");
                return;
            }
        };
        let name = format!("{}-{}", checkpoint, phase.code());
        let tags = vec![checkpoint.to_string(), phase.code().to_string()];
        match self
            .store
            .store(ArtifactType::CheckReport, &name, content, tags, artifact_ids)
        {
            Ok(id) => debug!(id = %id, "Stored check report"),
            Err(e) => warn!(checkpoint = %checkpoint, error = %e, "Failed to store check report"),
        }
    }
}

#[async_trait]
impl CheckpointRunner for HookRouter {
    async fn run_checkpoint(&self, checkpoint: Checkpoint, context: &HookContext) -> Result<HookResult> {
        self.execute_workflow_hook(checkpoint, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactFilter, ArtifactStatus};
    use crate::failure::{FixOutcome, Fixer};
    use crate::hooks::checks::{CheckOutcome, QualityCheck, SECURITY, TESTS};
    use crate::hooks::config::HookOverride;
    use crate::phase::TransitionRules;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    struct Harness {
        _dir: TempDir,
        project: PathBuf,
        engine: Arc<PhaseEngine>,
        store: Arc<ArtifactStore>,
        retry_state: Arc<RetryStateStore>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let project = dir.path().to_path_buf();
            let data = project.join(".phasegate");
            Self {
                engine: Arc::new(PhaseEngine::new(&data, TransitionRules::standard())),
                store: Arc::new(ArtifactStore::new(data.join("artifacts"), 4096)),
                retry_state: Arc::new(RetryStateStore::new(&data, 3600)),
                project,
                _dir: dir,
            }
        }

        fn router(&self, fixers: FixerRegistry) -> HookRouter {
            HookRouter::new(
                &self.project,
                self.project.join(".phasegate/logs"),
                self.engine.clone(),
                self.store.clone(),
                self.retry_state.clone(),
                Arc::new(fixers),
            )
            .unwrap()
        }

        fn validated(&self, artifact_type: ArtifactType, content: serde_json::Value) -> String {
            let id = self.store.store(artifact_type, "fixture", content, vec![], vec![]).unwrap();
            self.store.update_status(&id, ArtifactStatus::Validated).unwrap();
            id
        }
    }

    struct Fixed(CheckOutcome);

    #[async_trait]
    impl QualityCheck for Fixed {
        async fn run(&self, _input: &CheckInput) -> Result<CheckOutcome> {
            Ok(self.0.clone())
        }
    }

    /// Fails until its flag is set by `FlagFixer`.
    struct Toggle(Arc<AtomicBool>);

    #[async_trait]
    impl QualityCheck for Toggle {
        async fn run(&self, _input: &CheckInput) -> Result<CheckOutcome> {
            Ok(if self.0.load(Ordering::SeqCst) {
                CheckOutcome::passed()
            } else {
                CheckOutcome::failed(vec!["3 files need formatting".into()])
            })
        }
    }

    struct FlagFixer(Arc<AtomicBool>);

    #[async_trait]
    impl Fixer for FlagFixer {
        fn name(&self) -> &str {
            "flag"
        }

        async fn fix(&self, _request: &FixRequest) -> Result<FixOutcome> {
            self.0.store(true, Ordering::SeqCst);
            Ok(FixOutcome::fixed("formatted"))
        }
    }

    struct Hang;

    #[async_trait]
    impl QualityCheck for Hang {
        async fn run(&self, _input: &CheckInput) -> Result<CheckOutcome> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(CheckOutcome::passed())
        }
    }

    fn failing(issue: &str) -> Arc<dyn QualityCheck> {
        Arc::new(Fixed(CheckOutcome::failed(vec![issue.to_string()])))
    }

    #[tokio::test]
    async fn test_commit_msg_success_records_evidence_and_report() {
        let h = Harness::new();
        let msg = h.project.join("COMMIT_EDITMSG");
        std::fs::write(&msg, "feat(router): map checkpoints\n").unwrap();
        let router = h.router(FixerRegistry::new());

        let context = HookContext::from_git_args(Checkpoint::CommitMsg, &["COMMIT_EDITMSG".to_string()]);
        let result = router.execute_workflow_hook(Checkpoint::CommitMsg, &context).await.unwrap();

        assert!(result.success, "{}", result.message);
        assert!(h.engine.state().unwrap().evidence_flag("checkpoint.commit-msg"));
        let reports = h
            .store
            .list(&ArtifactFilter::of_type(ArtifactType::CheckReport))
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "commit-msg-P3");
        // plan is advisory for P3
        assert!(result.warning.unwrap().contains("plan"));

        let log = router.execution_log().read_all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].phase, Some(Phase::Implementation));
        assert!(log[0].success);
    }

    #[tokio::test]
    async fn test_bad_commit_message_fails_with_format() {
        let h = Harness::new();
        let router = h.router(FixerRegistry::new()).with_check_reports(false);
        let context = HookContext::new(Checkpoint::CommitMsg).with_field("commit_message", "wip");

        let result = router.execute_workflow_hook(Checkpoint::CommitMsg, &context).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorCategory::Format));
        let failures = &result.details.unwrap()["failures"];
        assert!(failures[0].as_str().unwrap().starts_with("commit_message_format:"));
        assert!(!h.engine.state().unwrap().evidence_flag("checkpoint.commit-msg"));
    }

    #[tokio::test]
    async fn test_deployment_requires_validated_config() {
        let h = Harness::new();
        let mut map = default_checkpoint_map();
        map.insert(Checkpoint::PostMerge, Phase::Deployment);
        let router = h.router(FixerRegistry::new()).with_checkpoint_map(map);
        let context = HookContext::new(Checkpoint::PostMerge);

        let missing = router.execute_workflow_hook(Checkpoint::PostMerge, &context).await.unwrap();
        assert!(!missing.success);
        assert_eq!(missing.error_type, Some(ErrorCategory::Dependency));

        // drafts do not count
        h.store
            .store(ArtifactType::DeploymentConfig, "prod", json!({"replicas": 3}), vec![], vec![])
            .unwrap();
        let draft_only = router.execute_workflow_hook(Checkpoint::PostMerge, &context).await.unwrap();
        assert!(!draft_only.success);

        let config_id = h.validated(ArtifactType::DeploymentConfig, json!({"replicas": 3}));
        let ok = router.execute_workflow_hook(Checkpoint::PostMerge, &context).await.unwrap();
        assert!(ok.success, "{}", ok.message);
        assert!(ok.warning.unwrap().contains("No analyzer registered for 'deployment'"));

        let report = h.store.latest(ArtifactType::CheckReport, false).unwrap().unwrap();
        assert_eq!(report.dependencies, vec![config_id]);
    }

    #[tokio::test]
    async fn test_quality_gate_analyzer_failure_and_required_gates() {
        let h = Harness::new();
        let mut checks = CheckRegistry::new();
        checks.register(SECURITY, failing("hardcoded credential in config.rs"));
        checks.register(TESTS, Arc::new(Fixed(CheckOutcome::passed())));

        let router = h.router(FixerRegistry::new()).with_checks(checks.clone());
        let context = HookContext::new(Checkpoint::PrePush);
        let result = router.execute_workflow_hook(Checkpoint::PrePush, &context).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorCategory::Security));

        let hooks = HooksConfig {
            overrides: [(
                Checkpoint::PrePush,
                HookOverride {
                    required_gates: Some(vec![TESTS.to_string()]),
                    ..Default::default()
                },
            )]
            .into_iter()
            .collect(),
        };
        let gated = h.router(FixerRegistry::new()).with_checks(checks).with_hooks(hooks);
        let result = gated.execute_workflow_hook(Checkpoint::PrePush, &context).await.unwrap();
        assert!(result.success);
        assert!(result.warning.unwrap().contains("hardcoded credential"));
    }

    #[tokio::test]
    async fn test_fix_pass_then_rerun() {
        let h = Harness::new();
        let flag = Arc::new(AtomicBool::new(false));
        let mut checks = CheckRegistry::new();
        checks.register("code_quality", Arc::new(Toggle(flag.clone())));
        let mut fixers = FixerRegistry::new();
        fixers.register(ErrorCategory::Format, Arc::new(FlagFixer(flag.clone())));

        let router = h.router(fixers).with_checks(checks);
        let result = router
            .execute_workflow_hook(Checkpoint::PrePush, &HookContext::new(Checkpoint::PrePush))
            .await
            .unwrap();

        assert!(result.success, "{}", result.message);
        let fixes = &result.details.unwrap()["fixes"];
        assert_eq!(fixes[0]["category"], "format");
        assert_eq!(fixes[0]["success"], true);
    }

    #[tokio::test]
    async fn test_no_fix_pass_when_budget_spent() {
        let h = Harness::new();
        let flag = Arc::new(AtomicBool::new(false));
        let mut checks = CheckRegistry::new();
        checks.register("code_quality", Arc::new(Toggle(flag.clone())));
        let mut fixers = FixerRegistry::new();
        fixers.register(ErrorCategory::Format, Arc::new(FlagFixer(flag.clone())));
        h.retry_state.increment("pre-push", Some(ErrorCategory::Format)).unwrap();
        h.retry_state.increment("pre-push", Some(ErrorCategory::Format)).unwrap();

        let router = h.router(fixers).with_checks(checks);
        let result = router
            .execute_workflow_hook(Checkpoint::PrePush, &HookContext::new(Checkpoint::PrePush))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_timeout_failure() {
        let h = Harness::new();
        let mut checks = CheckRegistry::new();
        checks.register(TESTS, Arc::new(Hang));
        let hooks = HooksConfig {
            overrides: [(
                Checkpoint::PrePush,
                HookOverride {
                    timeout_secs: Some(5),
                    ..Default::default()
                },
            )]
            .into_iter()
            .collect(),
        };
        let router = h.router(FixerRegistry::new()).with_checks(checks).with_hooks(hooks);

        let result = router
            .execute_workflow_hook(Checkpoint::PrePush, &HookContext::new(Checkpoint::PrePush))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorCategory::Timeout));
        assert!(result.message.contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn test_skip_and_unmapped() {
        let h = Harness::new();
        let skipping = h.router(FixerRegistry::new()).with_skip(true);
        let result = skipping
            .execute_workflow_hook(Checkpoint::PrePush, &HookContext::new(Checkpoint::PrePush))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.warning.is_some());

        let unmapped = h.router(FixerRegistry::new()).with_checkpoint_map(BTreeMap::new());
        let result = unmapped
            .execute_workflow_hook(Checkpoint::PrePush, &HookContext::new(Checkpoint::PrePush))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("No phase is mapped"));
    }

    #[tokio::test]
    async fn test_corrupt_index_is_logged_then_returned() {
        let h = Harness::new();
        let index = h.project.join(".phasegate/artifacts/index.json");
        std::fs::create_dir_all(index.parent().unwrap()).unwrap();
        std::fs::write(&index, "{not json").unwrap();
        let router = h.router(FixerRegistry::new());

        let result = router
            .execute_workflow_hook(Checkpoint::PrePush, &HookContext::new(Checkpoint::PrePush))
            .await;
        assert!(result.is_err());

        let log = router.execution_log().read_all().unwrap();
        assert_eq!(log.len(), 1);
        assert!(!log[0].success);
        assert_eq!(log[0].phase, Some(Phase::QualityGate));
        assert!(log[0].message.contains("index"), "{}", log[0].message);
    }

    #[tokio::test]
    async fn test_artifacts_for_matches_what_checks_load() {
        let h = Harness::new();
        let code = h.validated(ArtifactType::Code, json!({"files": ["src/lib.rs"]}));
        let results = h
            .store
            .store(ArtifactType::TestResults, "run", json!({"passed": 3, "failed": 0, "total": 3}), vec![], vec![])
            .unwrap();
        h.store.update_status(&results, ArtifactStatus::Approved).unwrap();
        h.store
            .store(ArtifactType::TestResults, "run", json!({"passed": 1}), vec![], vec![])
            .unwrap();
        let router = h.router(FixerRegistry::new());

        let context = HookContext::new(Checkpoint::PrePush);
        let config = HooksConfig::default().for_checkpoint(Checkpoint::PrePush);
        let (input, _, loaded) = router
            .prepare(Checkpoint::PrePush, Phase::QualityGate, &context, VcsMetadata::default(), &config)
            .unwrap();
        assert_eq!(loaded, vec![code.clone(), results.clone()]);
        assert!(input.artifact(ArtifactType::TestResults).is_some());

        let listed: Vec<String> = router
            .artifacts_for(Checkpoint::PrePush)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(listed, loaded);
        let by_name: Vec<String> = h
            .store
            .get_artifacts_for_hook("pre-push")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(by_name, loaded);
    }
}
