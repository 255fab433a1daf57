//! The phase state machine.
//!
//! `PhaseEngine` owns the persisted workflow state under the data directory:
//! - `current-phase` - a single-line marker such as `P3`
//! - `state.json` - the full `WorkflowState`, including evidence
//! - `phase-history.jsonl` - one `TransitionRecord` per successful transition
//!
//! Every read-modify-write of the state happens under `.state.lock`.

use super::implementation::PhaseImplementation;
use super::rules::TransitionRules;
use super::{Phase, PhaseExecutionContext, PhaseResult, TransitionResult};
use crate::errors::TransitionError;
use crate::storage::{FileLock, Journal, write_atomic};
use crate::util::{is_truthy, panic_message};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const CURRENT_PHASE_FILE: &str = "current-phase";
const STATE_FILE: &str = "state.json";
const HISTORY_FILE: &str = "phase-history.jsonl";
const LOCK_FILE: &str = ".state.lock";

/// Persisted workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_phase: Phase,
    pub phase_entered_at: DateTime<Utc>,
    #[serde(default)]
    pub transitions: u32,
    pub updated_at: DateTime<Utc>,
    /// Facts recorded by checkpoints and users; read by preconditions and gates.
    #[serde(default)]
    pub evidence: BTreeMap<String, serde_json::Value>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::starting_at(Phase::DEFAULT)
    }
}

impl WorkflowState {
    pub fn starting_at(phase: Phase) -> Self {
        let now = Utc::now();
        Self {
            current_phase: phase,
            phase_entered_at: now,
            transitions: 0,
            updated_at: now,
            evidence: BTreeMap::new(),
        }
    }

    /// Whether `key` is present and truthy.
    pub fn evidence_flag(&self, key: &str) -> bool {
        self.evidence.get(key).map(is_truthy).unwrap_or(false)
    }
}

/// One line of `phase-history.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionRecord {
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Ordinal of this transition within the workflow, starting at 1.
    pub sequence: u32,
}

pub struct PhaseEngine {
    dir: PathBuf,
    rules: TransitionRules,
    implementations: HashMap<Phase, Arc<dyn PhaseImplementation>>,
    implementation_config: HashMap<Phase, serde_json::Value>,
    history: Journal<TransitionRecord>,
}

impl PhaseEngine {
    /// Create an engine persisting under `dir` (normally `.phasegate/`).
    pub fn new(dir: impl Into<PathBuf>, rules: TransitionRules) -> Self {
        let dir = dir.into();
        let history = Journal::new(dir.join(HISTORY_FILE));
        Self {
            dir,
            rules,
            implementations: HashMap::new(),
            implementation_config: HashMap::new(),
            history,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn rules(&self) -> &TransitionRules {
        &self.rules
    }

    /// Register the implementation that performs the work of `phase`.
    pub fn register_implementation(
        &mut self,
        phase: Phase,
        implementation: Arc<dyn PhaseImplementation>,
    ) {
        debug!(phase = phase.code(), name = implementation.name(), "Registered phase implementation");
        self.implementations.insert(phase, implementation);
    }

    /// Attach configuration passed to the implementation of `phase` in its context.
    pub fn set_implementation_config(&mut self, phase: Phase, config: serde_json::Value) {
        self.implementation_config.insert(phase, config);
    }

    pub fn has_implementation(&self, phase: Phase) -> bool {
        self.implementations.contains_key(&phase)
    }

    /// The persisted current phase. The default phase is persisted on first read.
    pub fn current_phase(&self) -> Result<Phase> {
        Ok(self.state()?.current_phase)
    }

    /// Full workflow state, created with defaults on first read.
    pub fn state(&self) -> Result<WorkflowState> {
        let _lock = FileLock::exclusive(self.dir.join(LOCK_FILE))?;
        self.load_or_init()
    }

    /// Validate and perform a transition from the current phase to `target`.
    pub fn transition_to(&self, target: Phase) -> Result<TransitionResult, TransitionError> {
        let _lock =
            FileLock::exclusive(self.dir.join(LOCK_FILE)).map_err(TransitionError::Persistence)?;
        let mut state = self.load_or_init().map_err(TransitionError::Persistence)?;
        let from = state.current_phase;

        if let Err(e) = self.rules.validate(from, target, &state) {
            warn!(from = from.code(), to = target.code(), kind = e.kind(), "Phase transition rejected");
            return Err(e);
        }

        let mut warnings = Vec::new();
        let reason = if TransitionRules::is_rework(from, target) {
            warnings.push(format!(
                "Returning to {} for rework; the commit-msg checkpoint must pass again",
                target
            ));
            format!("Rework requested during {}", from)
        } else {
            format!("Completed {}", from)
        };

        let now = Utc::now();
        state.current_phase = target;
        state.phase_entered_at = now;
        state.transitions += 1;
        state.updated_at = now;
        if TransitionRules::is_rework(from, target) {
            state.evidence.remove("checkpoint.commit-msg");
            state.evidence.remove("review.approved");
        }

        self.save(&state).map_err(TransitionError::Persistence)?;
        self.history
            .append(&TransitionRecord {
                from_phase: from,
                to_phase: target,
                reason: reason.clone(),
                timestamp: now,
                sequence: state.transitions,
            })
            .map_err(TransitionError::Persistence)?;

        info!(from = from.code(), to = target.code(), "Phase transition completed");

        Ok(TransitionResult {
            success: true,
            from_phase: from,
            to_phase: target,
            reason,
            warnings,
            timestamp: now,
        })
    }

    /// Run the registered implementation for `phase`.
    ///
    /// Never fails: a missing implementation, an error, or a panic inside the
    /// implementation all come back as a failed `PhaseResult`.
    pub async fn execute_phase(&self, phase: Phase, task: &str) -> PhaseResult {
        let Some(implementation) = self.implementations.get(&phase).cloned() else {
            return PhaseResult::failed(
                phase,
                format!("No implementation registered for {}", phase),
            );
        };

        let state = match self.state() {
            Ok(state) => state,
            Err(e) => {
                return PhaseResult::failed(phase, format!("Failed to load workflow state: {:#}", e));
            }
        };

        let context = PhaseExecutionContext {
            phase,
            task: task.to_string(),
            config: self
                .implementation_config
                .get(&phase)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            state,
        };

        info!(phase = phase.code(), implementation = implementation.name(), "Executing phase");
        let started = Instant::now();
        let outcome = AssertUnwindSafe(implementation.execute(&context))
            .catch_unwind()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => PhaseResult::failed(phase, format!("{:#}", e)),
            Err(payload) => PhaseResult::failed(
                phase,
                format!("Phase implementation panicked: {}", panic_message(payload.as_ref())),
            ),
        };
        result.phase = phase;
        result.duration_ms = duration_ms;

        if result.success {
            info!(phase = phase.code(), duration_ms, "Phase execution succeeded");
        } else {
            warn!(phase = phase.code(), duration_ms, errors = ?result.errors, "Phase execution failed");
        }
        result
    }

    /// All recorded transitions, oldest first.
    pub fn history(&self) -> Result<Vec<TransitionRecord>> {
        self.history.read_all()
    }

    /// Record an evidence value in the workflow state.
    pub fn record_evidence(&self, key: &str, value: serde_json::Value) -> Result<WorkflowState> {
        let _lock = FileLock::exclusive(self.dir.join(LOCK_FILE))?;
        let mut state = self.load_or_init()?;
        state.evidence.insert(key.to_string(), value);
        state.updated_at = Utc::now();
        self.save(&state)?;
        debug!(key, "Recorded evidence");
        Ok(state)
    }

    /// Remove the state, marker and history. The next read starts over at the default phase.
    pub fn reset(&self) -> Result<()> {
        let _lock = FileLock::exclusive(self.dir.join(LOCK_FILE))?;
        for name in [STATE_FILE, CURRENT_PHASE_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        self.history.clear()?;
        info!("Workflow state reset");
        Ok(())
    }

    /// Load the state, falling back to the marker file, then to defaults.
    ///
    /// Callers must hold the state lock.
    fn load_or_init(&self) -> Result<WorkflowState> {
        let state_path = self.dir.join(STATE_FILE);
        if state_path.exists() {
            let content = std::fs::read_to_string(&state_path)
                .with_context(|| format!("Failed to read {}", state_path.display()))?;
            let state: WorkflowState = serde_json::from_str(&content)
                .with_context(|| format!("Workflow state at {} is corrupt", state_path.display()))?;
            return Ok(state);
        }

        let marker = self.dir.join(CURRENT_PHASE_FILE);
        let state = if marker.exists() {
            let text = std::fs::read_to_string(&marker)
                .with_context(|| format!("Failed to read {}", marker.display()))?;
            let phase: Phase = text
                .trim()
                .parse()
                .with_context(|| format!("Invalid phase marker in {}", marker.display()))?;
            WorkflowState::starting_at(phase)
        } else {
            WorkflowState::default()
        };

        self.save(&state)?;
        debug!(phase = state.current_phase.code(), "Initialized workflow state");
        Ok(state)
    }

    fn save(&self, state: &WorkflowState) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("Failed to serialize workflow state")?;
        write_atomic(&self.dir.join(STATE_FILE), json.as_bytes())?;
        write_atomic(
            &self.dir.join(CURRENT_PHASE_FILE),
            format!("{}\n", state.current_phase.code()).as_bytes(),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;

    struct Echo;

    #[async_trait]
    impl PhaseImplementation for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, context: &PhaseExecutionContext) -> Result<PhaseResult> {
            Ok(PhaseResult::succeeded(
                context.phase,
                json!({ "task": context.task, "config": context.config }),
            ))
        }
    }

    struct Failing;

    #[async_trait]
    impl PhaseImplementation for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(&self, _context: &PhaseExecutionContext) -> Result<PhaseResult> {
            anyhow::bail!("planner unavailable")
        }
    }

    struct Panicking;

    #[async_trait]
    impl PhaseImplementation for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn execute(&self, _context: &PhaseExecutionContext) -> Result<PhaseResult> {
            panic!("index out of bounds")
        }
    }

    fn engine(dir: &Path) -> PhaseEngine {
        PhaseEngine::new(dir, TransitionRules::sequence_only())
    }

    #[test]
    fn test_default_phase_persisted_on_first_read() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        assert_eq!(engine.current_phase().unwrap(), Phase::Planning);
        let marker = std::fs::read_to_string(dir.path().join(CURRENT_PHASE_FILE)).unwrap();
        assert_eq!(marker.trim(), "P1");
        assert!(dir.path().join(STATE_FILE).exists());
    }

    #[test]
    fn test_marker_only_state_is_honoured() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CURRENT_PHASE_FILE), "P4\n").unwrap();
        assert_eq!(engine(dir.path()).current_phase().unwrap(), Phase::QualityGate);
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "{not json").unwrap();
        let err = engine(dir.path()).current_phase().unwrap_err();
        assert!(format!("{:#}", err).contains("corrupt"));
    }

    #[test]
    fn test_transition_persists_and_records_history() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let result = engine.transition_to(Phase::AgentSelection).unwrap();
        assert!(result.success);
        assert_eq!(result.from_phase, Phase::Planning);
        assert_eq!(result.to_phase, Phase::AgentSelection);

        let reopened = PhaseEngine::new(dir.path(), TransitionRules::sequence_only());
        assert_eq!(reopened.current_phase().unwrap(), Phase::AgentSelection);
        let history = reopened.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sequence, 1);
        assert_eq!(reopened.state().unwrap().transitions, 1);
    }

    #[test]
    fn test_every_non_successor_transition_is_rejected() {
        let dir = tempdir().unwrap();
        for from in Phase::all() {
            for to in Phase::all() {
                let allowed = from.next() == Some(*to)
                    || (*from == Phase::Review && *to == Phase::Implementation);
                if allowed {
                    continue;
                }
                std::fs::write(dir.path().join(CURRENT_PHASE_FILE), from.code()).unwrap();
                let _ = std::fs::remove_file(dir.path().join(STATE_FILE));
                let err = engine(dir.path()).transition_to(*to).unwrap_err();
                assert!(
                    matches!(err, TransitionError::SequenceViolation { .. }),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_rejected_transition_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let engine = PhaseEngine::new(dir.path(), TransitionRules::standard());
        let err = engine.transition_to(Phase::AgentSelection).unwrap_err();
        assert!(matches!(err, TransitionError::PreconditionUnmet { .. }));
        assert_eq!(engine.current_phase().unwrap(), Phase::Planning);
        assert!(engine.history().unwrap().is_empty());
    }

    #[test]
    fn test_evidence_unlocks_gated_transition() {
        let dir = tempdir().unwrap();
        let engine = PhaseEngine::new(dir.path(), TransitionRules::standard());
        engine
            .record_evidence("planning.plan_approved", json!(true))
            .unwrap();
        engine
            .record_evidence("checkpoint.post-checkout", json!(true))
            .unwrap();
        assert!(engine.transition_to(Phase::AgentSelection).is_ok());
    }

    #[test]
    fn test_rework_clears_commit_and_review_evidence() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CURRENT_PHASE_FILE), "P5").unwrap();
        let engine = PhaseEngine::new(dir.path(), TransitionRules::standard());
        engine.record_evidence("checkpoint.commit-msg", json!(true)).unwrap();
        engine.record_evidence("review.approved", json!(true)).unwrap();

        let result = engine.transition_to(Phase::Implementation).unwrap();
        assert!(!result.warnings.is_empty());
        let state = engine.state().unwrap();
        assert!(!state.evidence_flag("checkpoint.commit-msg"));
        assert!(!state.evidence_flag("review.approved"));
    }

    #[test]
    fn test_reset_returns_to_default() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        engine.transition_to(Phase::AgentSelection).unwrap();
        engine.reset().unwrap();
        assert_eq!(engine.current_phase().unwrap(), Phase::Planning);
        assert!(engine.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_phase_without_implementation_fails() {
        let dir = tempdir().unwrap();
        let result = engine(dir.path()).execute_phase(Phase::Review, "x").await;
        assert!(!result.success);
        assert!(result.errors[0].contains("No implementation registered"));
    }

    #[tokio::test]
    async fn test_execute_phase_passes_task_and_config() {
        let dir = tempdir().unwrap();
        let mut engine = engine(dir.path());
        engine.register_implementation(Phase::Implementation, Arc::new(Echo));
        engine.set_implementation_config(Phase::Implementation, json!({"agents": 2}));
        let result = engine
            .execute_phase(Phase::Implementation, "build the parser")
            .await;
        assert!(result.success);
        assert_eq!(result.output["task"], "build the parser");
        assert_eq!(result.output["config"]["agents"], 2);
    }

    #[tokio::test]
    async fn test_execute_phase_converts_errors_and_panics() {
        let dir = tempdir().unwrap();
        let mut engine = engine(dir.path());
        engine.register_implementation(Phase::Planning, Arc::new(Failing));
        engine.register_implementation(Phase::Review, Arc::new(Panicking));

        let failed = engine.execute_phase(Phase::Planning, "plan").await;
        assert!(!failed.success);
        assert!(failed.errors[0].contains("planner unavailable"));

        let panicked = engine.execute_phase(Phase::Review, "review").await;
        assert!(!panicked.success);
        assert!(panicked.errors[0].contains("panicked"));
        assert!(panicked.errors[0].contains("index out of bounds"));
    }
}
