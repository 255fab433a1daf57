//! Transition rules: the allowed-edge table, preconditions and quality gates.
//!
//! Validation is pure: it reads a `WorkflowState` snapshot and never touches
//! disk. Edges are strictly forward by one step, plus the single backward
//! edge Review → Implementation used for rework.

use super::Phase;
use super::engine::WorkflowState;
use crate::errors::TransitionError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Predicate over the persisted workflow state.
pub type StatePredicate = Arc<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// A named condition that must hold before a phase can be left.
#[derive(Clone)]
pub struct Precondition {
    pub name: String,
    pub description: String,
    check: StatePredicate,
}

impl Precondition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        check: impl Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            check: Arc::new(check),
        }
    }

    /// Precondition satisfied when `key` holds a truthy evidence value.
    pub fn evidence(key: &str, description: impl Into<String>) -> Self {
        let key_owned = key.to_string();
        Self::new(key, description, move |state| state.evidence_flag(&key_owned))
    }

    pub fn is_met(&self, state: &WorkflowState) -> bool {
        (self.check)(state)
    }
}

impl fmt::Debug for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Precondition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// A named quality check that must have passed before a phase can be left.
#[derive(Clone)]
pub struct QualityGate {
    pub name: String,
    pub description: String,
    check: StatePredicate,
}

impl QualityGate {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        check: impl Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            check: Arc::new(check),
        }
    }

    /// Gate satisfied once the named checkpoint has passed in this workflow.
    pub fn checkpoint_passed(checkpoint: &str) -> Self {
        let key = format!("checkpoint.{}", checkpoint);
        let name = format!("{}_passed", checkpoint.replace('-', "_"));
        Self::new(
            name,
            format!("the {} checkpoint has passed", checkpoint),
            move |state| state.evidence_flag(&key),
        )
    }

    pub fn passes(&self, state: &WorkflowState) -> bool {
        (self.check)(state)
    }
}

impl fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityGate")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Allowed edges plus the per-phase exit conditions.
#[derive(Debug, Clone)]
pub struct TransitionRules {
    edges: HashMap<Phase, Vec<Phase>>,
    preconditions: HashMap<Phase, Vec<Precondition>>,
    gates: HashMap<Phase, Vec<QualityGate>>,
}

impl Default for TransitionRules {
    fn default() -> Self {
        Self::standard()
    }
}

impl TransitionRules {
    /// Edge table only: no preconditions or gates.
    pub fn sequence_only() -> Self {
        let mut edges: HashMap<Phase, Vec<Phase>> = HashMap::new();
        for phase in Phase::all() {
            edges.insert(*phase, phase.next().into_iter().collect());
        }
        edges
            .entry(Phase::Review)
            .or_default()
            .push(Phase::Implementation);

        Self {
            edges,
            preconditions: HashMap::new(),
            gates: HashMap::new(),
        }
    }

    /// Edge table with the default exit conditions for every phase.
    pub fn standard() -> Self {
        let mut rules = Self::sequence_only();

        rules.add_precondition(
            Phase::Discovery,
            Precondition::evidence(
                "discovery.problem_statement",
                "a problem statement has been recorded",
            ),
        );
        rules.add_precondition(
            Phase::Planning,
            Precondition::evidence("planning.plan_approved", "the implementation plan is approved"),
        );
        rules.add_gate(Phase::Planning, QualityGate::checkpoint_passed("post-checkout"));
        rules.add_precondition(
            Phase::AgentSelection,
            Precondition::evidence(
                "agent_selection.agents_assigned",
                "agents have been assigned to the work",
            ),
        );
        rules.add_gate(Phase::AgentSelection, QualityGate::checkpoint_passed("pre-commit"));
        rules.add_gate(Phase::Implementation, QualityGate::checkpoint_passed("commit-msg"));
        rules.add_gate(Phase::QualityGate, QualityGate::checkpoint_passed("pre-push"));
        rules.add_precondition(
            Phase::Review,
            Precondition::evidence("review.approved", "the review has been approved"),
        );
        rules.add_gate(Phase::Integration, QualityGate::checkpoint_passed("post-merge"));

        rules
    }

    pub fn add_precondition(&mut self, phase: Phase, precondition: Precondition) {
        self.preconditions.entry(phase).or_default().push(precondition);
    }

    pub fn add_gate(&mut self, phase: Phase, gate: QualityGate) {
        self.gates.entry(phase).or_default().push(gate);
    }

    pub fn allowed_targets(&self, from: Phase) -> Vec<Phase> {
        self.edges.get(&from).cloned().unwrap_or_default()
    }

    pub fn is_valid_sequence(&self, from: Phase, to: Phase) -> bool {
        self.edges
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    /// Whether `from → to` is the rework edge, which skips the exit conditions.
    pub fn is_rework(from: Phase, to: Phase) -> bool {
        from == Phase::Review && to == Phase::Implementation
    }

    pub fn preconditions_for(&self, phase: Phase) -> &[Precondition] {
        self.preconditions
            .get(&phase)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn gates_for(&self, phase: Phase) -> &[QualityGate] {
        self.gates.get(&phase).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn unmet_preconditions(&self, from: Phase, state: &WorkflowState) -> Vec<&Precondition> {
        self.preconditions_for(from)
            .iter()
            .filter(|p| !p.is_met(state))
            .collect()
    }

    pub fn failed_gates(&self, from: Phase, state: &WorkflowState) -> Vec<&QualityGate> {
        self.gates_for(from)
            .iter()
            .filter(|g| !g.passes(state))
            .collect()
    }

    /// Validate `from → to` against the edge table and the exit conditions of `from`.
    ///
    /// Preconditions are reported before gates. When both fail, the error is
    /// `PreconditionUnmet` and its list includes the failed gates too.
    pub fn validate(
        &self,
        from: Phase,
        to: Phase,
        state: &WorkflowState,
    ) -> Result<(), TransitionError> {
        if !self.is_valid_sequence(from, to) {
            return Err(TransitionError::SequenceViolation {
                from,
                to,
                allowed: self.allowed_targets(from),
            });
        }

        if Self::is_rework(from, to) {
            return Ok(());
        }

        let unmet: Vec<String> = self
            .unmet_preconditions(from, state)
            .into_iter()
            .map(|p| format!("{}: {}", p.name, p.description))
            .collect();
        let failed: Vec<String> = self
            .failed_gates(from, state)
            .into_iter()
            .map(|g| format!("quality gate {}: {}", g.name, g.description))
            .collect();

        if !unmet.is_empty() {
            let mut failures = unmet;
            failures.extend(failed);
            return Err(TransitionError::PreconditionUnmet { from, to, failures });
        }
        if !failed.is_empty() {
            return Err(TransitionError::QualityGateFailure {
                from,
                to,
                failures: failed,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(evidence: &[&str]) -> WorkflowState {
        let mut state = WorkflowState::default();
        for key in evidence {
            state
                .evidence
                .insert(key.to_string(), serde_json::Value::Bool(true));
        }
        state
    }

    #[test]
    fn test_only_next_phase_and_rework_edge_are_valid() {
        let rules = TransitionRules::sequence_only();
        for from in Phase::all() {
            for to in Phase::all() {
                let expected = from.next() == Some(*to)
                    || (*from == Phase::Review && *to == Phase::Implementation);
                assert_eq!(
                    rules.is_valid_sequence(*from, *to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_sequence_violation_for_skip_and_self_transition() {
        let rules = TransitionRules::sequence_only();
        let state = WorkflowState::default();
        let skip = rules.validate(Phase::Planning, Phase::Implementation, &state);
        assert!(matches!(skip, Err(TransitionError::SequenceViolation { .. })));
        let same = rules.validate(Phase::Planning, Phase::Planning, &state);
        assert!(matches!(same, Err(TransitionError::SequenceViolation { .. })));
    }

    #[test]
    fn test_deployment_is_terminal() {
        let rules = TransitionRules::standard();
        assert!(rules.allowed_targets(Phase::Deployment).is_empty());
    }

    #[test]
    fn test_standard_rules_require_evidence() {
        let rules = TransitionRules::standard();
        let err = rules
            .validate(Phase::Discovery, Phase::Planning, &WorkflowState::default())
            .unwrap_err();
        assert!(matches!(err, TransitionError::PreconditionUnmet { .. }));
        assert!(err.to_string().contains("discovery.problem_statement"));

        let ok = rules.validate(
            Phase::Discovery,
            Phase::Planning,
            &state_with(&["discovery.problem_statement"]),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_gate_failure_reported_when_preconditions_hold() {
        let rules = TransitionRules::standard();
        let state = state_with(&["planning.plan_approved"]);
        let err = rules
            .validate(Phase::Planning, Phase::AgentSelection, &state)
            .unwrap_err();
        match err {
            TransitionError::QualityGateFailure { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].contains("post_checkout_passed"));
            }
            other => panic!("Expected QualityGateFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_precondition_error_lists_failed_gates_too() {
        let rules = TransitionRules::standard();
        let err = rules
            .validate(Phase::Planning, Phase::AgentSelection, &WorkflowState::default())
            .unwrap_err();
        match err {
            TransitionError::PreconditionUnmet { failures, .. } => {
                assert_eq!(failures.len(), 2);
            }
            other => panic!("Expected PreconditionUnmet, got {:?}", other),
        }
    }

    #[test]
    fn test_rework_edge_skips_review_approval() {
        let rules = TransitionRules::standard();
        let ok = rules.validate(Phase::Review, Phase::Implementation, &WorkflowState::default());
        assert!(ok.is_ok());
        let forward = rules.validate(Phase::Review, Phase::Integration, &WorkflowState::default());
        assert!(forward.is_err());
    }

    #[test]
    fn test_custom_precondition() {
        let mut rules = TransitionRules::sequence_only();
        rules.add_precondition(
            Phase::Implementation,
            Precondition::new("never", "always fails", |_| false),
        );
        let err = rules
            .validate(Phase::Implementation, Phase::QualityGate, &WorkflowState::default())
            .unwrap_err();
        assert!(err.to_string().contains("never: always fails"));
    }

    #[test]
    fn test_checkpoint_gate_reads_checkpoint_evidence() {
        let gate = QualityGate::checkpoint_passed("pre-push");
        assert_eq!(gate.name, "pre_push_passed");
        assert!(!gate.passes(&WorkflowState::default()));
        assert!(gate.passes(&state_with(&["checkpoint.pre-push"])));
    }
}
