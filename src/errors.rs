//! Typed error hierarchy for phasegate.
//!
//! Two top-level enums cover the subsystems that raise errors to callers:
//! - `TransitionError` - phase transitions rejected by the engine
//! - `ArtifactError` - artifact store lookups, corruption and I/O
//!
//! Checkpoint failures are never errors; they travel as `HookResult` data.

use crate::phase::Phase;
use std::path::PathBuf;
use thiserror::Error;

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn phase_list(phases: &[Phase]) -> String {
    if phases.is_empty() {
        "none (terminal phase)".to_string()
    } else {
        phases
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Errors from a rejected phase transition.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(
        "Invalid phase sequence: cannot transition from {from} to {to}. Allowed from {from}: {}",
        phase_list(.allowed)
    )]
    SequenceViolation {
        from: Phase,
        to: Phase,
        allowed: Vec<Phase>,
    },

    #[error(
        "Cannot leave {from} for {to}: preconditions not met:\n{}",
        bullets(.failures)
    )]
    PreconditionUnmet {
        from: Phase,
        to: Phase,
        failures: Vec<String>,
    },

    #[error(
        "Cannot leave {from} for {to}: quality gates failed:\n{}",
        bullets(.failures)
    )]
    QualityGateFailure {
        from: Phase,
        to: Phase,
        failures: Vec<String>,
    },

    #[error("Failed to persist phase state: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl TransitionError {
    /// Short machine-readable kind for logs and history.
    pub fn kind(&self) -> &'static str {
        match self {
            TransitionError::SequenceViolation { .. } => "sequence_violation",
            TransitionError::PreconditionUnmet { .. } => "precondition_unmet",
            TransitionError::QualityGateFailure { .. } => "quality_gate_failure",
            TransitionError::Persistence(_) => "persistence",
        }
    }
}

/// Errors from the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact {id} not found")]
    NotFound { id: String },

    #[error("Artifact index at {path} is corrupt: {source}")]
    IndexCorruption {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Payload for artifact {id} is missing at {path}")]
    PayloadMissing { id: String, path: PathBuf },

    #[error("Failed to decode payload for artifact {id}: {message}")]
    Decode { id: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_violation_names_allowed_targets() {
        let err = TransitionError::SequenceViolation {
            from: Phase::Planning,
            to: Phase::Review,
            allowed: vec![Phase::AgentSelection],
        };
        let text = err.to_string();
        assert!(text.contains("Invalid phase sequence"));
        assert!(text.contains("P1 Planning"));
        assert!(text.contains("P5 Review"));
        assert!(text.contains("P2 Agent Selection"));
        assert_eq!(err.kind(), "sequence_violation");
    }

    #[test]
    fn sequence_violation_from_terminal_phase() {
        let err = TransitionError::SequenceViolation {
            from: Phase::Deployment,
            to: Phase::Discovery,
            allowed: vec![],
        };
        assert!(err.to_string().contains("terminal"));
    }

    #[test]
    fn precondition_unmet_lists_each_failure_as_bullet() {
        let err = TransitionError::PreconditionUnmet {
            from: Phase::Review,
            to: Phase::Integration,
            failures: vec![
                "review_approved: review sign-off recorded".to_string(),
                "other: something else".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("  - review_approved"));
        assert!(text.contains("  - other"));
        assert_eq!(err.kind(), "precondition_unmet");
    }

    #[test]
    fn quality_gate_failure_is_matchable() {
        let err = TransitionError::QualityGateFailure {
            from: Phase::QualityGate,
            to: Phase::Review,
            failures: vec!["pre_push_passed".to_string()],
        };
        assert!(matches!(err, TransitionError::QualityGateFailure { .. }));
        assert!(err.to_string().contains("quality gates failed"));
    }

    #[test]
    fn artifact_not_found_carries_id() {
        let err = ArtifactError::NotFound {
            id: "plan-abc".to_string(),
        };
        assert!(err.to_string().contains("plan-abc"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ArtifactError::NotFound { id: "x".into() });
        assert_std_error(&TransitionError::Persistence(anyhow::anyhow!("disk full")));
    }
}
