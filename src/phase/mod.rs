//! Workflow phases and the value types that flow through the phase engine.
//!
//! This module provides:
//! - `Phase`, the eight ordered stages of the governed lifecycle
//! - `PhaseResult` / `TransitionResult` outcome records
//! - `PhaseExecutionContext`, the input handed to phase implementations
//!
//! The state machine itself lives in [`engine`]; the edge table, preconditions
//! and quality gates live in [`rules`].

pub mod engine;
pub mod implementation;
pub mod rules;

pub use engine::{PhaseEngine, TransitionRecord, WorkflowState};
pub use implementation::{CommandPhaseImplementation, PhaseImplementation};
pub use rules::{Precondition, QualityGate, TransitionRules};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the eight ordered stages of the development lifecycle.
///
/// Phases serialize as their code (`"P0"` .. `"P7"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "P0")]
    Discovery,
    #[serde(rename = "P1")]
    Planning,
    #[serde(rename = "P2")]
    AgentSelection,
    #[serde(rename = "P3")]
    Implementation,
    #[serde(rename = "P4")]
    QualityGate,
    #[serde(rename = "P5")]
    Review,
    #[serde(rename = "P6")]
    Integration,
    #[serde(rename = "P7")]
    Deployment,
}

impl Phase {
    /// Phase a fresh workflow starts in.
    pub const DEFAULT: Phase = Phase::Planning;

    /// All phases in lifecycle order.
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Discovery,
            Phase::Planning,
            Phase::AgentSelection,
            Phase::Implementation,
            Phase::QualityGate,
            Phase::Review,
            Phase::Integration,
            Phase::Deployment,
        ]
    }

    /// Position in the lifecycle (0..=7).
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Phase> {
        Self::all().get(index).copied()
    }

    /// Short code, e.g. `"P3"`.
    pub fn code(self) -> &'static str {
        match self {
            Phase::Discovery => "P0",
            Phase::Planning => "P1",
            Phase::AgentSelection => "P2",
            Phase::Implementation => "P3",
            Phase::QualityGate => "P4",
            Phase::Review => "P5",
            Phase::Integration => "P6",
            Phase::Deployment => "P7",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Discovery => "Discovery",
            Phase::Planning => "Planning",
            Phase::AgentSelection => "Agent Selection",
            Phase::Implementation => "Implementation",
            Phase::QualityGate => "Quality Gate",
            Phase::Review => "Review",
            Phase::Integration => "Integration",
            Phase::Deployment => "Deployment",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Phase::Discovery => "Capture the problem statement and gather requirements",
            Phase::Planning => "Produce and approve an implementation plan on a work branch",
            Phase::AgentSelection => "Assign agents and decide how work is parallelised",
            Phase::Implementation => "Write the code and commit it with traceable messages",
            Phase::QualityGate => "Run code quality, security, test and performance checks",
            Phase::Review => "Review the change set and approve or send back for rework",
            Phase::Integration => "Merge the change and verify the integrated result",
            Phase::Deployment => "Ship the change with a validated deployment configuration",
        }
    }

    /// The phase immediately after this one, if any.
    pub fn next(self) -> Option<Phase> {
        Self::from_index(self.index() + 1)
    }

    /// The phase immediately before this one, if any.
    pub fn previous(self) -> Option<Phase> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Snake-case slug used for evidence keys and config lookups.
    pub fn slug(self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::Planning => "planning",
            Phase::AgentSelection => "agent_selection",
            Phase::Implementation => "implementation",
            Phase::QualityGate => "quality_gate",
            Phase::Review => "review",
            Phase::Integration => "integration",
            Phase::Deployment => "deployment",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.name())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let digits = normalized.strip_prefix('p').unwrap_or(&normalized);
        if let Ok(index) = digits.parse::<usize>() {
            return Phase::from_index(index)
                .ok_or_else(|| anyhow::anyhow!("Phase index {} out of range (0-7)", index));
        }

        Phase::all()
            .iter()
            .copied()
            .find(|p| p.slug() == normalized || p.slug().replace('_', "") == normalized)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid phase '{}'. Valid values: P0-P7 or discovery, planning, agent_selection, implementation, quality_gate, review, integration, deployment",
                    s
                )
            })
    }
}

/// Outcome of a phase transition attempt that passed validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResult {
    pub success: bool,
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub reason: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of executing a phase's work through a phase implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub success: bool,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl PhaseResult {
    pub fn succeeded(phase: Phase, output: serde_json::Value) -> Self {
        Self {
            phase,
            success: true,
            output,
            errors: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn failed(phase: Phase, error: impl Into<String>) -> Self {
        Self {
            phase,
            success: false,
            output: serde_json::Value::Null,
            errors: vec![error.into()],
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Input handed to a phase implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseExecutionContext {
    pub phase: Phase,
    pub task: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub state: WorkflowState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_and_codes() {
        let codes: Vec<&str> = Phase::all().iter().map(|p| p.code()).collect();
        assert_eq!(codes, vec!["P0", "P1", "P2", "P3", "P4", "P5", "P6", "P7"]);
        assert!(Phase::Discovery < Phase::Deployment);
        assert_eq!(Phase::Implementation.index(), 3);
    }

    #[test]
    fn test_phase_next_previous() {
        assert_eq!(Phase::Discovery.next(), Some(Phase::Planning));
        assert_eq!(Phase::Deployment.next(), None);
        assert_eq!(Phase::Discovery.previous(), None);
        assert_eq!(Phase::Review.previous(), Some(Phase::QualityGate));
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!("P3".parse::<Phase>().unwrap(), Phase::Implementation);
        assert_eq!("p4".parse::<Phase>().unwrap(), Phase::QualityGate);
        assert_eq!("2".parse::<Phase>().unwrap(), Phase::AgentSelection);
        assert_eq!("quality-gate".parse::<Phase>().unwrap(), Phase::QualityGate);
        assert_eq!("Agent Selection".parse::<Phase>().unwrap(), Phase::AgentSelection);
        assert_eq!("review".parse::<Phase>().unwrap(), Phase::Review);
        assert!("P8".parse::<Phase>().is_err());
        assert!("shipping".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_serializes_as_code() {
        let json = serde_json::to_string(&Phase::Integration).unwrap();
        assert_eq!(json, "\"P6\"");
        let parsed: Phase = serde_json::from_str("\"P0\"").unwrap();
        assert_eq!(parsed, Phase::Discovery);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::QualityGate.to_string(), "P4 Quality Gate");
    }

    #[test]
    fn test_phase_result_constructors() {
        let ok = PhaseResult::succeeded(Phase::Planning, serde_json::json!({"plan": "x"}));
        assert!(ok.success);
        assert!(ok.errors.is_empty());

        let failed = PhaseResult::failed(Phase::Review, "boom");
        assert!(!failed.success);
        assert_eq!(failed.errors, vec!["boom".to_string()]);
    }
}
