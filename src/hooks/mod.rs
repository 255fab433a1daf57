//! Git hook checkpoints.
//!
//! Git calls `phasegate hook <checkpoint> [args...]` from the scripts written
//! by `phasegate install-hooks`. Each checkpoint maps to a phase, and the
//! router runs that phase's check set:
//!
//! | Checkpoint      | Default phase      | Default strategy      |
//! |-----------------|--------------------|-----------------------|
//! | `post-checkout` | P1 Planning        | `skip_with_warning`   |
//! | `pre-commit`    | P2 Agent Selection | `auto_fix`            |
//! | `commit-msg`    | P3 Implementation  | `abort`               |
//! | `pre-push`      | P4 Quality Gate    | `retry` (2 attempts)  |
//! | `post-merge`    | P6 Integration     | `manual_intervention` |
//!
//! # Configuration
//!
//! Per-checkpoint behaviour and analyzers live in `.phasegate/phasegate.toml`:
//!
//! ```toml
//! [hooks.pre-push]
//! timeout_secs = 600
//! required_gates = ["tests", "security"]
//!
//! [checks.analyzers.tests]
//! command = "cargo test --quiet"
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use phasegate::hooks::{Checkpoint, HookContext};
//!
//! let context = HookContext::from_git_args(Checkpoint::CommitMsg, &args);
//! let result = workflow.run_hook(Checkpoint::CommitMsg, &context).await;
//! std::process::exit(result.exit_code());
//! ```

pub mod checks;
pub mod config;
pub mod executor;
pub mod router;
pub mod types;
pub mod vcs;

// Re-exports for convenience
pub use checks::{
    AnalyzerCommand, CheckInput, CheckOutcome, CheckRegistry, CheckReport, CheckSettings,
    CommandCheck, PhaseCheckSet, QualityCheck, SubCheck,
};
pub use config::{FailureStrategy, HookConfig, HookOverride, HooksConfig, RetryOverride, RetryPolicy};
pub use executor::{CommandExecutor, CommandOutput};
pub use router::{ExecutionRecord, HookRouter, default_checkpoint_map};
pub use types::{Checkpoint, HookContext, HookResult};
pub use vcs::{GitInspector, VcsMetadata};
