//! Failure handling for checkpoints: strategies, retry state, fixers and reports.

pub mod backoff;
pub mod category;
pub mod fixers;
pub mod manager;
pub mod report;
pub mod retry_state;

pub use category::ErrorCategory;
pub use fixers::{CommandFixer, FixOutcome, FixRequest, Fixer, FixerRegistry};
pub use manager::{CheckpointRunner, FailureContext, FailureManager};
pub use report::InterventionReport;
pub use retry_state::{RetryState, RetryStateStore};
