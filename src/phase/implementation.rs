//! Pluggable phase implementations.

use super::{PhaseExecutionContext, PhaseResult};
use crate::hooks::executor::CommandExecutor;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Performs the actual work of a phase (planning, coding, reviewing...).
#[async_trait]
pub trait PhaseImplementation: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn execute(&self, context: &PhaseExecutionContext) -> Result<PhaseResult>;
}

/// A phase implementation backed by a shell command.
///
/// The execution context is written to stdin as JSON. A JSON `PhaseResult`
/// on stdout is used as-is; otherwise exit code 0 means success, with stdout
/// as the output text, and stderr becomes the error.
pub struct CommandPhaseImplementation {
    command: String,
    executor: CommandExecutor,
    timeout: Duration,
}

impl CommandPhaseImplementation {
    pub fn new(command: impl Into<String>, executor: CommandExecutor, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            executor,
            timeout,
        }
    }
}

#[async_trait]
impl PhaseImplementation for CommandPhaseImplementation {
    fn name(&self) -> &str {
        &self.command
    }

    async fn execute(&self, context: &PhaseExecutionContext) -> Result<PhaseResult> {
        let env = [
            ("PHASEGATE_PHASE", context.phase.code().to_string()),
            ("PHASEGATE_TASK", context.task.clone()),
        ];
        let output = self
            .executor
            .run(&self.command, context, self.timeout, &env)
            .await?;

        if let Some(result) = output.json::<PhaseResult>() {
            return Ok(result);
        }

        if output.success() {
            Ok(PhaseResult::succeeded(
                context.phase,
                serde_json::Value::String(output.stdout.trim().to_string()),
            ))
        } else {
            Ok(PhaseResult::failed(
                context.phase,
                output.failure_reason("Phase command"),
            ))
        }
    }
}
