//! Auto-fixers keyed by error category.

use super::category::ErrorCategory;
use crate::hooks::executor::CommandExecutor;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What a fixer is told about the failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRequest {
    pub hook: String,
    pub category: ErrorCategory,
    pub message: String,
    /// Individual issues reported by the failing checks, when known
    #[serde(default)]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub success: bool,
    pub message: String,
}

impl FixOutcome {
    pub fn fixed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn not_fixed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Fixer: Send + Sync {
    fn name(&self) -> &str;

    async fn fix(&self, request: &FixRequest) -> Result<FixOutcome>;
}

/// A fixer that runs a configured shell command with the request on stdin.
pub struct CommandFixer {
    command: String,
    executor: CommandExecutor,
    timeout: Duration,
}

impl CommandFixer {
    pub fn new(command: impl Into<String>, executor: CommandExecutor, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            executor,
            timeout,
        }
    }
}

#[async_trait]
impl Fixer for CommandFixer {
    fn name(&self) -> &str {
        &self.command
    }

    async fn fix(&self, request: &FixRequest) -> Result<FixOutcome> {
        let env = [
            ("PHASEGATE_CHECKPOINT", request.hook.clone()),
            ("PHASEGATE_ERROR_TYPE", request.category.to_string()),
        ];
        let output = self
            .executor
            .run(&self.command, request, self.timeout, &env)
            .await?;

        if let Some(outcome) = output.json::<FixOutcome>() {
            return Ok(outcome);
        }
        if output.success() {
            Ok(FixOutcome::fixed(format!("Fixer '{}' succeeded", self.command)))
        } else {
            Ok(FixOutcome::not_fixed(output.failure_reason("Fixer")))
        }
    }
}

/// Fixers by category; at most one per category.
#[derive(Default, Clone)]
pub struct FixerRegistry {
    fixers: HashMap<ErrorCategory, Arc<dyn Fixer>>,
}

impl FixerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, category: ErrorCategory, fixer: Arc<dyn Fixer>) {
        self.fixers.insert(category, fixer);
    }

    pub fn get(&self, category: ErrorCategory) -> Option<Arc<dyn Fixer>> {
        self.fixers.get(&category).cloned()
    }

    pub fn has(&self, category: ErrorCategory) -> bool {
        self.fixers.contains_key(&category)
    }

    pub fn categories(&self) -> Vec<ErrorCategory> {
        let mut categories: Vec<ErrorCategory> = self.fixers.keys().copied().collect();
        categories.sort();
        categories
    }

    /// Run the fixer for `request.category`.
    ///
    /// Returns `None` when no fixer is registered. Fixer errors become an
    /// unsuccessful outcome.
    pub async fn apply(&self, request: &FixRequest) -> Option<FixOutcome> {
        let fixer = self.get(request.category)?;
        info!(hook = %request.hook, category = %request.category, fixer = fixer.name(), "Running auto-fix");
        let outcome = match fixer.fix(request).await {
            Ok(outcome) => outcome,
            Err(e) => FixOutcome::not_fixed(format!("Fixer '{}' errored: {:#}", fixer.name(), e)),
        };
        if !outcome.success {
            warn!(hook = %request.hook, category = %request.category, message = %outcome.message, "Auto-fix failed");
        }
        Some(outcome)
    }
}

impl std::fmt::Debug for FixerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixerRegistry")
            .field("categories", &self.categories())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct AlwaysFails;

    #[async_trait]
    impl Fixer for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }

        async fn fix(&self, _request: &FixRequest) -> Result<FixOutcome> {
            anyhow::bail!("formatter not installed")
        }
    }

    fn request(category: ErrorCategory) -> FixRequest {
        FixRequest {
            hook: "pre-commit".to_string(),
            category,
            message: "3 files need formatting".to_string(),
            issues: vec![],
        }
    }

    #[tokio::test]
    async fn test_missing_fixer_returns_none() {
        let registry = FixerRegistry::new();
        assert!(registry.apply(&request(ErrorCategory::Format)).await.is_none());
    }

    #[tokio::test]
    async fn test_fixer_error_becomes_failed_outcome() {
        let mut registry = FixerRegistry::new();
        registry.register(ErrorCategory::Format, Arc::new(AlwaysFails));
        let outcome = registry.apply(&request(ErrorCategory::Format)).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("formatter not installed"));
    }

    #[tokio::test]
    async fn test_command_fixer_success_and_failure() {
        let dir = tempdir().unwrap();
        let ok = CommandFixer::new(
            "test \"$PHASEGATE_ERROR_TYPE\" = format",
            CommandExecutor::new(dir.path()),
            Duration::from_secs(5),
        );
        assert!(ok.fix(&request(ErrorCategory::Format)).await.unwrap().success);
        assert!(!ok.fix(&request(ErrorCategory::Import)).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_command_fixer_json_outcome() {
        let dir = tempdir().unwrap();
        let fixer = CommandFixer::new(
            r#"echo '{"success": false, "message": "could not resolve import"}'"#,
            CommandExecutor::new(dir.path()),
            Duration::from_secs(5),
        );
        let outcome = fixer.fix(&request(ErrorCategory::Import)).await.unwrap();
        assert_eq!(outcome, FixOutcome::not_fixed("could not resolve import"));
    }
}
