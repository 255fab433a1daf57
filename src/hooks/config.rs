//! Per-checkpoint failure handling configuration.
//!
//! Each checkpoint has built-in defaults; `[hooks.<checkpoint>]` sections in
//! `.phasegate/phasegate.toml` override individual fields:
//!
//! ```toml
//! [hooks.pre-push]
//! strategy = "retry"
//! timeout_secs = 600
//! required_gates = ["tests", "security"]
//!
//! [hooks.pre-push.retry]
//! max_attempts = 3
//! base_delay_ms = 2000
//! ```

use super::types::Checkpoint;
use crate::failure::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// What to do when a checkpoint's checks fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Fail the git operation immediately
    Abort,
    /// Re-run the checks with exponential backoff
    Retry,
    /// Run the fixer for the error category, then re-run; falls back to retry
    AutoFix,
    /// Write a report for a human and fail
    ManualIntervention,
    /// Log a warning and let git proceed
    SkipWithWarning,
}

impl FailureStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStrategy::Abort => "abort",
            FailureStrategy::Retry => "retry",
            FailureStrategy::AutoFix => "auto_fix",
            FailureStrategy::ManualIntervention => "manual_intervention",
            FailureStrategy::SkipWithWarning => "skip_with_warning",
        }
    }
}

impl std::fmt::Display for FailureStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backoff and budget for retried checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first run
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Scale each delay by a random factor in [0.5, 1.0]
    #[serde(default)]
    pub jitter: bool,
    /// When non-empty, failures outside this set are not retried
    #[serde(default)]
    pub retryable_errors: Vec<ErrorCategory>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn is_retryable(&self, category: Option<ErrorCategory>) -> bool {
        if self.retryable_errors.is_empty() {
            return true;
        }
        category.is_some_and(|c| self.retryable_errors.contains(&c))
    }
}

/// Resolved configuration for one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Lower runs first when several checkpoints are listed
    pub priority: u32,
    pub strategy: FailureStrategy,
    pub retry: RetryPolicy,
    pub timeout_secs: u64,
    /// Sub-checks that must pass; when non-empty, other failures become warnings
    pub required_gates: Vec<String>,
    pub enabled: bool,
}

impl HookConfig {
    /// Built-in defaults for a checkpoint.
    pub fn default_for(checkpoint: Checkpoint) -> Self {
        let (priority, strategy, timeout_secs, retry) = match checkpoint {
            Checkpoint::PostCheckout => (10, FailureStrategy::SkipWithWarning, 60, RetryPolicy::default()),
            Checkpoint::PreCommit => (20, FailureStrategy::AutoFix, 120, RetryPolicy::default()),
            Checkpoint::CommitMsg => (30, FailureStrategy::Abort, 30, RetryPolicy::default()),
            Checkpoint::PrePush => (
                40,
                FailureStrategy::Retry,
                300,
                RetryPolicy::default().with_max_attempts(2),
            ),
            Checkpoint::PostMerge => (50, FailureStrategy::ManualIntervention, 300, RetryPolicy::default()),
        };
        Self {
            priority,
            strategy,
            retry,
            timeout_secs,
            required_gates: Vec::new(),
            enabled: true,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self, checkpoint: Checkpoint) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.timeout_secs == 0 {
            warnings.push(format!("Hook '{}' has timeout of 0 seconds", checkpoint));
        }
        if self.retry.max_attempts == 0 {
            warnings.push(format!(
                "Hook '{}' has retry.max_attempts of 0; the first failure will abort",
                checkpoint
            ));
        }
        if self.retry.multiplier < 1.0 {
            warnings.push(format!(
                "Hook '{}' has retry.multiplier below 1.0; delays will shrink",
                checkpoint
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            warnings.push(format!(
                "Hook '{}' has base_delay_ms greater than max_delay_ms",
                checkpoint
            ));
        }
        if !checkpoint.can_block()
            && matches!(self.strategy, FailureStrategy::Abort)
        {
            warnings.push(format!(
                "Hook '{}' runs after git has finished; strategy 'abort' only reports the failure",
                checkpoint
            ));
        }
        warnings
    }
}

/// Partial retry settings from the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable_errors: Option<Vec<ErrorCategory>>,
}

/// Partial hook settings from the config file; unset fields keep the checkpoint default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<FailureStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_gates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl HookOverride {
    fn apply(&self, config: &mut HookConfig) {
        if let Some(priority) = self.priority {
            config.priority = priority;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(ref gates) = self.required_gates {
            config.required_gates = gates.clone();
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(ref retry) = self.retry {
            let policy = &mut config.retry;
            if let Some(v) = retry.max_attempts {
                policy.max_attempts = v;
            }
            if let Some(v) = retry.base_delay_ms {
                policy.base_delay_ms = v;
            }
            if let Some(v) = retry.multiplier {
                policy.multiplier = v;
            }
            if let Some(v) = retry.max_delay_ms {
                policy.max_delay_ms = v;
            }
            if let Some(v) = retry.jitter {
                policy.jitter = v;
            }
            if let Some(ref v) = retry.retryable_errors {
                policy.retryable_errors = v.clone();
            }
        }
    }
}

/// The `[hooks]` section: overrides keyed by checkpoint name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HooksConfig {
    pub overrides: BTreeMap<Checkpoint, HookOverride>,
}

impl HooksConfig {
    /// Effective configuration for a checkpoint.
    pub fn for_checkpoint(&self, checkpoint: Checkpoint) -> HookConfig {
        let mut config = HookConfig::default_for(checkpoint);
        if let Some(override_cfg) = self.overrides.get(&checkpoint) {
            override_cfg.apply(&mut config);
        }
        config
    }

    /// All checkpoints with their effective configuration, by priority.
    pub fn resolved(&self) -> Vec<(Checkpoint, HookConfig)> {
        let mut all: Vec<(Checkpoint, HookConfig)> = Checkpoint::all()
            .iter()
            .map(|c| (*c, self.for_checkpoint(*c)))
            .collect();
        all.sort_by_key(|(_, cfg)| cfg.priority);
        all
    }

    pub fn validate(&self) -> Vec<String> {
        self.resolved()
            .iter()
            .flat_map(|(checkpoint, cfg)| cfg.validate(*checkpoint))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        #[serde(default)]
        hooks: HooksConfig,
    }

    #[test]
    fn test_default_strategies() {
        let hooks = HooksConfig::default();
        assert_eq!(hooks.for_checkpoint(Checkpoint::PreCommit).strategy, FailureStrategy::AutoFix);
        assert_eq!(hooks.for_checkpoint(Checkpoint::CommitMsg).strategy, FailureStrategy::Abort);
        let push = hooks.for_checkpoint(Checkpoint::PrePush);
        assert_eq!(push.strategy, FailureStrategy::Retry);
        assert_eq!(push.retry.max_attempts, 2);
        assert_eq!(
            hooks.for_checkpoint(Checkpoint::PostCheckout).strategy,
            FailureStrategy::SkipWithWarning
        );
        assert_eq!(
            hooks.for_checkpoint(Checkpoint::PostMerge).strategy,
            FailureStrategy::ManualIntervention
        );
    }

    #[test]
    fn test_partial_override_keeps_checkpoint_defaults() {
        let toml = r#"
[hooks.pre-push]
timeout_secs = 600

[hooks.pre-push.retry]
base_delay_ms = 50
retryable_errors = ["test", "timeout"]

[hooks.commit-msg]
strategy = "skip_with_warning"
required_gates = ["commit_message_format"]
"#;
        let parsed: Wrapper = toml::from_str(toml).unwrap();
        let push = parsed.hooks.for_checkpoint(Checkpoint::PrePush);
        assert_eq!(push.strategy, FailureStrategy::Retry);
        assert_eq!(push.timeout_secs, 600);
        assert_eq!(push.retry.max_attempts, 2);
        assert_eq!(push.retry.base_delay_ms, 50);
        assert!(push.retry.is_retryable(Some(ErrorCategory::Test)));
        assert!(!push.retry.is_retryable(Some(ErrorCategory::Security)));
        assert!(!push.retry.is_retryable(None));

        let msg = parsed.hooks.for_checkpoint(Checkpoint::CommitMsg);
        assert_eq!(msg.strategy, FailureStrategy::SkipWithWarning);
        assert_eq!(msg.required_gates, vec!["commit_message_format".to_string()]);
    }

    #[test]
    fn test_empty_retryable_set_retries_everything() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(Some(ErrorCategory::Security)));
        assert!(policy.is_retryable(None));
    }

    #[test]
    fn test_resolved_sorted_by_priority() {
        let order: Vec<Checkpoint> = HooksConfig::default()
            .resolved()
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(order.first(), Some(&Checkpoint::PostCheckout));
        assert_eq!(order.last(), Some(&Checkpoint::PostMerge));
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let toml = r#"
[hooks.pre-commit]
timeout_secs = 0

[hooks.post-merge]
strategy = "abort"
"#;
        let parsed: Wrapper = toml::from_str(toml).unwrap();
        let warnings = parsed.hooks.validate();
        assert!(warnings.iter().any(|w| w.contains("timeout of 0")));
        assert!(warnings.iter().any(|w| w.contains("post-merge")));
    }
}
