//! Checkpoint types for the git hook integration.
//!
//! This module defines:
//! - `Checkpoint`: the git hooks phasegate listens on
//! - `HookContext`: the invocation input, built from git's hook arguments
//! - `HookResult`: the structured outcome returned to the CLI

use crate::failure::ErrorCategory;
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Git lifecycle events that trigger phase checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Checkpoint {
    /// After `git checkout` / `git switch`
    PostCheckout,
    /// Before a commit is created
    PreCommit,
    /// After the commit message is written
    CommitMsg,
    /// Before refs are pushed
    PrePush,
    /// After a merge completes
    PostMerge,
}

impl Checkpoint {
    pub fn all() -> &'static [Checkpoint] {
        &[
            Checkpoint::PostCheckout,
            Checkpoint::PreCommit,
            Checkpoint::CommitMsg,
            Checkpoint::PrePush,
            Checkpoint::PostMerge,
        ]
    }

    /// The git hook file name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::PostCheckout => "post-checkout",
            Checkpoint::PreCommit => "pre-commit",
            Checkpoint::CommitMsg => "commit-msg",
            Checkpoint::PrePush => "pre-push",
            Checkpoint::PostMerge => "post-merge",
        }
    }

    /// Phase whose checks run at this checkpoint unless configuration overrides it.
    pub fn default_phase(&self) -> Phase {
        match self {
            Checkpoint::PostCheckout => Phase::Planning,
            Checkpoint::PreCommit => Phase::AgentSelection,
            Checkpoint::CommitMsg => Phase::Implementation,
            Checkpoint::PrePush => Phase::QualityGate,
            Checkpoint::PostMerge => Phase::Integration,
        }
    }

    /// Post-* hooks cannot stop git; their failures are reported only.
    pub fn can_block(&self) -> bool {
        matches!(
            self,
            Checkpoint::PreCommit | Checkpoint::CommitMsg | Checkpoint::PrePush
        )
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Checkpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "post-checkout" => Ok(Checkpoint::PostCheckout),
            "pre-commit" => Ok(Checkpoint::PreCommit),
            "commit-msg" => Ok(Checkpoint::CommitMsg),
            "pre-push" => Ok(Checkpoint::PrePush),
            "post-merge" => Ok(Checkpoint::PostMerge),
            _ => anyhow::bail!(
                "Invalid checkpoint '{}'. Valid values: pre-commit, commit-msg, pre-push, post-checkout, post-merge",
                s
            ),
        }
    }
}

/// Input for one checkpoint invocation.
///
/// `fields` carries the VCS-specific values git passes to the hook:
/// - commit-msg: `commit_msg_file`
/// - pre-push: `remote_name`, `remote_url`
/// - post-checkout: `old_ref`, `new_ref`, `branch_change`
/// - post-merge: `squash`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    pub checkpoint: Checkpoint,
    /// Raw arguments git passed to the hook script
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl HookContext {
    pub fn new(checkpoint: Checkpoint) -> Self {
        Self {
            checkpoint,
            args: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Build a context from the positional arguments git hands to a hook script.
    pub fn from_git_args(checkpoint: Checkpoint, args: &[String]) -> Self {
        let mut context = Self::new(checkpoint);
        context.args = args.to_vec();
        let arg = |i: usize| args.get(i).cloned();

        match checkpoint {
            Checkpoint::CommitMsg => {
                if let Some(file) = arg(0) {
                    context = context.with_field("commit_msg_file", file);
                }
            }
            Checkpoint::PrePush => {
                if let Some(name) = arg(0) {
                    context = context.with_field("remote_name", name);
                }
                if let Some(url) = arg(1) {
                    context = context.with_field("remote_url", url);
                }
            }
            Checkpoint::PostCheckout => {
                if let Some(old) = arg(0) {
                    context = context.with_field("old_ref", old);
                }
                if let Some(new) = arg(1) {
                    context = context.with_field("new_ref", new);
                }
                if let Some(flag) = arg(2) {
                    context = context.with_field("branch_change", flag == "1");
                }
            }
            Checkpoint::PostMerge => {
                if let Some(flag) = arg(0) {
                    context = context.with_field("squash", flag == "1");
                }
            }
            Checkpoint::PreCommit => {}
        }
        context
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn field_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(|v| v.as_bool())
    }
}

/// Outcome of a checkpoint invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResult {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// When set, the invoking git operation must fail even if `success` is true.
    #[serde(default)]
    pub should_abort: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorCategory>,
}

impl HookResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: Utc::now(),
            should_abort: false,
            details: None,
            warning: None,
            error_type: None,
        }
    }

    /// A failed check. Whether git is stopped is decided by the failure strategy.
    pub fn failure(message: impl Into<String>, error_type: ErrorCategory) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: Utc::now(),
            should_abort: false,
            details: None,
            warning: None,
            error_type: Some(error_type),
        }
    }

    /// A hard failure that stops the git operation.
    pub fn abort(message: impl Into<String>, error_type: Option<ErrorCategory>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: Utc::now(),
            should_abort: true,
            details: None,
            warning: None,
            error_type,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Merge `key: value` into the details object.
    pub fn insert_detail(&mut self, key: &str, value: serde_json::Value) {
        match self.details.as_mut() {
            Some(serde_json::Value::Object(map)) => {
                map.insert(key.to_string(), value);
            }
            _ => {
                let mut map = serde_json::Map::new();
                if let Some(previous) = self.details.take() {
                    map.insert("previous".to_string(), previous);
                }
                map.insert(key.to_string(), value);
                self.details = Some(serde_json::Value::Object(map));
            }
        }
    }

    /// Whether git should be allowed to proceed.
    pub fn allows_git(&self) -> bool {
        self.success && !self.should_abort
    }

    /// Process exit status for the hook script.
    pub fn exit_code(&self) -> i32 {
        if self.allows_git() { 0 } else { 1 }
    }
}
