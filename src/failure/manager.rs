//! Failure handling around checkpoint execution.
//!
//! `FailureManager::execute` runs a checkpoint through a `CheckpointRunner`
//! and, when it fails, applies the hook's configured `FailureStrategy`.
//! Retries are a bounded loop; the only suspension between attempts is the
//! backoff sleep.

use super::backoff::retry_delay;
use super::category::ErrorCategory;
use super::fixers::{FixRequest, FixerRegistry};
use super::report::InterventionReport;
use super::retry_state::RetryStateStore;
use crate::hooks::{Checkpoint, FailureStrategy, HookConfig, HookContext, HookResult, HooksConfig};
use crate::storage::Journal;
use crate::util::panic_message;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs the checks for one checkpoint. Implemented by the router.
#[async_trait]
pub trait CheckpointRunner: Send + Sync {
    async fn run_checkpoint(&self, checkpoint: Checkpoint, context: &HookContext) -> Result<HookResult>;
}

/// One line of `logs/failures.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    pub hook: String,
    pub error_type: ErrorCategory,
    pub error_message: String,
    /// Cumulative failures for this hook, including this one
    pub failure_count: u32,
    pub strategy: FailureStrategy,
    pub timestamp: DateTime<Utc>,
}

enum Decision {
    RetryAfter(Duration),
    Finish(HookResult),
}

pub struct FailureManager {
    hooks: HooksConfig,
    retry_state: Arc<RetryStateStore>,
    fixers: Arc<FixerRegistry>,
    failures: Journal<FailureContext>,
    reports_dir: PathBuf,
}

impl FailureManager {
    pub fn new(
        hooks: HooksConfig,
        retry_state: Arc<RetryStateStore>,
        fixers: Arc<FixerRegistry>,
        logs_dir: impl Into<PathBuf>,
        reports_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hooks,
            retry_state,
            fixers,
            failures: Journal::new(logs_dir.into().join("failures.jsonl")),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn hooks(&self) -> &HooksConfig {
        &self.hooks
    }

    pub fn failure_log(&self) -> &Journal<FailureContext> {
        &self.failures
    }

    /// Run `checkpoint` with the configured failure handling.
    ///
    /// Never returns an error: every outcome, including panics inside the
    /// runner, is a `HookResult`.
    pub async fn execute(
        &self,
        runner: &dyn CheckpointRunner,
        checkpoint: Checkpoint,
        context: &HookContext,
    ) -> HookResult {
        let config = self.hooks.for_checkpoint(checkpoint);
        if !config.enabled {
            info!(checkpoint = %checkpoint, "Checkpoint disabled, skipping");
            return HookResult::success(format!("{} checkpoint is disabled", checkpoint));
        }

        let mut attempts = 0u32;
        let mut delays_ms: Vec<u64> = Vec::new();

        loop {
            attempts += 1;
            let result = self.run_guarded(runner, checkpoint, context).await;

            if result.success {
                if let Err(e) = self.retry_state.clear(checkpoint.as_str()) {
                    warn!(checkpoint = %checkpoint, error = %e, "Failed to clear retry state");
                }
                return annotate(result, attempts, &delays_ms);
            }

            let category = result.error_type.unwrap_or(ErrorCategory::Unknown);
            warn!(
                checkpoint = %checkpoint,
                attempt = attempts,
                error_type = %category,
                strategy = %config.strategy,
                message = %result.message,
                "Checkpoint failed"
            );

            match self.handle_failure(checkpoint, &config, &result, category).await {
                Decision::RetryAfter(delay) => {
                    delays_ms.push(delay.as_millis() as u64);
                    if !delay.is_zero() {
                        info!(checkpoint = %checkpoint, delay_ms = delay.as_millis() as u64, "Retrying after backoff");
                        tokio::time::sleep(delay).await;
                    }
                }
                Decision::Finish(result) => return annotate(result, attempts, &delays_ms),
            }
        }
    }

    async fn run_guarded(
        &self,
        runner: &dyn CheckpointRunner,
        checkpoint: Checkpoint,
        context: &HookContext,
    ) -> HookResult {
        match AssertUnwindSafe(runner.run_checkpoint(checkpoint, context))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(checkpoint = %checkpoint, error = %format!("{:#}", e), "Checkpoint raised an error");
                HookResult::failure(
                    format!("{} checkpoint raised an error: {:#}", checkpoint, e),
                    ErrorCategory::Exception,
                )
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(checkpoint = %checkpoint, panic = %message, "Checkpoint panicked");
                HookResult::failure(
                    format!("{} checkpoint panicked: {}", checkpoint, message),
                    ErrorCategory::Exception,
                )
            }
        }
    }

    async fn handle_failure(
        &self,
        checkpoint: Checkpoint,
        config: &HookConfig,
        failed: &HookResult,
        category: ErrorCategory,
    ) -> Decision {
        let hook = checkpoint.as_str();

        match config.strategy {
            FailureStrategy::Abort => {
                let count = self.peek_attempts(hook) + 1;
                self.record(hook, category, &failed.message, count, config.strategy);
                self.clear(hook);
                Decision::Finish(abort_result(
                    checkpoint,
                    failed,
                    category,
                    "the hook is configured to abort on failure",
                ))
            }

            FailureStrategy::Retry => {
                if !config.retry.is_retryable(Some(category)) {
                    let count = self.peek_attempts(hook) + 1;
                    self.record(hook, category, &failed.message, count, config.strategy);
                    self.clear(hook);
                    return Decision::Finish(abort_result(
                        checkpoint,
                        failed,
                        category,
                        &format!("{} errors are not retryable for this hook", category),
                    ));
                }
                let count = self.bump(hook, category);
                self.record(hook, category, &failed.message, count, config.strategy);
                self.retry_or_abort(checkpoint, config, failed, category, count)
            }

            FailureStrategy::AutoFix => {
                let count = self.bump(hook, category);
                self.record(hook, category, &failed.message, count, config.strategy);
                if count >= config.retry.max_attempts {
                    self.clear(hook);
                    return Decision::Finish(abort_result(
                        checkpoint,
                        failed,
                        category,
                        &format!("auto-fix budget of {} attempts is exhausted", config.retry.max_attempts),
                    ));
                }

                let request = FixRequest {
                    hook: hook.to_string(),
                    category,
                    message: failed.message.clone(),
                    issues: issues_from(failed),
                };
                match self.fixers.apply(&request).await {
                    Some(outcome) if outcome.success => {
                        info!(checkpoint = %checkpoint, category = %category, "Auto-fix applied, re-running checks");
                        Decision::RetryAfter(Duration::ZERO)
                    }
                    _ => {
                        // No fixer or the fixer failed: behave like the retry strategy.
                        if !config.retry.is_retryable(Some(category)) {
                            self.clear(hook);
                            return Decision::Finish(abort_result(
                                checkpoint,
                                failed,
                                category,
                                &format!("no working fixer for {} errors and they are not retryable", category),
                            ));
                        }
                        self.retry_or_abort(checkpoint, config, failed, category, count)
                    }
                }
            }

            FailureStrategy::ManualIntervention => {
                let count = self.bump(hook, category);
                self.record(hook, category, &failed.message, count, config.strategy);
                let report = InterventionReport::new(hook, category, &failed.message, count);
                let report_path = match report.write_to(&self.reports_dir) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(checkpoint = %checkpoint, error = %format!("{:#}", e), "Failed to write intervention report");
                        None
                    }
                };
                if report.escalate {
                    error!(checkpoint = %checkpoint, failures = count, "Escalating repeated checkpoint failure");
                }
                let mut result = HookResult::abort(report.render(), Some(category)).with_details(json!({
                    "strategy": "manual_intervention",
                    "escalate": report.escalate,
                    "failure_count": count,
                    "suggested_actions": report.suggested_actions,
                    "report_path": report_path.map(|p| p.display().to_string()),
                }));
                merge_previous_details(&mut result, failed);
                Decision::Finish(result)
            }

            FailureStrategy::SkipWithWarning => {
                let count = self.peek_attempts(hook) + 1;
                self.record(hook, category, &failed.message, count, config.strategy);
                self.clear(hook);
                warn!(checkpoint = %checkpoint, message = %failed.message, "Checkpoint failure skipped");
                let mut result = HookResult::success(format!(
                    "{} checks failed; continuing because the hook is configured to skip with a warning",
                    checkpoint
                ))
                .with_warning(failed.message.clone());
                result.error_type = Some(category);
                merge_previous_details(&mut result, failed);
                Decision::Finish(result)
            }
        }
    }

    fn retry_or_abort(
        &self,
        checkpoint: Checkpoint,
        config: &HookConfig,
        failed: &HookResult,
        category: ErrorCategory,
        count: u32,
    ) -> Decision {
        if count < config.retry.max_attempts {
            Decision::RetryAfter(retry_delay(&config.retry, count))
        } else {
            self.clear(checkpoint.as_str());
            Decision::Finish(abort_result(
                checkpoint,
                failed,
                category,
                &format!("still failing after {} attempts", count),
            ))
        }
    }

    fn bump(&self, hook: &str, category: ErrorCategory) -> u32 {
        match self.retry_state.increment(hook, Some(category)) {
            Ok(count) => count,
            Err(e) => {
                // Without persisted state, treat the budget as spent.
                warn!(hook, error = %format!("{:#}", e), "Failed to persist retry state");
                u32::MAX
            }
        }
    }

    fn peek_attempts(&self, hook: &str) -> u32 {
        self.retry_state.attempts(hook).unwrap_or(0)
    }

    fn clear(&self, hook: &str) {
        if let Err(e) = self.retry_state.clear(hook) {
            warn!(hook, error = %format!("{:#}", e), "Failed to clear retry state");
        }
    }

    fn record(
        &self,
        hook: &str,
        error_type: ErrorCategory,
        message: &str,
        failure_count: u32,
        strategy: FailureStrategy,
    ) {
        let entry = FailureContext {
            hook: hook.to_string(),
            error_type,
            error_message: message.to_string(),
            failure_count,
            strategy,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.failures.append(&entry) {
            warn!(hook, error = %format!("{:#}", e), "Failed to append failure log");
        }
    }
}

/// Hard failure carrying what failed, why, and what to do next.
fn abort_result(
    checkpoint: Checkpoint,
    failed: &HookResult,
    category: ErrorCategory,
    why: &str,
) -> HookResult {
    let mut message = format!(
        "{} checkpoint failed ({} error): {}\nAborting because {}.\nNext steps:",
        checkpoint, category, failed.message, why
    );
    for action in category.suggested_actions() {
        message.push_str(&format!("\n  - {}", action));
    }
    let mut result = HookResult::abort(message, Some(category));
    merge_previous_details(&mut result, failed);
    result
}

fn merge_previous_details(result: &mut HookResult, failed: &HookResult) {
    if let Some(details) = failed.details.clone() {
        result.insert_detail("checks", details);
    }
}

fn issues_from(failed: &HookResult) -> Vec<String> {
    failed
        .details
        .as_ref()
        .and_then(|d| d.get("failures"))
        .and_then(|f| f.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn annotate(mut result: HookResult, attempts: u32, delays_ms: &[u64]) -> HookResult {
    result.insert_detail("attempts", json!(attempts));
    result.insert_detail("retry_delays_ms", json!(delays_ms));
    result
}
