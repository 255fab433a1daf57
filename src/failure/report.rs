//! Manual-intervention reports.

use super::category::ErrorCategory;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Failures beyond this count flag the report for escalation.
pub const ESCALATION_THRESHOLD: u32 = 3;

const WRAP_WIDTH: usize = 78;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionReport {
    pub hook: String,
    pub error_type: ErrorCategory,
    pub message: String,
    pub failure_count: u32,
    pub escalate: bool,
    pub suggested_actions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl InterventionReport {
    pub fn new(hook: &str, error_type: ErrorCategory, message: &str, failure_count: u32) -> Self {
        let mut suggested_actions: Vec<String> = error_type
            .suggested_actions()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let escalate = failure_count > ESCALATION_THRESHOLD;
        if escalate {
            suggested_actions.push(format!(
                "Escalate: '{}' has failed {} times; involve the team lead",
                hook, failure_count
            ));
        }
        suggested_actions.push(format!(
            "After fixing, clear the counter with `phasegate retry clear {}`",
            hook
        ));

        Self {
            hook: hook.to_string(),
            error_type,
            message: message.to_string(),
            failure_count,
            escalate,
            suggested_actions,
            generated_at: Utc::now(),
        }
    }

    /// Plain-text rendering for the terminal and the report file.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Manual intervention required: {}\n", self.hook));
        out.push_str(&format!(
            "Error type: {}   Failures: {}{}\n\n",
            self.error_type,
            self.failure_count,
            if self.escalate { "   [ESCALATED]" } else { "" }
        ));
        out.push_str("What failed:\n");
        for line in textwrap::wrap(&self.message, WRAP_WIDTH - 2) {
            out.push_str(&format!("  {}\n", line));
        }
        out.push_str("\nNext steps:\n");
        let options = textwrap::Options::new(WRAP_WIDTH)
            .initial_indent("  - ")
            .subsequent_indent("    ");
        for action in &self.suggested_actions {
            for line in textwrap::wrap(action, &options) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }

    /// Write the rendered report to `<dir>/<timestamp>-<hook>.txt`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create reports directory {}", dir.display()))?;
        let path = dir.join(format!(
            "{}-{}.txt",
            self.generated_at.format("%Y%m%dT%H%M%S%3f"),
            self.hook
        ));
        std::fs::write(&path, self.render())
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_escalation_only_after_threshold() {
        let at = InterventionReport::new("post-merge", ErrorCategory::Test, "tests failed", 3);
        assert!(!at.escalate);
        let over = InterventionReport::new("post-merge", ErrorCategory::Test, "tests failed", 4);
        assert!(over.escalate);
        assert!(over.render().contains("ESCALATED"));
    }

    #[test]
    fn test_render_wraps_and_lists_actions() {
        let long = "error ".repeat(40);
        let report = InterventionReport::new("post-merge", ErrorCategory::Security, &long, 1);
        let text = report.render();
        assert!(text.lines().all(|l| l.len() <= WRAP_WIDTH));
        assert!(text.contains("Review the reported vulnerabilities"));
        assert!(text.contains("phasegate retry clear post-merge"));
    }

    #[test]
    fn test_write_to_creates_file() {
        let dir = tempdir().unwrap();
        let report = InterventionReport::new("post-merge", ErrorCategory::Unknown, "boom", 1);
        let path = report.write_to(&dir.path().join("reports")).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("boom"));
    }
}
