//! Shell command execution for declaratively configured collaborators.
//!
//! Analyzers, fixers and phase implementations configured as `command = "..."`
//! all run through `CommandExecutor`:
//! - the command is spawned via `sh -c` in the project directory
//! - a JSON payload is written to stdin
//! - stdout is parsed as JSON when it contains an object, otherwise the exit
//!   code decides success and stderr carries the reason

use crate::util::extract_json_object;
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Captured result of one command run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Parse stdout (or the first JSON object inside it) as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        let trimmed = self.stdout.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(value) = serde_json::from_str::<T>(trimmed) {
            return Some(value);
        }
        extract_json_object(trimmed).and_then(|obj| serde_json::from_str(&obj).ok())
    }

    /// Human-readable reason for a failed run.
    pub fn failure_reason(&self, label: &str) -> String {
        if self.timed_out {
            return format!("{} timed out", label);
        }
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        if !stderr.is_empty() {
            format!("{} failed (exit {}): {}", label, self.exit_code, stderr)
        } else if !stdout.is_empty() {
            format!("{} failed (exit {}): {}", label, self.exit_code, stdout)
        } else {
            format!("{} failed with exit code {}", label, self.exit_code)
        }
    }

    /// Non-empty output lines, stderr first, for issue lists.
    pub fn lines(&self) -> Vec<String> {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Runs shell commands with a JSON payload on stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    project_dir: PathBuf,
}

impl CommandExecutor {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Run `command` with `input` serialized as JSON on stdin.
    ///
    /// A timeout is not an error: the child is killed and the output comes
    /// back with `timed_out` set.
    pub async fn run<T: Serialize + ?Sized>(
        &self,
        command: &str,
        input: &T,
        limit: Duration,
        env: &[(&str, String)],
    ) -> Result<CommandOutput> {
        let payload = serde_json::to_string(input).context("Failed to serialize command input")?;

        debug!(command, timeout_secs = limit.as_secs(), "Spawning command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn command: {}", command))?;

        // Feeding stdin shares the deadline with the wait: a child that neither
        // reads nor exits would otherwise block the write once the pipe fills.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A command that never reads stdin closes the pipe early; that is not a failure.
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    debug!(command, error = %e, "Command did not consume stdin");
                }
            }
        };
        let run = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = match timeout(limit, run).await {
            Ok(result) => result.with_context(|| format!("Failed to wait for command: {}", command))?,
            Err(_) => {
                return Ok(CommandOutput {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("timed out after {}s", limit.as_secs()),
                    timed_out: true,
                });
            }
        };

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        };
        debug!(command, exit_code = result.exit_code, "Command completed");
        Ok(result)
    }
}
