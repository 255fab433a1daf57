//! Persisted per-hook retry counters in `retry-state.json`.

use super::category::ErrorCategory;
use crate::storage::{FileLock, write_atomic};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const STATE_FILE: &str = "retry-state.json";
const LOCK_FILE: &str = ".retry-state.lock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryState {
    pub attempt_count: u32,
    pub last_attempt: DateTime<Utc>,
    #[serde(default)]
    pub error_type: Option<ErrorCategory>,
}

/// At most one live `RetryState` per hook name.
#[derive(Debug, Clone)]
pub struct RetryStateStore {
    dir: PathBuf,
    ttl: Duration,
}

impl RetryStateStore {
    pub fn new(dir: impl Into<PathBuf>, ttl_secs: u64) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX)),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn load(&self) -> Result<BTreeMap<String, RetryState>> {
        let path = self.path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Retry state at {} is corrupt", path.display()))
    }

    fn save(&self, states: &BTreeMap<String, RetryState>) -> Result<()> {
        let json = serde_json::to_string_pretty(states).context("Failed to serialize retry state")?;
        write_atomic(&self.path(), json.as_bytes())
    }

    fn is_stale(&self, state: &RetryState, now: DateTime<Utc>) -> bool {
        now - state.last_attempt > self.ttl
    }

    /// The live retry state for `hook`, ignoring entries older than the TTL.
    pub fn get(&self, hook: &str) -> Result<Option<RetryState>> {
        self.get_at(hook, Utc::now())
    }

    pub fn get_at(&self, hook: &str, now: DateTime<Utc>) -> Result<Option<RetryState>> {
        let _lock = FileLock::exclusive(self.dir.join(LOCK_FILE))?;
        Ok(self
            .load()?
            .remove(hook)
            .filter(|state| !self.is_stale(state, now)))
    }

    /// Current attempt count for `hook` (0 when absent or stale).
    pub fn attempts(&self, hook: &str) -> Result<u32> {
        Ok(self.get(hook)?.map(|s| s.attempt_count).unwrap_or(0))
    }

    /// Record one more failed attempt and return the new count.
    pub fn increment(&self, hook: &str, error_type: Option<ErrorCategory>) -> Result<u32> {
        self.increment_at(hook, error_type, Utc::now())
    }

    pub fn increment_at(
        &self,
        hook: &str,
        error_type: Option<ErrorCategory>,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let _lock = FileLock::exclusive(self.dir.join(LOCK_FILE))?;
        let mut states = self.load()?;
        let previous = states
            .get(hook)
            .filter(|s| !self.is_stale(s, now))
            .map(|s| s.attempt_count)
            .unwrap_or(0);
        let count = previous + 1;
        states.insert(
            hook.to_string(),
            RetryState {
                attempt_count: count,
                last_attempt: now,
                error_type,
            },
        );
        self.save(&states)?;
        debug!(hook, attempt = count, "Recorded failed attempt");
        Ok(count)
    }

    pub fn clear(&self, hook: &str) -> Result<()> {
        let _lock = FileLock::exclusive(self.dir.join(LOCK_FILE))?;
        let mut states = self.load()?;
        if states.remove(hook).is_some() {
            self.save(&states)?;
            debug!(hook, "Cleared retry state");
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        let _lock = FileLock::exclusive(self.dir.join(LOCK_FILE))?;
        self.save(&BTreeMap::new())
    }

    /// Every persisted entry, stale ones included, with a staleness flag.
    pub fn all(&self) -> Result<Vec<(String, RetryState, bool)>> {
        let _lock = FileLock::exclusive(self.dir.join(LOCK_FILE))?;
        let now = Utc::now();
        Ok(self
            .load()?
            .into_iter()
            .map(|(hook, state)| {
                let stale = self.is_stale(&state, now);
                (hook, state, stale)
            })
            .collect())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_increment_and_clear() {
        let dir = tempdir().unwrap();
        let store = RetryStateStore::new(dir.path(), 3600);
        assert_eq!(store.attempts("pre-push").unwrap(), 0);
        assert_eq!(store.increment("pre-push", Some(ErrorCategory::Test)).unwrap(), 1);
        assert_eq!(store.increment("pre-push", Some(ErrorCategory::Test)).unwrap(), 2);
        assert_eq!(store.increment("pre-commit", None).unwrap(), 1);

        let state = store.get("pre-push").unwrap().unwrap();
        assert_eq!(state.attempt_count, 2);
        assert_eq!(state.error_type, Some(ErrorCategory::Test));

        store.clear("pre-push").unwrap();
        assert!(store.get("pre-push").unwrap().is_none());
        assert_eq!(store.attempts("pre-commit").unwrap(), 1);
    }

    #[test]
    fn test_state_persists_across_instances() {
        let dir = tempdir().unwrap();
        RetryStateStore::new(dir.path(), 3600)
            .increment("pre-push", None)
            .unwrap();
        let reopened = RetryStateStore::new(dir.path(), 3600);
        assert_eq!(reopened.attempts("pre-push").unwrap(), 1);
    }

    #[test]
    fn test_stale_state_is_ignored_and_restarted() {
        let dir = tempdir().unwrap();
        let store = RetryStateStore::new(dir.path(), 60);
        let then = Utc::now() - Duration::seconds(120);
        store.increment_at("pre-push", None, then).unwrap();
        store.increment_at("pre-push", None, then).unwrap();

        assert!(store.get("pre-push").unwrap().is_none());
        assert_eq!(store.increment("pre-push", None).unwrap(), 1);
    }

    #[test]
    fn test_all_reports_staleness() {
        let dir = tempdir().unwrap();
        let store = RetryStateStore::new(dir.path(), 60);
        store
            .increment_at("post-merge", None, Utc::now() - Duration::seconds(600))
            .unwrap();
        store.increment("pre-push", None).unwrap();
        let all = store.all().unwrap();
        assert_eq!(all.len(), 2);
        let stale: Vec<&str> = all.iter().filter(|(_, _, s)| *s).map(|(h, _, _)| h.as_str()).collect();
        assert_eq!(stale, vec!["post-merge"]);

        store.clear_all().unwrap();
        assert!(store.all().unwrap().is_empty());
    }
}
