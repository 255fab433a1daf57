use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Append-only JSON-lines log of records of type `T`.
///
/// Unparseable lines are skipped on read so a torn trailing write never
/// hides the rest of the history.
#[derive(Debug, Clone)]
pub struct Journal<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> Journal<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let mut line = serde_json::to_string(record).context("Failed to serialize log record")?;
        line.push('\n');

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open log {}", self.path.display()))?
            .write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to log {}", self.path.display()))?;

        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read log {}", self.path.display()))?;

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), error = %e, "Skipping unparseable log line");
                    None
                }
            })
            .collect())
    }

    /// The most recent `limit` records, oldest first.
    pub fn tail(&self, limit: usize) -> Result<Vec<T>> {
        let mut records = self.read_all()?;
        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove log {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Entry {
        n: u32,
    }

    #[test]
    fn test_empty_journal_reads_nothing() {
        let dir = tempdir().unwrap();
        let journal: Journal<Entry> = Journal::new(dir.path().join("x.jsonl"));
        assert!(journal.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_preserves_order_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("x.jsonl");
        {
            let journal = Journal::new(&path);
            journal.append(&Entry { n: 1 }).unwrap();
            journal.append(&Entry { n: 2 }).unwrap();
        }
        let journal: Journal<Entry> = Journal::new(&path);
        journal.append(&Entry { n: 3 }).unwrap();
        let all = journal.read_all().unwrap();
        assert_eq!(all, vec![Entry { n: 1 }, Entry { n: 2 }, Entry { n: 3 }]);
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.jsonl");
        std::fs::write(&path, "{\"n\":1}\n{\"n\":\n{\"n\":2}\n").unwrap();
        let journal: Journal<Entry> = Journal::new(&path);
        assert_eq!(journal.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_tail_returns_latest_records() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("x.jsonl"));
        for n in 0..5 {
            journal.append(&Entry { n }).unwrap();
        }
        let tail = journal.tail(2).unwrap();
        assert_eq!(tail, vec![Entry { n: 3 }, Entry { n: 4 }]);
        assert_eq!(journal.tail(10).unwrap().len(), 5);
    }
}
