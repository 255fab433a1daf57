use anyhow::{Context, Result};
use git2::Repository;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Repository facts gathered before a checkpoint's checks run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VcsMetadata {
    /// `None` on a detached HEAD or outside a repository
    pub branch: Option<String>,
    pub last_commit: Option<CommitInfo>,
    pub remote: Option<RemoteInfo>,
    #[serde(default)]
    pub staged_files: Vec<PathBuf>,
    #[serde(default)]
    pub has_conflicts: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub summary: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub name: String,
    pub url: Option<String>,
}

pub struct GitInspector {
    repo: Repository,
}

impl GitInspector {
    pub fn open(project_dir: &Path) -> Result<Self> {
        let repo = Repository::discover(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    pub fn collect(&self) -> Result<VcsMetadata> {
        Ok(VcsMetadata {
            branch: self.branch(),
            last_commit: self.last_commit(),
            remote: self.remote(),
            staged_files: self.staged_files()?,
            has_conflicts: self.has_conflicts()?,
        })
    }

    /// Current branch name, also for a branch with no commits yet.
    pub fn branch(&self) -> Option<String> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => head.shorthand().map(String::from),
            Ok(_) => None,
            Err(_) => self
                .repo
                .find_reference("HEAD")
                .ok()
                .and_then(|r| r.symbolic_target().map(String::from))
                .and_then(|t| t.strip_prefix("refs/heads/").map(String::from)),
        }
    }

    pub fn last_commit(&self) -> Option<CommitInfo> {
        let commit = self.repo.head().ok()?.peel_to_commit().ok()?;
        Some(CommitInfo {
            sha: commit.id().to_string(),
            summary: commit.summary().unwrap_or_default().to_string(),
            author: commit.author().name().unwrap_or_default().to_string(),
        })
    }

    /// `origin` when present, otherwise the first configured remote.
    pub fn remote(&self) -> Option<RemoteInfo> {
        let names = self.repo.remotes().ok()?;
        let names: Vec<&str> = names.iter().flatten().collect();
        let name = names
            .iter()
            .find(|n| **n == "origin")
            .or_else(|| names.first())?;
        let url = self
            .repo
            .find_remote(name)
            .ok()
            .and_then(|r| r.url().map(String::from));
        Some(RemoteInfo {
            name: name.to_string(),
            url,
        })
    }

    /// Paths that differ between HEAD and the index.
    pub fn staged_files(&self) -> Result<Vec<PathBuf>> {
        let head_tree = self.repo.head().ok().and_then(|h| h.peel_to_tree().ok());
        let index = self.repo.index().context("Failed to read git index")?;
        let diff = self
            .repo
            .diff_tree_to_index(head_tree.as_ref(), Some(&index), None)
            .context("Failed to diff HEAD against the index")?;

        let mut files: Vec<PathBuf> = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(Path::to_path_buf)
            })
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    pub fn has_conflicts(&self) -> Result<bool> {
        let index = self.repo.index().context("Failed to read git index")?;
        Ok(index.has_conflicts())
    }
}

/// Metadata for `project_dir`, or empty metadata outside a repository.
pub fn collect_metadata(project_dir: &Path) -> VcsMetadata {
    match GitInspector::open(project_dir).and_then(|g| g.collect()) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::debug!(error = %format!("{:#}", e), "No git metadata available");
            VcsMetadata::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> (Repository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        (repo, dir)
    }

    fn stage(repo: &Repository, dir: &Path, file: &str, content: &str) {
        fs::write(dir.join(file), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
    }

    fn commit(repo: &Repository, message: &str) {
        let mut index = repo.index().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("test", "test@test.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    #[test]
    fn test_unborn_branch_and_staged_files() {
        let (repo, dir) = setup_repo();
        stage(&repo, dir.path(), "a.txt", "hello");

        let inspector = GitInspector::open(dir.path()).unwrap();
        let meta = inspector.collect().unwrap();
        assert!(meta.branch.is_some());
        assert!(meta.last_commit.is_none());
        assert_eq!(meta.staged_files, vec![PathBuf::from("a.txt")]);
        assert!(!meta.has_conflicts);
    }

    #[test]
    fn test_committed_files_are_not_staged() {
        let (repo, dir) = setup_repo();
        stage(&repo, dir.path(), "a.txt", "hello");
        commit(&repo, "feat: first");
        stage(&repo, dir.path(), "b.txt", "world");

        let meta = GitInspector::open(dir.path()).unwrap().collect().unwrap();
        assert_eq!(meta.staged_files, vec![PathBuf::from("b.txt")]);
        let last = meta.last_commit.unwrap();
        assert_eq!(last.summary, "feat: first");
        assert_eq!(last.author, "test");
    }

    #[test]
    fn test_prefers_origin_remote() {
        let (repo, dir) = setup_repo();
        repo.remote("backup", "https://example.com/backup.git").unwrap();
        repo.remote("origin", "https://example.com/origin.git").unwrap();

        let remote = GitInspector::open(dir.path()).unwrap().remote().unwrap();
        assert_eq!(remote.name, "origin");
        assert_eq!(remote.url.as_deref(), Some("https://example.com/origin.git"));
    }

    #[test]
    fn test_collect_metadata_outside_repo_is_empty() {
        let dir = tempdir().unwrap();
        assert_eq!(collect_metadata(dir.path()), VcsMetadata::default());
    }
}
