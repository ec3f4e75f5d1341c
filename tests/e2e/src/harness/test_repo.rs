//! Test Repository
//!
//! Real git repositories for end-to-end tests:
//! - Created in a temporary directory, removed on drop
//! - Commits with fixed authors and timestamps
//! - A separate index directory per repository

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chronoscope_core::{EngineConfig, GitProvider, Orchestrator, OrchestratorBuilder};
use git2::{Repository, Signature, Time};
use tempfile::TempDir;

/// One commit to write into a [`TestRepo`]
#[derive(Debug, Clone)]
pub struct CommitSpec {
    pub author: String,
    pub email: String,
    /// Seconds since the epoch
    pub time: i64,
    pub message: String,
    /// `None` deletes the path
    pub files: Vec<(String, Option<Vec<u8>>)>,
}

impl CommitSpec {
    pub fn new(author: &str, time: i64, message: &str) -> Self {
        Self {
            author: author.to_string(),
            email: format!("{}@example.com", author.to_lowercase()),
            time,
            message: message.to_string(),
            files: Vec::new(),
        }
    }

    pub fn file(mut self, path: &str, contents: impl AsRef<[u8]>) -> Self {
        self.files
            .push((path.to_string(), Some(contents.as_ref().to_vec())));
        self
    }

    pub fn delete(mut self, path: &str) -> Self {
        self.files.push((path.to_string(), None));
        self
    }
}

/// A git repository in a temporary directory
///
/// # Example
///
/// ```rust,ignore
/// let repo = TestRepo::new();
/// repo.commit(CommitSpec::new("alice", 1_000, "Initial").file("a.rs", "fn a() {}"));
/// let orchestrator = repo.orchestrator();
/// ```
pub struct TestRepo {
    repo: Repository,
    work_dir: TempDir,
    data_dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let work_dir = TempDir::new().expect("Failed to create repository directory");
        let data_dir = TempDir::new().expect("Failed to create index directory");
        let repo = Repository::init(work_dir.path()).expect("Failed to init repository");
        Self {
            repo,
            work_dir,
            data_dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    /// Where indexes for this repository are stored
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.path().to_path_buf()
    }

    /// Write the files, stage them, and commit on top of HEAD
    pub fn commit(&self, spec: CommitSpec) -> String {
        let mut index = self.repo.index().expect("Failed to open git index");
        for (path, contents) in &spec.files {
            let full = self.path().join(path);
            match contents {
                Some(bytes) => {
                    if let Some(parent) = full.parent() {
                        fs::create_dir_all(parent).expect("Failed to create directories");
                    }
                    fs::write(&full, bytes).expect("Failed to write file");
                    index.add_path(Path::new(path)).expect("Failed to stage file");
                }
                None => {
                    fs::remove_file(&full).expect("Failed to remove file");
                    index.remove_path(Path::new(path)).expect("Failed to unstage file");
                }
            }
        }
        index.write().expect("Failed to write git index");

        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");
        let signature = Signature::new(&spec.author, &spec.email, &Time::new(spec.time, 0))
            .expect("Invalid signature");
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &signature, &signature, &spec.message, &tree, &parents)
            .expect("Failed to commit")
            .to_string()
    }

    pub fn provider(&self) -> Arc<GitProvider> {
        Arc::new(GitProvider::open(self.path()).expect("Failed to open provider"))
    }

    /// Engine config storing the index inside this repository's data dir
    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            data_dir: Some(self.data_dir()),
            ..EngineConfig::default()
        }
    }

    /// Builder with the default searchers and a persistent index
    pub fn builder(&self) -> OrchestratorBuilder {
        Orchestrator::builder(self.provider())
            .config(self.config())
            .with_default_searchers()
            .expect("Failed to register searchers")
            .persistent_index()
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.builder().build().expect("Failed to build orchestrator")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronoscope_core::HistoryProvider;

    #[test]
    fn test_commits_are_linear_and_dated() {
        let repo = TestRepo::new();
        let first = repo.commit(CommitSpec::new("Alice", 1_000, "First").file("a.txt", "a\n"));
        let second = repo.commit(
            CommitSpec::new("Bob", 2_000, "Second")
                .file("dir/b.txt", "b\n")
                .delete("a.txt"),
        );

        let commits = repo.provider().commits().unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].id, second);
        assert_eq!(commits[0].parents, vec![first]);
        assert_eq!(commits[0].author_email, "bob@example.com");
        assert_eq!(commits[1].time.timestamp(), 1_000);
    }
}
