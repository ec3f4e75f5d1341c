//! In-memory history provider

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::{ChangeStatus, CommitInfo, FileChange, HistoryProvider, ProviderError};

type Tree = BTreeMap<String, Arc<Vec<u8>>>;

/// A commit to append to a [`MemoryProvider`]
#[derive(Debug, Clone)]
pub struct MemoryCommit {
    pub author_name: String,
    pub author_email: String,
    pub time: DateTime<Utc>,
    pub message: String,
    /// `None` deletes the path
    pub files: Vec<(String, Option<Vec<u8>>)>,
}

impl MemoryCommit {
    pub fn new(author_name: &str, time: DateTime<Utc>, message: &str) -> Self {
        Self {
            author_name: author_name.to_string(),
            author_email: format!("{}@example.com", author_name.to_lowercase()),
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

#[derive(Default)]
struct History {
    /// Newest first
    commits: Vec<CommitInfo>,
    trees: HashMap<String, Arc<Tree>>,
}

/// Synthetic history for tests and benchmarks.
///
/// Commit ids are derived from content with blake3, so identical histories
/// produce identical ids.
pub struct MemoryProvider {
    identity: String,
    history: RwLock<History>,
    unavailable: AtomicBool,
}

impl MemoryProvider {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            history: RwLock::new(History::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an unreachable history source
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.history.read().map(|h| h.commits.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a commit on top of HEAD and return its id
    pub fn commit(&self, commit: MemoryCommit) -> Result<String, ProviderError> {
        let mut history = self
            .history
            .write()
            .map_err(|_| ProviderError::Unavailable("history lock poisoned".into()))?;

        let parent = history.commits.first().map(|c| c.id.clone());
        let base = parent
            .as_ref()
            .and_then(|p| history.trees.get(p).cloned())
            .unwrap_or_default();
        let mut tree: Tree = (*base).clone();

        let mut hasher = blake3::Hasher::new();
        hasher.update(parent.as_deref().unwrap_or("").as_bytes());
        hasher.update(commit.author_name.as_bytes());
        hasher.update(commit.author_email.as_bytes());
        hasher.update(&commit.time.timestamp().to_le_bytes());
        hasher.update(commit.message.as_bytes());

        let mut changes = Vec::with_capacity(commit.files.len());
        for (path, contents) in commit.files {
            hasher.update(path.as_bytes());
            match contents {
                Some(body) => {
                    hasher.update(&body);
                    let previous = tree.get(&path).cloned();
                    let (additions, deletions) = line_delta(previous.as_deref(), &body);
                    changes.push(FileChange {
                        path: path.clone(),
                        status: if previous.is_some() {
                            ChangeStatus::Modified
                        } else {
                            ChangeStatus::Added
                        },
                        additions,
                        deletions,
                    });
                    tree.insert(path, Arc::new(body));
                }
                None => {
                    if let Some(previous) = tree.remove(&path) {
                        changes.push(FileChange {
                            path,
                            status: ChangeStatus::Deleted,
                            additions: 0,
                            deletions: count_lines(&previous),
                        });
                    }
                }
            }
        }

        let id = hasher.finalize().to_hex()[..40].to_string();
        history.trees.insert(id.clone(), Arc::new(tree));
        history.commits.insert(
            0,
            CommitInfo {
                id: id.clone(),
                author_name: commit.author_name,
                author_email: commit.author_email,
                time: commit.time,
                message: commit.message,
                parents: parent.into_iter().collect(),
                changes,
            },
        );
        Ok(id)
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable(self.identity.clone()));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, History>, ProviderError> {
        self.check_available()?;
        self.history
            .read()
            .map_err(|_| ProviderError::Unavailable("history lock poisoned".into()))
    }
}

fn count_lines(body: &[u8]) -> u32 {
    body.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count() as u32
}

/// Line-multiset difference between two versions of a file
fn line_delta(old: Option<&Vec<u8>>, new: &[u8]) -> (u32, u32) {
    let mut remaining: HashMap<&[u8], i64> = HashMap::new();
    if let Some(old) = old {
        for line in old.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            *remaining.entry(line).or_default() += 1;
        }
    }
    let mut additions = 0;
    for line in new.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
        match remaining.get_mut(line) {
            Some(n) if *n > 0 => *n -= 1,
            _ => additions += 1,
        }
    }
    let deletions = remaining.values().filter(|n| **n > 0).sum::<i64>();
    (additions, deletions as u32)
}

impl HistoryProvider for MemoryProvider {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn head(&self) -> Result<String, ProviderError> {
        self.read()?
            .commits
            .first()
            .map(|c| c.id.clone())
            .ok_or(ProviderError::EmptyRepository)
    }

    fn commits(&self) -> Result<Vec<CommitInfo>, ProviderError> {
        Ok(self.read()?.commits.clone())
    }

    fn read_file(&self, commit_id: &str, path: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let history = self.read()?;
        let tree = history
            .trees
            .get(commit_id)
            .ok_or_else(|| ProviderError::CommitNotFound(commit_id.to_string()))?;
        Ok(tree.get(path).map(|body| body.as_ref().clone()))
    }
}
