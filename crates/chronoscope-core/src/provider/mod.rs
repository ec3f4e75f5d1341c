//! History Provider
//!
//! Read-only access to commit history:
//! - Commit metadata and per-file changes
//! - File contents at a commit
//! - The current HEAD, used for cache invalidation
//!
//! [`GitProvider`] reads a real repository through `git2`; [`MemoryProvider`]
//! holds a synthetic history for tests and benchmarks.

mod git;
mod memory;
mod text;

pub use git::GitProvider;
pub use memory::{MemoryCommit, MemoryProvider};
pub use text::{LineMatch, TextMatcher, is_binary, snippet};
pub(crate) use text::lines;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// History provider error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Repository has no commits")]
    EmptyRepository,
    #[error("Commit not found: {0}")]
    CommitNotFound(String),
    #[error("History source unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// TYPES
// ============================================================================

/// How a commit touched a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeStatus::Added => "A",
            ChangeStatus::Modified => "M",
            ChangeStatus::Deleted => "D",
            ChangeStatus::Renamed => "R",
        };
        f.write_str(s)
    }
}

/// A file touched by a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Repository-relative path with `/` separators
    pub path: String,
    pub status: ChangeStatus,
    pub additions: u32,
    pub deletions: u32,
}

/// Commit metadata as seen by searchers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    /// Full lower-case hex id
    pub id: String,
    pub author_name: String,
    pub author_email: String,
    pub time: DateTime<Utc>,
    pub message: String,
    pub parents: Vec<String>,
    pub changes: Vec<FileChange>,
}

impl CommitInfo {
    /// First line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim_end()
    }

    /// `Name <email>`, the text author patterns are matched against
    pub fn author_line(&self) -> String {
        format!("{} <{}>", self.author_name, self.author_email)
    }

    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// Read-only source of commit history.
///
/// Calls block; the orchestrator runs them on the blocking pool.
pub trait HistoryProvider: Send + Sync {
    /// Stable identity of the history source, used to locate its index
    fn identity(&self) -> String;

    /// Id of the current HEAD commit
    fn head(&self) -> Result<String, ProviderError>;

    /// Every commit reachable from HEAD, newest first
    fn commits(&self) -> Result<Vec<CommitInfo>, ProviderError>;

    /// Number of commits reachable from HEAD
    fn commit_count(&self) -> Result<usize, ProviderError> {
        Ok(self.commits()?.len())
    }

    /// Contents of `path` at `commit_id`, `None` when the path is absent
    fn read_file(&self, commit_id: &str, path: &str) -> Result<Option<Vec<u8>>, ProviderError>;
}
