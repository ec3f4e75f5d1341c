//! Git-backed history provider

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use git2::{Commit, Delta, DiffFindOptions, ErrorCode, Oid, Patch, Repository, Sort};

use super::{ChangeStatus, CommitInfo, FileChange, HistoryProvider, ProviderError};

/// Repository handles kept for reuse across blocking calls
const MAX_POOLED_HANDLES: usize = 8;

/// History provider over a local git repository.
///
/// `git2::Repository` is `Send` but not `Sync`, so concurrent searchers each
/// borrow a handle from a small pool and return it afterwards.
pub struct GitProvider {
    git_dir: PathBuf,
    identity: String,
    pool: Mutex<Vec<Repository>>,
}

impl std::fmt::Debug for GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitProvider")
            .field("git_dir", &self.git_dir)
            .finish()
    }
}

impl GitProvider {
    /// Open the repository containing `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let repo = Repository::discover(path.as_ref())?;
        let git_dir = repo.path().to_path_buf();
        let identity = git_dir
            .canonicalize()
            .unwrap_or_else(|_| git_dir.clone())
            .display()
            .to_string();

        tracing::debug!("Opened repository at {}", git_dir.display());

        Ok(Self {
            git_dir,
            identity,
            pool: Mutex::new(vec![repo]),
        })
    }

    fn with_repo<T>(
        &self,
        f: impl FnOnce(&Repository) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let pooled = match self.pool.lock() {
            Ok(mut pool) => pool.pop(),
            Err(_) => None,
        };
        let repo = match pooled {
            Some(repo) => repo,
            None => Repository::open(&self.git_dir)?,
        };

        let result = f(&repo);

        if let Ok(mut pool) = self.pool.lock()
            && pool.len() < MAX_POOLED_HANDLES
        {
            pool.push(repo);
        }
        result
    }
}

fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

fn commit_time(commit: &Commit<'_>) -> DateTime<Utc> {
    DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default()
}

fn file_changes(repo: &Repository, commit: &Commit<'_>) -> Result<Vec<FileChange>, ProviderError> {
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let mut diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

    let mut changes = Vec::with_capacity(diff.deltas().len());
    for idx in 0..diff.deltas().len() {
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };
        let status = match delta.status() {
            Delta::Added | Delta::Copied => ChangeStatus::Added,
            Delta::Deleted => ChangeStatus::Deleted,
            Delta::Renamed => ChangeStatus::Renamed,
            _ => ChangeStatus::Modified,
        };
        let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
            continue;
        };
        let path = path.to_string_lossy().replace('\\', "/");

        let (additions, deletions) = match Patch::from_diff(&diff, idx)? {
            Some(patch) => {
                let (_, adds, dels) = patch.line_stats()?;
                (adds as u32, dels as u32)
            }
            None => (0, 0),
        };

        changes.push(FileChange {
            path,
            status,
            additions,
            deletions,
        });
    }
    Ok(changes)
}

fn commit_info(repo: &Repository, commit: &Commit<'_>) -> Result<CommitInfo, ProviderError> {
    let author = commit.author();
    Ok(CommitInfo {
        id: commit.id().to_string(),
        author_name: author.name().unwrap_or_default().to_string(),
        author_email: author.email().unwrap_or_default().to_string(),
        time: commit_time(commit),
        message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        changes: file_changes(repo, commit)?,
    })
}

impl HistoryProvider for GitProvider {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn head(&self) -> Result<String, ProviderError> {
        self.with_repo(|repo| match repo.head() {
            Ok(head) => Ok(head.peel_to_commit()?.id().to_string()),
            Err(e) if is_unborn(&e) => Err(ProviderError::EmptyRepository),
            Err(e) => Err(e.into()),
        })
    }

    fn commits(&self) -> Result<Vec<CommitInfo>, ProviderError> {
        self.with_repo(|repo| {
            if let Err(e) = repo.head() {
                if is_unborn(&e) {
                    return Ok(Vec::new());
                }
                return Err(e.into());
            }

            let mut walk = repo.revwalk()?;
            walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
            walk.push_head()?;

            let mut commits = Vec::new();
            for oid in walk {
                let commit = repo.find_commit(oid?)?;
                commits.push(commit_info(repo, &commit)?);
            }
            Ok(commits)
        })
    }

    fn commit_count(&self) -> Result<usize, ProviderError> {
        self.with_repo(|repo| {
            if let Err(e) = repo.head() {
                if is_unborn(&e) {
                    return Ok(0);
                }
                return Err(e.into());
            }
            let mut walk = repo.revwalk()?;
            walk.push_head()?;
            let mut count = 0;
            for oid in walk {
                oid?;
                count += 1;
            }
            Ok(count)
        })
    }

    fn read_file(&self, commit_id: &str, path: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        self.with_repo(|repo| {
            let oid = Oid::from_str(commit_id)
                .map_err(|_| ProviderError::CommitNotFound(commit_id.to_string()))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|_| ProviderError::CommitNotFound(commit_id.to_string()))?;
            let tree = commit.tree()?;

            let entry = match tree.get_path(Path::new(path)) {
                Ok(entry) => entry,
                Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let object = entry.to_object(repo)?;
            Ok(object.as_blob().map(|blob| blob.content().to_vec()))
        })
    }
}
