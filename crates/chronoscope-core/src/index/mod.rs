//! Incremental Index
//!
//! Persistent term index over commit history:
//! - Commit message terms and file content terms with positions
//! - Document statistics for BM25 (document frequency, lengths)
//! - Incremental updates from the last indexed commit
//! - Corruption detection with automatic discard and rebuild
//!
//! The index only accelerates and ranks; every searcher produces correct
//! results without it.

mod migrations;
mod snapshot;
mod store;
pub mod tokenizer;

pub use migrations::INDEX_SCHEMA_VERSION;
pub use snapshot::{CommitDelta, DocumentDelta, IndexSnapshot, Posting};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::provider::{ChangeStatus, CommitInfo, HistoryProvider, ProviderError, is_binary};
use store::IndexStore;
use tokenizer::term_frequencies;

/// Files larger than this are not indexed
pub const DEFAULT_MAX_FILE_BYTES: usize = 1024 * 1024;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Index error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("History provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Index build cancelled")]
    Cancelled,
    #[error("Initialization error: {0}")]
    Init(String),
}

// ============================================================================
// REPORTS
// ============================================================================

/// Outcome of one build or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub commits_indexed: usize,
    /// Terms that were not in the index before this build
    pub terms_added: usize,
    pub full_rebuild: bool,
    pub duration_ms: u64,
    pub generation: u64,
}

/// A completed build as recorded in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub completed_at: DateTime<Utc>,
    pub full_rebuild: bool,
    pub commits_indexed: usize,
    pub terms_added: usize,
    pub duration_ms: u64,
}

/// Health and size of the index
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub location: Option<PathBuf>,
    pub healthy: bool,
    pub built: bool,
    pub last_indexed_commit: Option<String>,
    pub generation: u64,
    pub commit_count: usize,
    pub document_count: usize,
    pub term_count: usize,
    pub posting_count: u64,
    pub average_document_length: f64,
    pub last_build: Option<BuildRecord>,
}

// ============================================================================
// INCREMENTAL INDEX
// ============================================================================

/// Persistent index with copy-on-write snapshots.
///
/// Updates are serialized behind the store lock; readers take the current
/// `Arc<IndexSnapshot>` and never block on a running update.
pub struct IncrementalIndex {
    store: Mutex<IndexStore>,
    current: RwLock<Arc<IndexSnapshot>>,
    needs_rebuild: AtomicBool,
    corruption: Mutex<Option<String>>,
    location: Option<PathBuf>,
    max_file_bytes: usize,
}

impl std::fmt::Debug for IncrementalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalIndex")
            .field("location", &self.location)
            .field("needs_rebuild", &self.needs_rebuild())
            .finish()
    }
}

impl IncrementalIndex {
    fn from_parts(
        store: IndexStore,
        snapshot: IndexSnapshot,
        location: Option<PathBuf>,
        corruption: Option<String>,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            current: RwLock::new(Arc::new(snapshot)),
            needs_rebuild: AtomicBool::new(corruption.is_some()),
            corruption: Mutex::new(corruption),
            location,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Platform data directory for index files
    pub fn default_data_dir() -> Result<PathBuf, IndexError> {
        let dirs = ProjectDirs::from("dev", "chronoscope", "chronoscope").ok_or_else(|| {
            IndexError::Init("Could not determine project directories".to_string())
        })?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Index file for a history source inside `data_dir`
    pub fn path_for(data_dir: &Path, identity: &str) -> PathBuf {
        let digest = blake3::hash(identity.as_bytes()).to_hex();
        data_dir.join("index").join(format!("{}.db", &digest[..16]))
    }

    /// Open the index belonging to `identity` under `data_dir`
    pub fn open(data_dir: &Path, identity: &str) -> Result<Self, IndexError> {
        Self::open_at(Self::path_for(data_dir, identity))
    }

    /// Open (or create) the index file at `path`
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let path = path.into();
        let (store, mut corruption) = IndexStore::open(&path)?;

        let (store, snapshot) = match store.load() {
            Ok(snapshot) => (store, snapshot),
            Err(e) => {
                tracing::warn!("Index at {} unreadable: {}; discarding", path.display(), e);
                drop(store);
                store::discard(&path)?;
                let (fresh, _) = IndexStore::open(&path)?;
                corruption = Some(format!("index unreadable: {e}"));
                (fresh, IndexSnapshot::default())
            }
        };

        tracing::debug!(
            "Opened index at {} ({} commits, generation {})",
            path.display(),
            snapshot.commit_count(),
            snapshot.generation()
        );
        Ok(Self::from_parts(store, snapshot, Some(path), corruption))
    }

    /// A non-persistent index, for tests and one-shot use
    pub fn open_in_memory() -> Result<Self, IndexError> {
        Ok(Self::from_parts(
            IndexStore::open_in_memory()?,
            IndexSnapshot::default(),
            None,
            None,
        ))
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Corruption was detected and no rebuild has completed since
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild.load(Ordering::SeqCst)
    }

    /// The corruption reason found at open, reported once
    pub fn take_corruption_warning(&self) -> Option<String> {
        self.corruption.lock().ok().and_then(|mut c| c.take())
    }

    pub fn status(&self) -> Result<IndexStatus, IndexError> {
        let snapshot = self.snapshot();
        let last_build = self
            .store
            .lock()
            .map_err(|_| IndexError::Init("index store lock poisoned".into()))?
            .last_build()?;

        Ok(IndexStatus {
            location: self.location.clone(),
            healthy: !self.needs_rebuild(),
            built: snapshot.is_built(),
            last_indexed_commit: snapshot.last_indexed_commit().map(str::to_string),
            generation: snapshot.generation(),
            commit_count: snapshot.commit_count(),
            document_count: snapshot.document_count(),
            term_count: snapshot.term_count(),
            posting_count: snapshot.posting_count(),
            average_document_length: snapshot.average_document_length(),
            last_build,
        })
    }

    /// Index commits added since the last indexed commit.
    ///
    /// Falls back to a full rebuild when nothing was indexed yet, when the
    /// index is marked for rebuild, or when the last indexed commit is no
    /// longer in history. Cancellation leaves the published index untouched.
    pub fn update(
        &self,
        provider: &dyn HistoryProvider,
        cancel: Option<&CancellationToken>,
    ) -> Result<BuildReport, IndexError> {
        self.build(provider, cancel, false)
    }

    /// Discard all indexed data and index the whole history again
    pub fn rebuild(
        &self,
        provider: &dyn HistoryProvider,
        cancel: Option<&CancellationToken>,
    ) -> Result<BuildReport, IndexError> {
        self.build(provider, cancel, true)
    }

    fn build(
        &self,
        provider: &dyn HistoryProvider,
        cancel: Option<&CancellationToken>,
        force_full: bool,
    ) -> Result<BuildReport, IndexError> {
        let started = Instant::now();
        let mut store = self
            .store
            .lock()
            .map_err(|_| IndexError::Init("index writer lock poisoned".into()))?;

        let commits = provider.commits()?;
        let base = self.snapshot();

        let mut full = force_full || self.needs_rebuild();
        let pending: &[CommitInfo] = if full {
            &commits
        } else {
            match base.last_indexed_commit() {
                None => {
                    full = true;
                    &commits
                }
                Some(pointer) => match commits.iter().position(|c| c.id == pointer) {
                    Some(pos) => &commits[..pos],
                    None => {
                        tracing::info!(
                            "Indexed commit {} is no longer in history; rebuilding",
                            pointer
                        );
                        full = true;
                        &commits
                    }
                },
            }
        };

        if !full && pending.is_empty() {
            return Ok(BuildReport {
                commits_indexed: 0,
                terms_added: 0,
                full_rebuild: false,
                duration_ms: started.elapsed().as_millis() as u64,
                generation: base.generation(),
            });
        }

        let mut next = if full {
            IndexSnapshot::default()
        } else {
            (*base).clone()
        };
        let terms_before = next.term_count();

        // Oldest first, so an interrupted history walk never skips a gap
        let mut deltas = Vec::with_capacity(pending.len());
        for commit in pending.iter().rev() {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                tracing::info!("Index build cancelled after {} commits", deltas.len());
                return Err(IndexError::Cancelled);
            }
            let delta = self.commit_delta(provider, commit)?;
            next.apply(&delta);
            deltas.push(delta);
        }

        next.set_last_indexed_commit(commits.first().map(|c| c.id.clone()));
        next.set_generation(base.generation() + 1);

        let report = BuildReport {
            commits_indexed: deltas.len(),
            terms_added: next.term_count().saturating_sub(terms_before),
            full_rebuild: full,
            duration_ms: started.elapsed().as_millis() as u64,
            generation: next.generation(),
        };
        store.persist(full, &deltas, &next, &report)?;

        match self.current.write() {
            Ok(mut guard) => *guard = Arc::new(next),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(next),
        }
        self.needs_rebuild.store(false, Ordering::SeqCst);

        tracing::info!(
            "Indexed {} commits ({} new terms, full rebuild: {}) in {}ms",
            report.commits_indexed,
            report.terms_added,
            report.full_rebuild,
            report.duration_ms
        );
        Ok(report)
    }

    fn commit_delta(
        &self,
        provider: &dyn HistoryProvider,
        commit: &CommitInfo,
    ) -> Result<CommitDelta, IndexError> {
        let (message_terms, _) = term_frequencies(&commit.message);

        let mut documents = Vec::new();
        for change in commit
            .changes
            .iter()
            .filter(|c| c.status != ChangeStatus::Deleted)
        {
            let Some(blob) = provider.read_file(&commit.id, &change.path)? else {
                continue;
            };
            if blob.len() > self.max_file_bytes || is_binary(&blob) {
                continue;
            }
            let (terms, length) = term_frequencies(&String::from_utf8_lossy(&blob));
            documents.push(DocumentDelta {
                path: change.path.clone(),
                length,
                terms,
            });
        }

        Ok(CommitDelta {
            commit_id: commit.id.clone(),
            message_terms,
            documents,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
