//! Per-query search context

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::index::{DEFAULT_MAX_FILE_BYTES, IndexSnapshot};
use crate::provider::{CommitInfo, HistoryProvider, ProviderError, is_binary};
use crate::ranking::RankingEngine;

use super::pool::WorkerPool;
use super::progress::ProgressReporter;

/// Everything one query's searchers share.
///
/// Created when a query is dispatched and dropped when it finishes; never
/// reused across queries. The index handle is a fixed snapshot, so an index
/// update during the query is not observed.
pub struct SearchContext {
    query_id: Uuid,
    provider: Arc<dyn HistoryProvider>,
    commits: Arc<Vec<CommitInfo>>,
    cancel: CancellationToken,
    index: Option<Arc<IndexSnapshot>>,
    cache: Option<Arc<ResultCache>>,
    ranking: Arc<RankingEngine>,
    progress: Arc<ProgressReporter>,
    pool: WorkerPool,
    batch_size: usize,
    max_file_bytes: usize,
}

impl std::fmt::Debug for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("query_id", &self.query_id)
            .field("commits", &self.commits.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("indexed", &self.index.is_some())
            .finish()
    }
}

impl SearchContext {
    /// A standalone context with default settings and no index or cache
    pub fn new(provider: Arc<dyn HistoryProvider>, commits: Arc<Vec<CommitInfo>>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            provider,
            commits,
            cancel: CancellationToken::new(),
            index: None,
            cache: None,
            ranking: Arc::new(RankingEngine::default()),
            progress: Arc::new(ProgressReporter::detached()),
            pool: WorkerPool::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_query_id(mut self, query_id: Uuid) -> Self {
        self.query_id = query_id;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_index(mut self, index: Option<Arc<IndexSnapshot>>) -> Self {
        self.index = index;
        self
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResultCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_ranking(mut self, ranking: Arc<RankingEngine>) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub fn provider(&self) -> &dyn HistoryProvider {
        self.provider.as_ref()
    }

    /// Commits of the query's repository state, newest first
    pub fn commits(&self) -> Arc<Vec<CommitInfo>> {
        Arc::clone(&self.commits)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The index snapshot, when a healthy index was available at dispatch
    pub fn index(&self) -> Option<&IndexSnapshot> {
        self.index.as_deref()
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_deref()
    }

    pub fn ranking(&self) -> &RankingEngine {
        &self.ranking
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Commits between cancellation checks and progress updates
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Read a text file at a commit.
    ///
    /// Missing, binary and oversize files read as `None`.
    pub fn read_text(&self, commit_id: &str, path: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let Some(blob) = self.provider.read_file(commit_id, path)? else {
            return Ok(None);
        };
        if blob.len() > self.max_file_bytes {
            tracing::debug!(path, bytes = blob.len(), "Skipping oversize file");
            return Ok(None);
        }
        if is_binary(&blob) {
            return Ok(None);
        }
        Ok(Some(blob))
    }
}
