//! Search Orchestrator
//!
//! Registry, scheduler and merge engine tying the searchers together:
//! - Typed builder with duplicate-checked searcher registration
//! - Concurrent dispatch on a bounded worker pool, cheapest searchers first
//! - Score-ordered or first-arrival merging with per-searcher failure isolation
//! - Cooperative cancellation and per-query deadlines with partial results
//! - Result caching with singleflight and HEAD invalidation
//! - Index upkeep: corruption recovery and explicit builds

mod context;
mod merge;
mod pool;
mod progress;
mod state;

pub use context::SearchContext;
pub use merge::{DEFAULT_LOOKAHEAD, MergeStrategy};
pub use pool::WorkerPool;
pub use progress::{ProgressReporter, ProgressSink, ProgressUpdate};
pub use state::{QueryOutcome, QueryState, QueryStatus, RETAINED_QUERIES, VariantError};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use uuid::Uuid;

use crate::cache::{CacheError, CacheKey, CacheStats, CachedResults, Lookup, ResultCache};
use crate::config::{EngineConfig, RebuildPolicy};
use crate::error::{Result, SearchError};
use crate::index::{BuildReport, IncrementalIndex, IndexSnapshot, IndexStatus};
use crate::provider::{CommitInfo, HistoryProvider, ProviderError};
use crate::query::{Dimension, SearchQuery, SearchResult, ValidationError};
use crate::ranking::RankingEngine;
use crate::searchers::{Capability, Searcher, SearcherCapability, SearcherError, default_searchers};

use merge::{coalesce, merge_streams, retain_intersection};
use state::{QueryRegistry, QueryTracker};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Searcher registration error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Searcher already registered: {0}")]
    Duplicate(String),
    #[error("No searchers registered")]
    Empty,
}

// ============================================================================
// BUILDER
// ============================================================================

enum IndexSetup {
    Disabled,
    Persistent,
    Provided(Arc<IncrementalIndex>),
}

/// Assembles an [`Orchestrator`]
pub struct OrchestratorBuilder {
    provider: Arc<dyn HistoryProvider>,
    searchers: Vec<Arc<dyn Searcher>>,
    config: EngineConfig,
    index: IndexSetup,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use an already opened index
    pub fn index(mut self, index: Arc<IncrementalIndex>) -> Self {
        self.index = IndexSetup::Provided(index);
        self
    }

    /// Open the provider's on-disk index under the configured data directory
    pub fn persistent_index(mut self) -> Self {
        self.index = IndexSetup::Persistent;
        self
    }

    /// Add a searcher; its name must not be registered yet
    pub fn register(mut self, searcher: Arc<dyn Searcher>) -> std::result::Result<Self, RegistryError> {
        if self.searchers.iter().any(|s| s.name() == searcher.name()) {
            return Err(RegistryError::Duplicate(searcher.name().to_string()));
        }
        self.searchers.push(searcher);
        Ok(self)
    }

    /// Add a searcher, replacing any registered under the same name
    pub fn register_override(mut self, searcher: Arc<dyn Searcher>) -> Self {
        match self.searchers.iter().position(|s| s.name() == searcher.name()) {
            Some(pos) => self.searchers[pos] = searcher,
            None => self.searchers.push(searcher),
        }
        self
    }

    pub fn with_default_searchers(self) -> std::result::Result<Self, RegistryError> {
        default_searchers()
            .into_iter()
            .try_fold(self, |builder, searcher| builder.register(searcher))
    }

    pub fn build(self) -> Result<Orchestrator> {
        if self.searchers.is_empty() {
            return Err(RegistryError::Empty.into());
        }
        let config = self.config;

        let index = match self.index {
            IndexSetup::Disabled => None,
            IndexSetup::Provided(index) => Some(index),
            IndexSetup::Persistent => {
                let data_dir = match &config.data_dir {
                    Some(dir) => dir.clone(),
                    None => IncrementalIndex::default_data_dir()?,
                };
                let index = IncrementalIndex::open(&data_dir, &self.provider.identity())?
                    .with_max_file_bytes(config.max_file_bytes);
                Some(Arc::new(index))
            }
        };

        let cache = config
            .cache_enabled
            .then(|| Arc::new(ResultCache::new(config.cache_capacity, config.cache_ttl)));

        tracing::debug!(
            searchers = self.searchers.len(),
            workers = config.worker_pool_size,
            indexed = index.is_some(),
            cached = cache.is_some(),
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                provider: self.provider,
                searchers: self.searchers,
                ranking: Arc::new(RankingEngine::new(config.ranking.clone())),
                pool: WorkerPool::new(config.worker_pool_size),
                config,
                index,
                cache,
                sink: self.sink,
                queries: Mutex::new(QueryRegistry::default()),
                computations: AtomicU64::new(0),
                rebuilding: AtomicBool::new(false),
            }),
        })
    }
}

// ============================================================================
// QUERY HANDLE
// ============================================================================

/// A submitted query.
///
/// Dropping the handle does not stop the query; use [`QueryHandle::cancel`].
pub struct QueryHandle {
    id: Uuid,
    results: mpsc::UnboundedReceiver<SearchResult>,
    outcome: oneshot::Receiver<Result<QueryOutcome>>,
    tracker: Arc<QueryTracker>,
}

impl QueryHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> QueryStatus {
        self.tracker.status()
    }

    pub fn cancel(&self) {
        self.tracker.cancel();
    }

    /// Next result of the ranked page, `None` once it is exhausted
    pub async fn next(&mut self) -> Option<SearchResult> {
        self.results.recv().await
    }

    /// Wait for the query to end
    pub async fn finish(self) -> Result<QueryOutcome> {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SearchError::Task("query task ended without an outcome".to_string())),
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Result of one resolution, computed or cached
struct Resolved {
    results: CachedResults,
    status: QueryState,
    errors: Vec<VariantError>,
    from_cache: bool,
    /// HEAD observed after the commit list was loaded
    head: String,
}

struct Inner {
    provider: Arc<dyn HistoryProvider>,
    searchers: Vec<Arc<dyn Searcher>>,
    config: EngineConfig,
    ranking: Arc<RankingEngine>,
    pool: WorkerPool,
    index: Option<Arc<IncrementalIndex>>,
    cache: Option<Arc<ResultCache>>,
    sink: Option<Arc<dyn ProgressSink>>,
    queries: Mutex<QueryRegistry>,
    computations: AtomicU64,
    rebuilding: AtomicBool,
}

/// Entry point for searching one history source.
///
/// Cheap to clone; clones share the registry, pool, index and cache.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("searchers", &self.searchers())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Orchestrator {
    /// An empty builder; register searchers before building
    pub fn builder(provider: Arc<dyn HistoryProvider>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            provider,
            searchers: Vec::new(),
            config: EngineConfig::default(),
            index: IndexSetup::Disabled,
            sink: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Registered searcher names, in registration order
    pub fn searchers(&self) -> Vec<String> {
        self.inner.searchers.iter().map(|s| s.name().to_string()).collect()
    }

    /// Searchers a query would dispatch, in dispatch order
    pub fn plan(&self, query: &SearchQuery) -> Result<Vec<SearcherCapability>> {
        query.validate()?;
        Ok(self
            .inner
            .select(query)?
            .iter()
            .map(|s| SearcherCapability::of(s.as_ref(), query))
            .collect())
    }

    /// Validate and start a query.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, query: SearchQuery) -> Result<QueryHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SearchError::Task(e.to_string()))?;

        let id = Uuid::new_v4();
        tracing::debug!(query_id = %id, "Query received");
        query.validate()?;
        let selected = self.inner.select(&query)?;

        let progress = Arc::new(ProgressReporter::new(
            id,
            self.inner.config.progress_interval,
            self.inner.sink.clone(),
        ));
        let tracker = Arc::new(QueryTracker::new(id, progress));
        tracker.transition(QueryState::Validated);
        self.inner.queries()?.insert(Arc::clone(&tracker));

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let task_tracker = Arc::clone(&tracker);
        let query = Arc::new(query);

        runtime.spawn(async move {
            let tracker = task_tracker;
            let outcome = inner.run(&tracker, query, selected).await;
            if let Err(e) = &outcome {
                tracing::warn!(query_id = %tracker.id(), error = %e, "Query failed");
                tracker.transition(QueryState::Failed);
            }
            tracker.progress().finish();

            if let Ok(outcome) = &outcome {
                for result in &outcome.results {
                    if results_tx.send(result.clone()).is_err() {
                        break;
                    }
                }
            }
            drop(results_tx);
            inner.retire(tracker.id());
            let _ = outcome_tx.send(outcome);
        });

        Ok(QueryHandle {
            id,
            results: results_rx,
            outcome: outcome_rx,
            tracker,
        })
    }

    /// Submit a query and wait for its outcome
    pub async fn search(&self, query: SearchQuery) -> Result<QueryOutcome> {
        self.submit(query)?.finish().await
    }

    /// State of a running or recently finished query
    pub fn status(&self, id: Uuid) -> Option<QueryStatus> {
        self.inner.queries().ok()?.status(&id)
    }

    /// Request cancellation; false when the query is not running
    pub fn cancel(&self, id: Uuid) -> bool {
        let Ok(queries) = self.inner.queries() else {
            return false;
        };
        match queries.get(&id) {
            Some(tracker) => {
                tracing::debug!(query_id = %id, "Cancellation requested");
                tracker.cancel();
                true
            }
            None => false,
        }
    }

    /// Index commits added since the last build
    pub async fn build_index(&self) -> Result<BuildReport> {
        self.inner.update_index(false).await
    }

    /// Discard the index and index the whole history again
    pub async fn rebuild_index(&self) -> Result<BuildReport> {
        self.inner.update_index(true).await
    }

    pub fn index_status(&self) -> Result<IndexStatus> {
        let index = self.inner.index.as_ref().ok_or(SearchError::IndexUnavailable)?;
        Ok(index.status()?)
    }

    /// Searches actually executed, as opposed to served from the cache
    pub fn computation_count(&self) -> u64 {
        self.inner.computations.load(Ordering::SeqCst)
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.cache.as_ref().map(|c| c.stats())
    }

    pub fn clear_cache(&self) -> Result<()> {
        if let Some(cache) = &self.inner.cache {
            cache.clear()?;
        }
        Ok(())
    }
}

impl Inner {
    fn queries(&self) -> Result<MutexGuard<'_, QueryRegistry>> {
        self.queries
            .lock()
            .map_err(|_| SearchError::Task("query registry lock poisoned".to_string()))
    }

    fn retire(&self, id: Uuid) {
        if let Ok(mut queries) = self.queries() {
            queries.finish(&id);
        }
    }

    /// Applicable searchers, cheapest first
    fn select(&self, query: &SearchQuery) -> std::result::Result<Vec<Arc<dyn Searcher>>, ValidationError> {
        let mut selected: Vec<(f64, Arc<dyn Searcher>)> = self
            .searchers
            .iter()
            .filter(|s| s.can_handle(query))
            .map(|s| (s.estimated_cost(query), Arc::clone(s)))
            .collect();
        if selected.is_empty() {
            return Err(ValidationError::NoApplicableSearcher);
        }
        selected.sort_by(|(ca, a), (cb, b)| ca.total_cmp(cb).then_with(|| a.name().cmp(b.name())));
        Ok(selected.into_iter().map(|(_, s)| s).collect())
    }

    async fn run(
        self: &Arc<Self>,
        tracker: &Arc<QueryTracker>,
        query: Arc<SearchQuery>,
        selected: Vec<Arc<dyn Searcher>>,
    ) -> Result<QueryOutcome> {
        let started = Instant::now();
        let id = tracker.id();

        let deadline = query.max_duration.map(|limit| {
            let tracker = Arc::clone(tracker);
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        tracing::info!(query_id = %tracker.id(), "Query deadline reached");
                        tracker.time_out();
                    }
                    _ = tracker.cancel_token().cancelled() => {}
                }
            })
        });
        let resolved = self.resolve(tracker, &query, &selected).await;
        if let Some(timer) = deadline {
            timer.abort();
        }
        let resolved = resolved?;

        let total_matches = resolved.results.len();
        let page = query.pagination.apply(resolved.results.as_ref().clone());
        tracker.transition(resolved.status);

        let outcome = QueryOutcome {
            query_id: id,
            status: resolved.status,
            results: page,
            total_matches,
            errors: resolved.errors,
            warnings: tracker.warnings(),
            from_cache: resolved.from_cache,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            query_id = %id,
            status = %outcome.status,
            matches = total_matches,
            from_cache = outcome.from_cache,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Query finished"
        );
        Ok(outcome)
    }

    /// Serve from the cache or compute, bypassing the cache on its failure
    async fn resolve(
        self: &Arc<Self>,
        tracker: &Arc<QueryTracker>,
        query: &Arc<SearchQuery>,
        selected: &[Arc<dyn Searcher>],
    ) -> Result<Resolved> {
        let head = self.head().await?;
        let index = self.prepare_index(tracker).await;

        let Some(cache) = &self.cache else {
            return self.compute(tracker, query, selected, index, &head).await.0;
        };

        let names: BTreeSet<String> = selected.iter().map(|s| s.name().to_string()).collect();
        let generation = index.as_ref().map_or(0, |s| s.generation());
        let key = match CacheKey::compute(&query.normalized(), &head, &names, generation) {
            Ok(key) => key,
            Err(e) => {
                bypass(tracker, &e);
                return self.compute(tracker, query, selected, index, &head).await.0;
            }
        };

        let lookup = cache
            .get_or_compute_until(key, &head, tracker.cancel_token(), || {
                self.compute(tracker, query, selected, index.clone(), &head)
            })
            .await;
        match lookup {
            Ok(Lookup::Hit(results)) | Ok(Lookup::Shared(results)) => {
                tracing::debug!(query_id = %tracker.id(), key = %key.to_hex(), "Served from cache");
                Ok(Resolved {
                    results,
                    status: QueryState::Completed,
                    errors: Vec::new(),
                    from_cache: true,
                    head,
                })
            }
            Ok(Lookup::Abandoned) => {
                tracing::debug!(query_id = %tracker.id(), key = %key.to_hex(), "Stopped waiting on shared computation");
                Ok(Resolved {
                    results: Arc::new(Vec::new()),
                    status: stopped_state(tracker),
                    errors: Vec::new(),
                    from_cache: false,
                    head,
                })
            }
            Ok(Lookup::Computed(resolved)) => resolved,
            Err(e) => {
                bypass(tracker, &e);
                self.compute(tracker, query, selected, index, &head).await.0
            }
        }
    }

    /// Run the searchers; the second value is what the cache may store.
    ///
    /// Results are cacheable only when HEAD still equals `head`, the HEAD
    /// the cache key was built from.
    async fn compute(
        &self,
        tracker: &Arc<QueryTracker>,
        query: &Arc<SearchQuery>,
        selected: &[Arc<dyn Searcher>],
        index: Option<Arc<IndexSnapshot>>,
        head: &str,
    ) -> (Result<Resolved>, Option<CachedResults>) {
        match self.dispatch(tracker, query, selected, index).await {
            Ok(resolved) => {
                if resolved.head != head {
                    tracing::debug!(query_id = %tracker.id(), "HEAD moved during query; result not cached");
                }
                let cacheable = (resolved.status == QueryState::Completed
                    && resolved.errors.is_empty()
                    && resolved.head == head)
                    .then(|| Arc::clone(&resolved.results));
                (Ok(resolved), cacheable)
            }
            Err(e) => (Err(e), None),
        }
    }

    async fn dispatch(
        &self,
        tracker: &Arc<QueryTracker>,
        query: &Arc<SearchQuery>,
        selected: &[Arc<dyn Searcher>],
        index: Option<Arc<IndexSnapshot>>,
    ) -> Result<Resolved> {
        let id = tracker.id();
        let computation = self.computations.fetch_add(1, Ordering::SeqCst) + 1;
        let commits = Arc::new(self.load_commits().await?);
        let head = self.head().await?;
        tracing::debug!(
            query_id = %id,
            commits = commits.len(),
            searchers = selected.len(),
            computation,
            "Dispatching query"
        );
        tracker
            .progress()
            .set_total((commits.len() * selected.len()) as u64);

        let ctx = Arc::new(
            SearchContext::new(Arc::clone(&self.provider), commits)
                .with_query_id(id)
                .with_cancel_token(tracker.cancel_token().clone())
                .with_index(index)
                .with_cache(self.cache.clone())
                .with_ranking(Arc::clone(&self.ranking))
                .with_progress(Arc::clone(tracker.progress()))
                .with_pool(self.pool.clone())
                .with_batch_size(self.config.batch_size)
                .with_max_file_bytes(self.config.max_file_bytes),
        );
        tracker.transition(QueryState::Dispatched);

        let strategy = self.config.merge_strategy;
        let mut receivers = Vec::with_capacity(selected.len());
        let mut workers = Vec::with_capacity(selected.len());
        for searcher in selected {
            let (tx, rx) = mpsc::channel(strategy.channel_capacity());
            receivers.push(rx);
            let task = tokio::spawn(run_searcher(
                Arc::clone(searcher),
                Arc::clone(&ctx),
                Arc::clone(query),
                tx,
            ));
            workers.push((searcher.name().to_string(), task));
        }

        tracker.transition(QueryState::Streaming);
        let progress = Arc::clone(tracker.progress());
        let mut merged = Vec::new();
        merge_streams(strategy, receivers, &self.ranking, |result| {
            progress.record_result();
            merged.push(result);
        })
        .await;

        let mut errors = Vec::new();
        for (name, task) in workers {
            let finished = match task.await {
                Ok(finished) => finished,
                Err(e) => Err(join_failure(e)),
            };
            match finished {
                Ok(sent) => {
                    tracing::debug!(query_id = %id, searcher = %name, results = sent, "Searcher finished")
                }
                Err(e) => {
                    tracing::warn!(query_id = %id, searcher = %name, error = %e, "Searcher failed");
                    let error = VariantError {
                        searcher: name,
                        message: e.to_string(),
                    };
                    tracker.record_error(error.clone());
                    errors.push(error);
                }
            }
        }

        let mut results = coalesce(merged);
        if query.require_all {
            let served: BTreeSet<Dimension> = selected
                .iter()
                .flat_map(|s| s.capabilities().iter().map(Capability::dimension))
                .collect();
            let required: BTreeSet<Dimension> = query
                .populated_dimensions()
                .intersection(&served)
                .copied()
                .collect();
            results = retain_intersection(results, &required);
        }
        let ranked = self.ranking.rank(results);
        tracker.transition(QueryState::Ranked);

        let status = if tracker.cancel_token().is_cancelled() {
            stopped_state(tracker)
        } else if errors.len() == selected.len() {
            QueryState::Failed
        } else {
            QueryState::Completed
        };

        Ok(Resolved {
            results: Arc::new(ranked),
            status,
            errors,
            from_cache: false,
            head,
        })
    }

    async fn head(&self) -> Result<String> {
        let provider = Arc::clone(&self.provider);
        match tokio::task::spawn_blocking(move || provider.head()).await? {
            Ok(head) => Ok(head),
            Err(ProviderError::EmptyRepository) => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_commits(&self) -> Result<Vec<CommitInfo>> {
        let provider = Arc::clone(&self.provider);
        Ok(tokio::task::spawn_blocking(move || provider.commits()).await??)
    }

    /// The index snapshot a query may use, recovering from corruption first
    async fn prepare_index(self: &Arc<Self>, tracker: &QueryTracker) -> Option<Arc<IndexSnapshot>> {
        let index = self.index.as_ref()?;

        if let Some(reason) = index.take_corruption_warning() {
            tracing::warn!(query_id = %tracker.id(), reason = %reason, "Index corruption detected");
            tracker.warn(format!("index corruption detected: {reason}"));
        }

        if index.needs_rebuild() {
            match self.config.rebuild_policy {
                RebuildPolicy::Immediate => {
                    if let Err(e) = self.update_index(false).await {
                        tracing::warn!(error = %e, "Index rebuild failed; searching without index");
                        tracker.warn(format!("index rebuild failed: {e}"));
                        return None;
                    }
                }
                RebuildPolicy::Background => {
                    self.spawn_background_rebuild();
                    tracker.warn("index rebuild in progress; ranking without index");
                    return None;
                }
            }
        }

        let snapshot = index.snapshot();
        (snapshot.is_built() && !index.needs_rebuild()).then_some(snapshot)
    }

    fn spawn_background_rebuild(self: &Arc<Self>) {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = inner.update_index(false).await {
                tracing::warn!(error = %e, "Background index rebuild failed");
            }
            inner.rebuilding.store(false, Ordering::SeqCst);
        });
    }

    async fn update_index(&self, full: bool) -> Result<BuildReport> {
        let index = self.index.clone().ok_or(SearchError::IndexUnavailable)?;
        let provider = Arc::clone(&self.provider);
        let report = tokio::task::spawn_blocking(move || {
            if full {
                index.rebuild(provider.as_ref(), None)
            } else {
                index.update(provider.as_ref(), None)
            }
        })
        .await??;

        tracing::info!(
            commits = report.commits_indexed,
            terms_added = report.terms_added,
            full_rebuild = report.full_rebuild,
            duration_ms = report.duration_ms,
            generation = report.generation,
            "Index build complete"
        );
        Ok(report)
    }
}

/// Terminal state of a query whose token fired
fn stopped_state(tracker: &QueryTracker) -> QueryState {
    if tracker.timed_out() {
        QueryState::TimedOut
    } else {
        QueryState::Cancelled
    }
}

fn bypass(tracker: &QueryTracker, error: &CacheError) {
    tracing::warn!(query_id = %tracker.id(), error = %error, "Result cache unavailable; bypassing");
    tracker.warn(format!("cache bypassed: {error}"));
}

/// Drive one searcher on the blocking pool, forwarding its results
async fn run_searcher(
    searcher: Arc<dyn Searcher>,
    ctx: Arc<SearchContext>,
    query: Arc<SearchQuery>,
    tx: mpsc::Sender<SearchResult>,
) -> std::result::Result<usize, SearcherError> {
    let permit = ctx
        .pool()
        .acquire()
        .await
        .map_err(|e| SearcherError::Failed(e.to_string()))?;
    if ctx.is_cancelled() {
        return Ok(0);
    }

    let worker = tokio::task::spawn_blocking(move || -> std::result::Result<usize, SearcherError> {
        let _permit = permit;
        let mut sent = 0;
        for item in searcher.search(ctx, query)? {
            // An error ends this searcher; what it already sent is kept
            if tx.blocking_send(item?).is_err() {
                break;
            }
            sent += 1;
        }
        Ok(sent)
    });
    match worker.await {
        Ok(finished) => finished,
        Err(e) => Err(join_failure(e)),
    }
}

fn join_failure(e: JoinError) -> SearcherError {
    if !e.is_panic() {
        return SearcherError::Failed(e.to_string());
    }
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    SearcherError::Panicked(message)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MemoryCommit, MemoryProvider};
    use crate::searchers::testing::{at, history};
    use crate::searchers::{AuthorSearcher, ResultStream};

    struct Broken;

    impl Searcher for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::Author]
        }

        fn can_handle(&self, query: &SearchQuery) -> bool {
            query.author.is_some()
        }

        fn estimated_cost(&self, _query: &SearchQuery) -> f64 {
            0.5
        }

        fn search(
            &self,
            _ctx: Arc<SearchContext>,
            _query: Arc<SearchQuery>,
        ) -> std::result::Result<ResultStream, SearcherError> {
            Err(SearcherError::Failed("deliberately broken".into()))
        }
    }

    struct Panicking;

    impl Searcher for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::Message]
        }

        fn can_handle(&self, query: &SearchQuery) -> bool {
            query.author.is_some()
        }

        fn estimated_cost(&self, _query: &SearchQuery) -> f64 {
            0.5
        }

        fn search(
            &self,
            _ctx: Arc<SearchContext>,
            _query: Arc<SearchQuery>,
        ) -> std::result::Result<ResultStream, SearcherError> {
            panic!("searcher exploded")
        }
    }

    fn orchestrator(provider: Arc<MemoryProvider>) -> Orchestrator {
        Orchestrator::builder(provider)
            .with_default_searchers()
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicate_registration() {
        let builder = Orchestrator::builder(history()).with_default_searchers().unwrap();
        let err = builder.register(Arc::new(AuthorSearcher)).err().unwrap();
        assert!(matches!(err, RegistryError::Duplicate(name) if name == "author"));
    }

    #[test]
    fn test_override_replaces() {
        let orch = Orchestrator::builder(history())
            .with_default_searchers()
            .unwrap()
            .register_override(Arc::new(AuthorSearcher))
            .build()
            .unwrap();
        assert_eq!(orch.searchers().len(), 8);
    }

    #[test]
    fn test_empty_registry() {
        let err = Orchestrator::builder(history()).build().err().unwrap();
        assert!(matches!(err, SearchError::Registry(RegistryError::Empty)));
    }

    #[test]
    fn test_plan_orders_by_cost() {
        let orch = orchestrator(history());
        let query = SearchQuery::builder()
            .author("alice")
            .content("foo")
            .commit_id("ab")
            .build()
            .unwrap();
        let names: Vec<_> = orch.plan(&query).unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["commit_id", "author", "content"]);
    }

    #[tokio::test]
    async fn test_author_query() {
        let orch = orchestrator(history());
        let query = SearchQuery::builder().author("alice").build().unwrap();
        let outcome = orch.search(query).await.unwrap();
        assert_eq!(outcome.status, QueryState::Completed);
        assert_eq!(outcome.total_matches, 2);
        assert!(outcome.results.iter().all(|r| r.author.starts_with("Alice")));
        // Newest first on equal scores
        assert!(outcome.results[0].commit_time > outcome.results[1].commit_time);
    }

    #[tokio::test]
    async fn test_no_applicable_searcher() {
        let orch = Orchestrator::builder(history())
            .register(Arc::new(AuthorSearcher))
            .unwrap()
            .build()
            .unwrap();
        let query = SearchQuery::builder().message("parser").build().unwrap();
        assert!(matches!(
            orch.submit(query).err().unwrap(),
            SearchError::Validation(ValidationError::NoApplicableSearcher)
        ));
    }

    #[tokio::test]
    async fn test_pagination_after_ranking() {
        let orch = orchestrator(history());
        let all = orch
            .search(SearchQuery::builder().since(at(0)).build().unwrap())
            .await
            .unwrap();
        assert_eq!(all.total_matches, 5);

        let page = orch
            .search(SearchQuery::builder().since(at(0)).offset(1).limit(2).build().unwrap())
            .await
            .unwrap();
        assert_eq!(page.total_matches, 5);
        let ids: Vec<_> = page.results.iter().map(|r| &r.commit_id).collect();
        let expected: Vec<_> = all.results[1..3].iter().map(|r| &r.commit_id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let orch = Orchestrator::builder(history())
            .with_default_searchers()
            .unwrap()
            .register(Arc::new(Broken))
            .unwrap()
            .register(Arc::new(Panicking))
            .unwrap()
            .build()
            .unwrap();
        let outcome = orch
            .search(SearchQuery::builder().author("alice").build().unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.status, QueryState::Completed);
        assert_eq!(outcome.total_matches, 2);
        assert_eq!(outcome.errors.len(), 2);
        let panicked = outcome.errors.iter().find(|e| e.searcher == "panicking").unwrap();
        assert!(panicked.message.contains("searcher exploded"));
    }

    #[tokio::test]
    async fn test_all_failed() {
        let orch = Orchestrator::builder(history())
            .register(Arc::new(Broken))
            .unwrap()
            .build()
            .unwrap();
        let outcome = orch
            .search(SearchQuery::builder().author("alice").build().unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.status, QueryState::Failed);
        assert!(outcome.results.is_empty());
        assert!(outcome.into_complete().is_err());
    }

    #[tokio::test]
    async fn test_provider_unreachable() {
        let provider = history();
        provider.set_unavailable(true);
        let orch = orchestrator(provider);
        let err = orch
            .search(SearchQuery::builder().author("alice").build().unwrap())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SearchError::Provider(_)));
    }

    #[tokio::test]
    async fn test_cache_hit_and_head_invalidation() {
        let provider = history();
        let orch = orchestrator(Arc::clone(&provider));
        let query = SearchQuery::builder().author("alice").build().unwrap();

        let first = orch.search(query.clone()).await.unwrap();
        let second = orch.search(query.clone()).await.unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.results, second.results);
        assert_eq!(orch.computation_count(), 1);

        provider
            .commit(MemoryCommit::new("Alice", at(6_000), "Another one").file("x.txt", "x\n"))
            .unwrap();
        let third = orch.search(query).await.unwrap();
        assert!(!third.from_cache);
        assert_eq!(third.total_matches, 3);
        assert_eq!(orch.computation_count(), 2);
    }

    /// Lands a commit between the HEAD read and the commit walk of the
    /// first query
    struct RacingProvider {
        inner: Arc<MemoryProvider>,
        raced: AtomicBool,
    }

    impl HistoryProvider for RacingProvider {
        fn identity(&self) -> String {
            self.inner.identity()
        }

        fn head(&self) -> std::result::Result<String, ProviderError> {
            self.inner.head()
        }

        fn commits(&self) -> std::result::Result<Vec<CommitInfo>, ProviderError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.commit(
                    MemoryCommit::new("Alice", at(6_000), "Racing commit").file("y.txt", "y\n"),
                )?;
            }
            self.inner.commits()
        }

        fn read_file(
            &self,
            commit_id: &str,
            path: &str,
        ) -> std::result::Result<Option<Vec<u8>>, ProviderError> {
            self.inner.read_file(commit_id, path)
        }
    }

    #[tokio::test]
    async fn test_head_moving_mid_query_is_not_cached() {
        let provider = Arc::new(RacingProvider {
            inner: history(),
            raced: AtomicBool::new(false),
        });
        let orch = Orchestrator::builder(provider)
            .with_default_searchers()
            .unwrap()
            .build()
            .unwrap();
        let query = SearchQuery::builder().author("alice").build().unwrap();

        let first = orch.search(query.clone()).await.unwrap();
        assert_eq!(first.status, QueryState::Completed);
        assert_eq!(first.total_matches, 3);
        assert_eq!(orch.cache_stats().unwrap().entries, 0);

        let second = orch.search(query).await.unwrap();
        assert!(!second.from_cache);
        assert_eq!(second.total_matches, 3);
        assert_eq!(orch.cache_stats().unwrap().entries, 1);
    }

    #[tokio::test]
    async fn test_status_and_stream() {
        let orch = orchestrator(history());
        let mut handle = orch
            .submit(SearchQuery::builder().author("alice").build().unwrap())
            .unwrap();
        let id = handle.id();
        let mut streamed = Vec::new();
        while let Some(result) = handle.next().await {
            streamed.push(result);
        }
        let outcome = handle.finish().await.unwrap();
        assert_eq!(streamed, outcome.results);

        let status = orch.status(id).unwrap();
        assert_eq!(status.state, QueryState::Completed);
        assert_eq!(status.progress.percent, 100.0);
        assert!(!orch.cancel(id));
    }

    #[tokio::test]
    async fn test_index_requires_configuration() {
        let orch = orchestrator(history());
        assert!(matches!(orch.build_index().await, Err(SearchError::IndexUnavailable)));
        assert!(matches!(orch.index_status(), Err(SearchError::IndexUnavailable)));
    }

    #[tokio::test]
    async fn test_indexed_content_query() {
        let provider = history();
        let index = Arc::new(IncrementalIndex::open_in_memory().unwrap());
        let orch = Orchestrator::builder(provider)
            .with_default_searchers()
            .unwrap()
            .index(index)
            .build()
            .unwrap();
        let report = orch.build_index().await.unwrap();
        assert_eq!(report.commits_indexed, 5);
        assert!(orch.index_status().unwrap().built);

        let outcome = orch
            .search(SearchQuery::builder().content("bar").build().unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.total_matches, 1);
        let hit = &outcome.results[0];
        assert_eq!(hit.file_path.as_deref(), Some("src/parser.rs"));
        assert!(hit.score > 0.0 && hit.score < 1.0);
    }
}
