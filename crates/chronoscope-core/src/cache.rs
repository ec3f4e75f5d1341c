//! Result Cache
//!
//! LRU cache of complete ranked result lists, keyed by the normalized query,
//! the HEAD commit, the participating searchers and the index generation.
//!
//! - Concurrent identical misses share one computation (singleflight)
//! - A HEAD change evicts every entry computed against the old HEAD
//! - Only complete, error-free computations are stored
//! - Optional time-to-live on entries

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::query::{SearchQuery, SearchResult};

/// Shared ranked results
pub type CachedResults = Arc<Vec<SearchResult>>;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Cache error type; callers bypass the cache on any of these
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Cache key error: {0}")]
    Key(String),
}

// ============================================================================
// KEY
// ============================================================================

/// Digest identifying one computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// # Arguments
    /// * `query` - Normalized query
    /// * `head` - HEAD commit the results were computed against
    /// * `searchers` - Names of the participating searchers
    /// * `index_generation` - Generation of the index snapshot in use, 0 without one
    pub fn compute(
        query: &SearchQuery,
        head: &str,
        searchers: &BTreeSet<String>,
        index_generation: u64,
    ) -> Result<Self, CacheError> {
        let encoded = serde_json::to_vec(&(query, head, searchers, index_generation))
            .map_err(|e| CacheError::Key(e.to_string()))?;
        Ok(Self(*blake3::hash(&encoded).as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// How a cached lookup was satisfied
#[derive(Debug)]
pub enum Lookup<T> {
    /// Served from a stored entry
    Hit(CachedResults),
    /// Waited on a concurrent identical computation
    Shared(CachedResults),
    /// This caller ran the computation
    Computed(T),
    /// Cancelled while waiting on another caller's computation
    Abandoned,
}

/// Counters for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub shared: u64,
    pub entries: usize,
    pub invalidations: u64,
}

struct Entry {
    results: CachedResults,
    created_at: Instant,
}

type Flight = Arc<OnceCell<CachedResults>>;

struct CacheState {
    entries: LruCache<CacheKey, Entry>,
    inflight: HashMap<CacheKey, Flight>,
    head: Option<String>,
    stats: CacheStats,
}

impl CacheState {
    /// Evict everything when HEAD moved
    fn observe_head(&mut self, head: &str) {
        if self.head.as_deref() == Some(head) {
            return;
        }
        if self.head.is_some() && !self.entries.is_empty() {
            tracing::debug!(
                "HEAD moved to {}; evicting {} cached result sets",
                head,
                self.entries.len()
            );
            self.stats.invalidations += 1;
        }
        self.entries.clear();
        self.head = Some(head.to_string());
    }
}

/// LRU result cache with singleflight
pub struct ResultCache {
    state: Mutex<CacheState>,
    ttl: Option<Duration>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                inflight: HashMap::new(),
                head: None,
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, CacheError> {
        self.state
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }

    pub fn stats(&self) -> CacheStats {
        match self.state.lock() {
            Ok(state) => CacheStats {
                entries: state.entries.len(),
                ..state.stats
            },
            Err(_) => CacheStats::default(),
        }
    }

    /// Record the current HEAD, evicting entries computed against another
    pub fn invalidate_for_head(&self, head: &str) -> Result<(), CacheError> {
        self.lock()?.observe_head(head);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        self.lock()?.entries.clear();
        Ok(())
    }

    /// Serve `key` from the cache, from a concurrent identical computation,
    /// or by running `compute`.
    ///
    /// `compute` returns the caller's full outcome plus, when the outcome is
    /// complete and error-free, the results to store. An uncacheable outcome
    /// is not shared: waiting callers run their own computation.
    ///
    /// Errors are returned only before any computation starts.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: CacheKey,
        head: &str,
        compute: F,
    ) -> Result<Lookup<T>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = (T, Option<CachedResults>)>,
    {
        self.get_or_compute_until(key, head, &CancellationToken::new(), compute)
            .await
    }

    /// [`get_or_compute`](Self::get_or_compute), giving up with
    /// [`Lookup::Abandoned`] when `cancel` fires while this caller waits on
    /// another caller's computation.
    ///
    /// A caller leading the flight always runs `compute` to completion; the
    /// computation is expected to observe `cancel` itself.
    pub async fn get_or_compute_until<T, F, Fut>(
        &self,
        key: CacheKey,
        head: &str,
        cancel: &CancellationToken,
        compute: F,
    ) -> Result<Lookup<T>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = (T, Option<CachedResults>)>,
    {
        let flight = {
            let mut state = self.lock()?;
            state.observe_head(head);

            let expired = match state.entries.get(&key) {
                Some(entry) if self.ttl.is_some_and(|ttl| entry.created_at.elapsed() > ttl) => true,
                Some(entry) => {
                    let results = Arc::clone(&entry.results);
                    state.stats.hits += 1;
                    return Ok(Lookup::Hit(results));
                }
                None => false,
            };
            if expired {
                state.entries.pop(&key);
            }

            state.stats.misses += 1;
            Arc::clone(
                state
                    .inflight
                    .entry(key)
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let mut computed: Option<T> = None;
        let leading = AtomicBool::new(false);
        let outcome = {
            let slot = &mut computed;
            let leading = &leading;
            let init = flight.get_or_try_init(move || async move {
                leading.store(true, Ordering::SeqCst);
                let (value, cacheable) = compute().await;
                *slot = Some(value);
                cacheable.ok_or(())
            });
            tokio::pin!(init);
            tokio::select! {
                biased;
                outcome = &mut init => outcome.cloned(),
                _ = cancel.cancelled() => {
                    if !leading.load(Ordering::SeqCst) {
                        // Dropping the wait leaves the flight to its other callers
                        return Ok(Lookup::Abandoned);
                    }
                    init.await.cloned()
                }
            }
        };

        let Some(value) = computed else {
            return match outcome {
                Ok(results) => {
                    if let Ok(mut state) = self.state.lock() {
                        state.stats.shared += 1;
                    }
                    Ok(Lookup::Shared(results))
                }
                Err(()) => Err(CacheError::Unavailable(
                    "shared computation finished without a result".to_string(),
                )),
            };
        };

        // This caller led the flight: publish and retire it atomically
        match self.state.lock() {
            Ok(mut state) => {
                if state
                    .inflight
                    .get(&key)
                    .is_some_and(|f| Arc::ptr_eq(f, &flight))
                {
                    state.inflight.remove(&key);
                }
                if let Ok(results) = outcome
                    && state.head.as_deref() == Some(head)
                {
                    state.entries.put(
                        key,
                        Entry {
                            results,
                            created_at: Instant::now(),
                        },
                    );
                }
            }
            Err(_) => tracing::warn!("Result cache lock poisoned; result not stored"),
        }

        Ok(Lookup::Computed(value))
    }
}

// ============================================================================
// TESTS
// ============================================================================
