//! Query lifecycle state and the registry of recent queries

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, SearchError};
use crate::query::SearchResult;
use crate::searchers::SearcherError;

use super::progress::{ProgressReporter, ProgressUpdate};

/// Finished queries kept for status lookups
pub const RETAINED_QUERIES: usize = 256;

/// Lifecycle of one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Received,
    Validated,
    Dispatched,
    Streaming,
    Ranked,
    Completed,
    Cancelled,
    TimedOut,
    Failed,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Completed | QueryState::Cancelled | QueryState::TimedOut | QueryState::Failed
        )
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryState::Received => "received",
            QueryState::Validated => "validated",
            QueryState::Dispatched => "dispatched",
            QueryState::Streaming => "streaming",
            QueryState::Ranked => "ranked",
            QueryState::Completed => "completed",
            QueryState::Cancelled => "cancelled",
            QueryState::TimedOut => "timed_out",
            QueryState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A failure isolated to one searcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantError {
    pub searcher: String,
    pub message: String,
}

/// Snapshot returned by `Orchestrator::status`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatus {
    pub query_id: Uuid,
    pub state: QueryState,
    pub progress: ProgressUpdate,
    pub errors: Vec<VariantError>,
    pub warnings: Vec<String>,
}

/// Final result of a query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub query_id: Uuid,
    pub status: QueryState,
    /// The requested page, ranked
    pub results: Vec<SearchResult>,
    /// Matches before pagination
    pub total_matches: usize,
    pub errors: Vec<VariantError>,
    pub warnings: Vec<String>,
    pub from_cache: bool,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl QueryOutcome {
    /// True when the query ran to completion, even with no matches
    pub fn is_complete(&self) -> bool {
        self.status == QueryState::Completed
    }

    /// The outcome when complete; otherwise the error describing why not
    pub fn into_complete(self) -> Result<QueryOutcome> {
        match self.status {
            QueryState::Cancelled => Err(SearchError::Cancelled),
            QueryState::TimedOut => Err(SearchError::Timeout),
            QueryState::Failed => {
                let first = self.errors.into_iter().next().unwrap_or(VariantError {
                    searcher: "orchestrator".to_string(),
                    message: "query failed".to_string(),
                });
                Err(SearchError::Searcher {
                    searcher: first.searcher,
                    source: SearcherError::Failed(first.message),
                })
            }
            _ => Ok(self),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

// ============================================================================
// TRACKING
// ============================================================================

#[derive(Debug)]
struct TrackerState {
    state: QueryState,
    errors: Vec<VariantError>,
    warnings: Vec<String>,
}

/// Live state of one query, shared between its task and status callers
#[derive(Debug)]
pub(crate) struct QueryTracker {
    id: Uuid,
    cancel: CancellationToken,
    timed_out: AtomicBool,
    progress: Arc<ProgressReporter>,
    inner: Mutex<TrackerState>,
}

impl QueryTracker {
    pub fn new(id: Uuid, progress: Arc<ProgressReporter>) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
            timed_out: AtomicBool::new(false),
            progress,
            inner: Mutex::new(TrackerState {
                state: QueryState::Received,
                errors: Vec::new(),
                warnings: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn progress(&self) -> &Arc<ProgressReporter> {
        &self.progress
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel because the query's deadline passed
    pub fn time_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// Move to `next`; a terminal state is never left
    pub fn transition(&self, next: QueryState) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.state.is_terminal() {
            return;
        }
        tracing::debug!(query_id = %self.id, from = %inner.state, to = %next, "Query state");
        inner.state = next;
    }

    pub fn record_error(&self, error: VariantError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.errors.push(error);
        }
    }

    pub fn warn(&self, warning: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.warnings.push(warning.into());
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.inner.lock().map(|s| s.warnings.clone()).unwrap_or_default()
    }

    pub fn status(&self) -> QueryStatus {
        let (state, errors, warnings) = match self.inner.lock() {
            Ok(inner) => (inner.state, inner.errors.clone(), inner.warnings.clone()),
            Err(_) => (QueryState::Failed, Vec::new(), Vec::new()),
        };
        QueryStatus {
            query_id: self.id,
            state,
            progress: self.progress.snapshot(),
            errors,
            warnings,
        }
    }
}

/// Live queries plus a bounded history of finished ones
#[derive(Debug, Default)]
pub(crate) struct QueryRegistry {
    active: HashMap<Uuid, Arc<QueryTracker>>,
    finished: VecDeque<QueryStatus>,
}

impl QueryRegistry {
    pub fn insert(&mut self, tracker: Arc<QueryTracker>) {
        self.active.insert(tracker.id(), tracker);
    }

    pub fn get(&self, id: &Uuid) -> Option<&Arc<QueryTracker>> {
        self.active.get(id)
    }

    /// Retire a query, keeping its final status
    pub fn finish(&mut self, id: &Uuid) {
        let Some(tracker) = self.active.remove(id) else {
            return;
        };
        if self.finished.len() >= RETAINED_QUERIES {
            self.finished.pop_front();
        }
        self.finished.push_back(tracker.status());
    }

    pub fn status(&self, id: &Uuid) -> Option<QueryStatus> {
        if let Some(tracker) = self.active.get(id) {
            return Some(tracker.status());
        }
        self.finished.iter().rev().find(|s| s.query_id == *id).cloned()
    }
}
