//! Throttled progress reporting

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

/// Point-in-time progress of a query
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Commits examined, summed over searchers
    pub completed: u64,
    pub total: u64,
    pub percent: f64,
    /// Results received by the merger
    pub results: u64,
}

/// Receiver of progress updates
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, query_id: Uuid, update: ProgressUpdate);
}

/// Per-query progress counter.
///
/// Updates reach the sink at most once per interval, except the final one.
pub struct ProgressReporter {
    query_id: Uuid,
    completed: AtomicU64,
    total: AtomicU64,
    results: AtomicU64,
    finished: AtomicBool,
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("query_id", &self.query_id)
            .field("update", &self.snapshot())
            .finish()
    }
}

impl ProgressReporter {
    pub fn new(query_id: Uuid, interval: Duration, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            query_id,
            completed: AtomicU64::new(0),
            total: AtomicU64::new(0),
            results: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            interval,
            last_emit: Mutex::new(None),
            sink,
        }
    }

    /// A reporter with no sink
    pub fn detached() -> Self {
        Self::new(Uuid::nil(), Duration::ZERO, None)
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn advance(&self, commits: u64) {
        self.completed.fetch_add(commits, Ordering::SeqCst);
        self.emit(false);
    }

    pub fn record_result(&self) {
        self.results.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressUpdate {
        let total = self.total.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        let percent = if self.finished.load(Ordering::SeqCst) {
            100.0
        } else if total == 0 {
            0.0
        } else {
            (completed as f64 / total as f64 * 100.0).min(100.0)
        };
        ProgressUpdate {
            completed,
            total,
            percent,
            results: self.results.load(Ordering::SeqCst),
        }
    }

    /// Mark the query done and emit a final update
    pub fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(true);
    }

    fn emit(&self, force: bool) {
        let Some(sink) = &self.sink else {
            return;
        };
        let now = Instant::now();
        {
            let Ok(mut last) = self.last_emit.lock() else {
                return;
            };
            if !force && last.is_some_and(|t| now.duration_since(t) < self.interval) {
                return;
            }
            *last = Some(now);
        }
        sink.on_progress(self.query_id, self.snapshot());
    }
}
