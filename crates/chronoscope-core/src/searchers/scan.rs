//! Lazy per-commit scan shared by the built-in searchers

use std::collections::VecDeque;
use std::sync::Arc;

use crate::orchestrator::SearchContext;
use crate::provider::CommitInfo;
use crate::query::SearchResult;

use super::{ResultStream, SearcherError};

/// Walks the context's commits, newest first, feeding each to `visit`.
///
/// Cancellation is checked before every commit; progress is reported every
/// `batch_size` commits and once at the end. A visit error ends the stream
/// after the results already produced.
pub(crate) struct CommitScan<F> {
    ctx: Arc<SearchContext>,
    commits: Arc<Vec<CommitInfo>>,
    cursor: usize,
    unreported: u64,
    pending: VecDeque<SearchResult>,
    visit: F,
    finished: bool,
}

impl<F> CommitScan<F>
where
    F: FnMut(&SearchContext, &CommitInfo) -> Result<Vec<SearchResult>, SearcherError>
        + Send
        + 'static,
{
    pub fn new(ctx: Arc<SearchContext>, visit: F) -> Self {
        let commits = ctx.commits();
        Self {
            ctx,
            commits,
            cursor: 0,
            unreported: 0,
            pending: VecDeque::new(),
            visit,
            finished: false,
        }
    }

    pub fn boxed(ctx: Arc<SearchContext>, visit: F) -> ResultStream {
        Box::new(Self::new(ctx, visit))
    }

    fn flush_progress(&mut self) {
        if self.unreported > 0 {
            self.ctx.progress().advance(self.unreported);
            self.unreported = 0;
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.flush_progress();
    }
}

impl<F> Iterator for CommitScan<F>
where
    F: FnMut(&SearchContext, &CommitInfo) -> Result<Vec<SearchResult>, SearcherError>
        + Send
        + 'static,
{
    type Item = Result<SearchResult, SearcherError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(result) = self.pending.pop_front() {
                return Some(Ok(result));
            }
            if self.finished {
                return None;
            }
            if self.cursor >= self.commits.len() || self.ctx.is_cancelled() {
                self.finish();
                return None;
            }

            let visited = (self.visit)(&*self.ctx, &self.commits[self.cursor]);
            self.cursor += 1;
            self.unreported += 1;
            if self.unreported >= self.ctx.batch_size() as u64 {
                self.flush_progress();
            }

            match visited {
                Ok(hits) => self.pending.extend(hits),
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }
        }
    }
}
