//! Instrumented Searchers

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chronoscope_core::{
    Capability, Dimension, DimensionScore, ResultStream, SearchContext, SearchQuery, SearchResult,
    Searcher, SearcherError,
};

/// Matches every commit of a message query, sleeping before each one.
///
/// Used to hold a query open long enough to cancel it or let it time out.
pub struct SlowSearcher {
    delay: Duration,
}

impl SlowSearcher {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Searcher for SlowSearcher {
    fn name(&self) -> &str {
        "slow"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Message]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.message.is_some()
    }

    fn estimated_cost(&self, _query: &SearchQuery) -> f64 {
        100.0
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        _query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        let delay = self.delay;
        let commits = ctx.commits();
        let mut cursor = 0;

        Ok(Box::new(std::iter::from_fn(move || {
            if cursor >= commits.len() || ctx.is_cancelled() {
                return None;
            }
            thread::sleep(delay);
            let commit = &commits[cursor];
            cursor += 1;
            ctx.progress().advance(1);
            Some(Ok(SearchResult::for_commit(commit, "slow")
                .with_score(Dimension::Message, DimensionScore::exact())))
        })))
    }
}
