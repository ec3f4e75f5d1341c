//! Commit time range searcher

use std::sync::Arc;

use crate::orchestrator::SearchContext;
use crate::provider::CommitInfo;
use crate::query::{Dimension, DimensionScore, SearchQuery, SearchResult};

use super::scan::CommitScan;
use super::{Capability, ResultStream, Searcher, SearcherError};

/// Matches commits whose time lies inside inclusive bounds
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRangeSearcher;

impl Searcher for DateRangeSearcher {
    fn name(&self) -> &str {
        "date_range"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::DateRange]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query
            .date_range
            .is_some_and(|r| r.since.is_some() || r.until.is_some())
    }

    fn estimated_cost(&self, _query: &SearchQuery) -> f64 {
        1.0
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        let range = query
            .date_range
            .ok_or_else(|| SearcherError::Failed("query has no date range".into()))?;
        let name = self.name().to_string();

        Ok(CommitScan::boxed(
            ctx,
            move |_ctx: &SearchContext, commit: &CommitInfo| {
                if !range.contains(commit.time) {
                    return Ok(Vec::new());
                }
                Ok(vec![
                    SearchResult::for_commit(commit, &name)
                        .with_snippet(format!("{} {}", commit.time.to_rfc3339(), commit.summary()))
                        .with_score(Dimension::DateRange, DimensionScore::exact()),
                ])
            },
        ))
    }
}
