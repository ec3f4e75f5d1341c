//! Commit id prefix searcher

use std::sync::Arc;

use crate::orchestrator::SearchContext;
use crate::provider::CommitInfo;
use crate::query::{Dimension, DimensionScore, SearchQuery, SearchResult};

use super::scan::CommitScan;
use super::{Capability, ResultStream, Searcher, SearcherError};

/// Matches commits whose id starts with the given hex prefix
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitIdSearcher;

impl Searcher for CommitIdSearcher {
    fn name(&self) -> &str {
        "commit_id"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::CommitId]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.commit_id.is_some()
    }

    fn estimated_cost(&self, _query: &SearchQuery) -> f64 {
        1.0
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        let prefix = query
            .commit_id
            .as_deref()
            .map(|p| p.trim().to_lowercase())
            .ok_or_else(|| SearcherError::Failed("query has no commit id".into()))?;
        let name = self.name().to_string();

        Ok(CommitScan::boxed(
            ctx,
            move |_ctx: &SearchContext, commit: &CommitInfo| {
                if !commit.id.starts_with(&prefix) {
                    return Ok(Vec::new());
                }
                Ok(vec![
                    SearchResult::for_commit(commit, &name)
                        .with_snippet(commit.summary())
                        .with_score(Dimension::CommitId, DimensionScore::exact()),
                ])
            },
        ))
    }
}
