//! Author searcher

use std::sync::Arc;

use crate::orchestrator::SearchContext;
use crate::provider::CommitInfo;
use crate::query::{Dimension, SearchQuery, SearchResult};

use super::field::FieldMatcher;
use super::scan::CommitScan;
use super::{Capability, ResultStream, Searcher, SearcherError};

/// Matches `Name <email>` of the commit author
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorSearcher;

impl Searcher for AuthorSearcher {
    fn name(&self) -> &str {
        "author"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Author]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.author.is_some()
    }

    fn estimated_cost(&self, query: &SearchQuery) -> f64 {
        if query.fuzzy.enabled { 4.0 } else { 2.0 }
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        let pattern = query
            .author
            .as_ref()
            .ok_or_else(|| SearcherError::Failed("query has no author pattern".into()))?;
        let matcher = FieldMatcher::new(pattern, &query.fuzzy)?;
        let name = self.name().to_string();

        Ok(CommitScan::boxed(
            ctx,
            move |_ctx: &SearchContext, commit: &CommitInfo| {
                let author = commit.author_line();
                let Some(hit) = matcher.score(&author) else {
                    return Ok(Vec::new());
                };
                Ok(vec![
                    SearchResult::for_commit(commit, &name)
                        .with_snippet(author)
                        .with_score(Dimension::Author, hit.score),
                ])
            },
        ))
    }
}
