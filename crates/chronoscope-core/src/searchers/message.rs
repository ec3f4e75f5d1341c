//! Commit message searcher

use std::sync::Arc;

use crate::orchestrator::SearchContext;
use crate::provider::CommitInfo;
use crate::query::{Dimension, SearchQuery, SearchResult};

use super::field::{FieldHit, FieldMatcher};
use super::scan::CommitScan;
use super::{Capability, ResultStream, Searcher, SearcherError};

/// Matches the commit message line by line; the best line is the snippet
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageSearcher;

fn best_line<'m>(matcher: &FieldMatcher, message: &'m str) -> Option<(FieldHit, &'m str)> {
    let mut best: Option<(FieldHit, &str)> = None;
    for line in message.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(hit) = matcher.score(line) else {
            continue;
        };
        let better = best.as_ref().is_none_or(|(b, _)| {
            hit.score.kind == b.score.kind && hit.score.raw > b.score.raw
        });
        if better {
            best = Some((hit, line));
        }
    }
    best
}

impl Searcher for MessageSearcher {
    fn name(&self) -> &str {
        "message"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Message]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.message.is_some()
    }

    fn estimated_cost(&self, query: &SearchQuery) -> f64 {
        if query.fuzzy.enabled { 6.0 } else { 3.0 }
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        let pattern = query
            .message
            .as_ref()
            .ok_or_else(|| SearcherError::Failed("query has no message pattern".into()))?;
        let matcher = FieldMatcher::new(pattern, &query.fuzzy)?;
        let name = self.name().to_string();

        Ok(CommitScan::boxed(
            ctx,
            move |_ctx: &SearchContext, commit: &CommitInfo| {
                // Regexes may span lines; try the whole message first
                let hit = if matcher.is_fuzzy() {
                    best_line(&matcher, &commit.message)
                } else if matcher.exact().is_match(&commit.message) {
                    best_line(&matcher, &commit.message).or_else(|| {
                        matcher
                            .score(&commit.message)
                            .map(|h| (h, commit.summary()))
                    })
                } else {
                    None
                };

                let Some((hit, line)) = hit else {
                    return Ok(Vec::new());
                };
                Ok(vec![
                    SearchResult::for_commit(commit, &name)
                        .with_snippet(line)
                        .with_score(Dimension::Message, hit.score),
                ])
            },
        ))
    }
}
