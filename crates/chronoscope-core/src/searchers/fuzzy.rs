//! Cross-dimensional fuzzy searcher

use std::sync::Arc;

use crate::fuzzy::FuzzyMatcher;
use crate::orchestrator::SearchContext;
use crate::provider::{ChangeStatus, CommitInfo};
use crate::query::{Dimension, DimensionScore, SearchQuery, SearchResult, TextPattern};

use super::scan::CommitScan;
use super::{Capability, ResultStream, Searcher, SearcherError};

const AUTHOR_WEIGHT: f64 = 0.3;
const MESSAGE_WEIGHT: f64 = 0.4;
const CONTENT_WEIGHT: f64 = 0.3;

/// Literal patterns of the fields this searcher combines
fn literal(pattern: &Option<TextPattern>) -> Option<String> {
    pattern
        .as_ref()
        .filter(|p| p.is_literal())
        .map(|p| p.pattern.trim().to_string())
}

/// Similarity of `pattern` to its best window in `text`, 0 when it falls
/// below the matcher's threshold; a substring occurrence counts as identical
fn field_similarity(matcher: &FuzzyMatcher, pattern: &str, lowered: &str, text: &str) -> f64 {
    if text.to_lowercase().contains(lowered) {
        return 1.0;
    }
    matcher
        .best_match(pattern, text)
        .map(|hit| hit.similarity)
        .unwrap_or(0.0)
}

/// Lowest content similarity that still lifts the combined score to
/// `threshold`; content lines below it cannot change the outcome
fn content_floor(threshold: f64, total_weight: f64, weighted: f64) -> f64 {
    // Slack keeps a line sitting exactly on the floor
    ((threshold * total_weight - weighted) / CONTENT_WEIGHT - 1e-9).max(0.0)
}

/// Scores whole commits by a weighted mix of author, message and content
/// similarity, renormalized over the fields the query populates.
///
/// Participates only with fuzzy matching on and at least two of those
/// fields given as literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzySearcher;

impl Searcher for FuzzySearcher {
    fn name(&self) -> &str {
        "fuzzy"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::FuzzyCrossDimensional]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        let fields = [
            literal(&query.author),
            literal(&query.message),
            literal(&query.content),
        ];
        query.fuzzy.enabled && fields.iter().filter(|f| f.is_some()).count() >= 2
    }

    fn estimated_cost(&self, _query: &SearchQuery) -> f64 {
        80.0
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        if !self.can_handle(&query) {
            return Err(SearcherError::Failed(
                "fuzzy search needs two literal fields".into(),
            ));
        }
        let author = literal(&query.author).map(|p| (p.to_lowercase(), p));
        let message = literal(&query.message).map(|p| (p.to_lowercase(), p));
        let content = literal(&query.content).map(|p| (p.to_lowercase(), p));
        let threshold = FuzzyMatcher::new(query.fuzzy.threshold).threshold();
        let unbounded = FuzzyMatcher::new(0.0);
        let name = self.name().to_string();

        let total_weight = author.as_ref().map_or(0.0, |_| AUTHOR_WEIGHT)
            + message.as_ref().map_or(0.0, |_| MESSAGE_WEIGHT)
            + content.as_ref().map_or(0.0, |_| CONTENT_WEIGHT);

        Ok(CommitScan::boxed(
            ctx,
            move |ctx: &SearchContext, commit: &CommitInfo| {
                let mut weighted = 0.0;
                if let Some((lowered, pattern)) = &author {
                    weighted += AUTHOR_WEIGHT
                        * field_similarity(&unbounded, pattern, lowered, &commit.author_line());
                }
                if let Some((lowered, pattern)) = &message {
                    let best = commit
                        .message
                        .lines()
                        .map(|line| field_similarity(&unbounded, pattern, lowered, line))
                        .fold(0.0, f64::max);
                    weighted += MESSAGE_WEIGHT * best;
                }

                if let Some((lowered, pattern)) = &content {
                    let floor = content_floor(threshold, total_weight, weighted);
                    // Skip reading blobs when even a perfect content score falls short
                    if floor > 1.0 {
                        return Ok(Vec::new());
                    }
                    let mut best: f64 = 0.0;
                    'files: for change in &commit.changes {
                        if change.status == ChangeStatus::Deleted || ctx.is_cancelled() {
                            continue;
                        }
                        let Some(blob) = ctx.read_text(&commit.id, &change.path)? else {
                            continue;
                        };
                        for (_, line) in crate::provider::lines(&blob) {
                            let bounded = FuzzyMatcher::new(floor.max(best));
                            best = best.max(field_similarity(&bounded, pattern, lowered, &line));
                            if best >= 1.0 {
                                break 'files;
                            }
                        }
                    }
                    weighted += CONTENT_WEIGHT * best;
                }

                let score = weighted / total_weight;
                if score < threshold {
                    return Ok(Vec::new());
                }
                Ok(vec![
                    SearchResult::for_commit(commit, &name)
                        .with_snippet(commit.summary())
                        .with_score(Dimension::Fuzzy, DimensionScore::fuzzy(score)),
                ])
            },
        ))
    }
}
