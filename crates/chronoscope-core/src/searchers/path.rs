//! Touched-path searcher

use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::orchestrator::SearchContext;
use crate::provider::CommitInfo;
use crate::query::{Dimension, DimensionScore, PathPattern, SearchQuery, SearchResult};

use super::scan::CommitScan;
use super::{Capability, ResultStream, Searcher, SearcherError};

enum PathMatcher {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl PathMatcher {
    fn compile(pattern: &PathPattern) -> Result<Self, SearcherError> {
        match pattern {
            PathPattern::Glob(glob) => GlobBuilder::new(glob)
                .literal_separator(true)
                .build()
                .map(|g| PathMatcher::Glob(g.compile_matcher()))
                .map_err(|e| SearcherError::InvalidPattern(e.to_string())),
            PathPattern::Regex(re) => Regex::new(re)
                .map(PathMatcher::Regex)
                .map_err(|e| SearcherError::InvalidPattern(e.to_string())),
        }
    }

    fn is_match(&self, path: &str) -> bool {
        match self {
            PathMatcher::Glob(glob) => glob.is_match(path),
            PathMatcher::Regex(re) => re.is_match(path),
        }
    }
}

/// Matches files a commit touched (added, modified, deleted or renamed)
#[derive(Debug, Clone, Copy, Default)]
pub struct PathSearcher;

impl Searcher for PathSearcher {
    fn name(&self) -> &str {
        "path"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Path]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.path.is_some()
    }

    fn estimated_cost(&self, _query: &SearchQuery) -> f64 {
        4.0
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        let pattern = query
            .path
            .as_ref()
            .ok_or_else(|| SearcherError::Failed("query has no path pattern".into()))?;
        let matcher = PathMatcher::compile(pattern)?;
        let name = self.name().to_string();

        Ok(CommitScan::boxed(
            ctx,
            move |_ctx: &SearchContext, commit: &CommitInfo| {
                Ok(commit
                    .changes
                    .iter()
                    .filter(|change| matcher.is_match(&change.path))
                    .map(|change| {
                        SearchResult::for_commit(commit, &name)
                            .with_file(change.path.clone())
                            .with_snippet(format!("{} {}", change.status, change.path))
                            .with_score(Dimension::Path, DimensionScore::exact())
                    })
                    .collect())
            },
        ))
    }
}
