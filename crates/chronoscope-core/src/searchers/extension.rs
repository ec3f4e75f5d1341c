//! File extension searcher

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::orchestrator::SearchContext;
use crate::provider::CommitInfo;
use crate::query::{Dimension, DimensionScore, SearchQuery, SearchResult};

use super::scan::CommitScan;
use super::{Capability, ResultStream, Searcher, SearcherError};

/// Lower-case extension of a repository path, without the dot
fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Matches touched files by extension, case-insensitively
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionSearcher;

impl Searcher for ExtensionSearcher {
    fn name(&self) -> &str {
        "extension"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Extension]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        !query.extensions.is_empty()
    }

    fn estimated_cost(&self, _query: &SearchQuery) -> f64 {
        3.0
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        let wanted: BTreeSet<String> = query
            .extensions
            .iter()
            .map(|e| crate::query::normalize_extension(e))
            .collect();
        let name = self.name().to_string();

        Ok(CommitScan::boxed(
            ctx,
            move |_ctx: &SearchContext, commit: &CommitInfo| {
                Ok(commit
                    .changes
                    .iter()
                    .filter(|change| {
                        extension_of(&change.path).is_some_and(|ext| wanted.contains(&ext))
                    })
                    .map(|change| {
                        SearchResult::for_commit(commit, &name)
                            .with_file(change.path.clone())
                            .with_snippet(format!("{} {}", change.status, change.path))
                            .with_score(Dimension::Extension, DimensionScore::exact())
                    })
                    .collect())
            },
        ))
    }
}
