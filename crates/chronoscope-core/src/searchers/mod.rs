//! Searcher Variants
//!
//! Independent strategies, one per dimension plus a cross-dimensional
//! fuzzy searcher:
//! - [`CommitIdSearcher`] - commit id prefix
//! - [`AuthorSearcher`] - author name and email
//! - [`MessageSearcher`] - commit message
//! - [`DateRangeSearcher`] - commit time bounds
//! - [`PathSearcher`] - touched paths by glob or regex
//! - [`ExtensionSearcher`] - touched file extensions
//! - [`ContentSearcher`] - line-level file content, BM25-scored with an index
//! - [`FuzzySearcher`] - combined author/message/content similarity
//!
//! Every searcher yields a lazy stream of results, checks cancellation at
//! least once per commit and reports progress per batch.

mod author;
mod commit_id;
mod content;
mod date_range;
mod extension;
mod field;
mod fuzzy;
mod message;
mod path;
mod scan;

pub use author::AuthorSearcher;
pub use commit_id::CommitIdSearcher;
pub use content::ContentSearcher;
pub use date_range::DateRangeSearcher;
pub use extension::ExtensionSearcher;
pub use fuzzy::FuzzySearcher;
pub use message::MessageSearcher;
pub use path::PathSearcher;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::orchestrator::SearchContext;
use crate::provider::ProviderError;
use crate::query::{Dimension, SearchQuery, SearchResult};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Failure of one searcher; isolated from every other searcher
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SearcherError {
    #[error("History provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Searcher panicked: {0}")]
    Panicked(String),
    #[error("Search failed: {0}")]
    Failed(String),
}

// ============================================================================
// TRAIT
// ============================================================================

/// Lazily produced results of one searcher
pub type ResultStream = Box<dyn Iterator<Item = Result<SearchResult, SearcherError>> + Send>;

/// What a searcher can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CommitId,
    Author,
    Message,
    DateRange,
    Path,
    Extension,
    Content,
    FuzzyCrossDimensional,
}

impl Capability {
    pub fn dimension(&self) -> Dimension {
        match self {
            Capability::CommitId => Dimension::CommitId,
            Capability::Author => Dimension::Author,
            Capability::Message => Dimension::Message,
            Capability::DateRange => Dimension::DateRange,
            Capability::Path => Dimension::Path,
            Capability::Extension => Dimension::Extension,
            Capability::Content => Dimension::Content,
            Capability::FuzzyCrossDimensional => Dimension::Fuzzy,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::FuzzyCrossDimensional => f.write_str("fuzzy_cross_dimensional"),
            other => f.write_str(other.dimension().as_str()),
        }
    }
}

/// What a searcher declares for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearcherCapability {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub relative_cost: f64,
}

impl SearcherCapability {
    pub fn of(searcher: &dyn Searcher, query: &SearchQuery) -> Self {
        Self {
            name: searcher.name().to_string(),
            capabilities: searcher.capabilities().to_vec(),
            relative_cost: searcher.estimated_cost(query),
        }
    }

    /// Dimensions this searcher can contribute scores for
    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.capabilities.iter().map(Capability::dimension)
    }
}

/// A search strategy over commit history.
///
/// `search` runs on a blocking worker thread. The returned stream is
/// consumed lazily and must stop promptly once the context is cancelled.
pub trait Searcher: Send + Sync {
    /// Unique registry name
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    fn can_handle(&self, query: &SearchQuery) -> bool;

    /// Relative cost; cheaper searchers are dispatched first
    fn estimated_cost(&self, query: &SearchQuery) -> f64;

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError>;
}

/// The built-in searchers in registration order
pub fn default_searchers() -> Vec<Arc<dyn Searcher>> {
    vec![
        Arc::new(CommitIdSearcher),
        Arc::new(AuthorSearcher),
        Arc::new(MessageSearcher),
        Arc::new(DateRangeSearcher),
        Arc::new(PathSearcher),
        Arc::new(ExtensionSearcher),
        Arc::new(ContentSearcher),
        Arc::new(FuzzySearcher),
    ]
}

// ============================================================================
// TEST SUPPORT
// ============================================================================
