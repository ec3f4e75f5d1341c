//! Crate-level error taxonomy

use crate::cache::CacheError;
use crate::index::IndexError;
use crate::orchestrator::RegistryError;
use crate::provider::ProviderError;
use crate::query::ValidationError;
use crate::searchers::SearcherError;

/// Errors surfaced to callers of the orchestrator.
///
/// Only validation and provider failures end a query; searcher, index and
/// cache failures are absorbed and reported on the outcome instead.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    Validation(#[from] ValidationError),
    #[error("History provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Searcher {searcher} failed: {source}")]
    Searcher {
        searcher: String,
        #[source]
        source: SearcherError,
    },
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Query cancelled")]
    Cancelled,
    #[error("Query timed out")]
    Timeout,
    #[error("No index is configured")]
    IndexUnavailable,
    #[error("Task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SearchError {
    fn from(e: tokio::task::JoinError) -> Self {
        SearchError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
