//! # Chronoscope Core
//!
//! Search orchestration and incremental indexing over git history.
//!
//! - **Multi-dimensional queries**: commit id prefix, author, message, date
//!   range, path glob/regex, extension and file content
//! - **Fuzzy matching**: normalized Indel similarity with early rejection
//! - **Concurrent searchers**: bounded worker pool, score-ordered merging,
//!   per-searcher failure isolation, cancellation and deadlines
//! - **BM25 ranking**: content relevance from a persistent term index
//! - **Incremental index**: SQLite-backed, delta updates, corruption recovery
//! - **Result cache**: LRU with singleflight and HEAD invalidation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chronoscope_core::{GitProvider, Orchestrator, SearchQuery};
//!
//! let provider = Arc::new(GitProvider::open(".")?);
//! let orchestrator = Orchestrator::builder(provider)
//!     .with_default_searchers()?
//!     .persistent_index()
//!     .build()?;
//!
//! orchestrator.build_index().await?;
//!
//! let query = SearchQuery::builder()
//!     .author("alice")
//!     .content("parse")
//!     .limit(20)
//!     .build()?;
//! let outcome = orchestrator.search(query).await?;
//! for result in &outcome.results {
//!     println!("{} {:.2} {}", &result.commit_id[..8], result.score, result.summary);
//! }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod cache;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod index;
pub mod orchestrator;
pub mod provider;
pub mod query;
pub mod ranking;
pub mod searchers;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Query model
pub use query::{
    DateRange, Dimension, DimensionScore, FuzzyOptions, MatchKind, Pagination, PathPattern,
    PatternKind, SearchQuery, SearchQueryBuilder, SearchResult, TextPattern, ValidationError,
};

// History access
pub use provider::{
    ChangeStatus, CommitInfo, FileChange, GitProvider, HistoryProvider, MemoryCommit,
    MemoryProvider, ProviderError,
};

// Orchestration
pub use orchestrator::{
    MergeStrategy, Orchestrator, OrchestratorBuilder, ProgressSink, ProgressUpdate, QueryHandle,
    QueryOutcome, QueryState, QueryStatus, RegistryError, SearchContext, VariantError,
};

// Searchers
pub use searchers::{Capability, ResultStream, Searcher, SearcherCapability, SearcherError};

// Index, cache and ranking
pub use cache::{CacheError, CacheStats, ResultCache};
pub use fuzzy::{FuzzyHit, FuzzyMatcher};
pub use index::{BuildReport, IncrementalIndex, IndexError, IndexStatus};
pub use ranking::{RankingConfig, RankingEngine};

// Configuration and errors
pub use config::{EngineConfig, RebuildPolicy};
pub use error::{Result, SearchError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
