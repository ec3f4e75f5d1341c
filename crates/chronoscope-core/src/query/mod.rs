//! Query Model
//!
//! The immutable [`SearchQuery`] submitted by callers:
//! - One optional pattern per search dimension
//! - Fuzzy matching switch with a similarity threshold
//! - Pagination, applied only after ranking
//! - Optional maximum duration
//!
//! Queries are assembled with [`SearchQuery::builder`] and validated before
//! dispatch. [`SearchQuery::normalized`] yields the form used for cache keys.

mod result;

pub use result::{Dimension, DimensionScore, MatchKind, ResultKey, SearchResult};

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default similarity threshold when fuzzy matching is enabled without one
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

// ============================================================================
// ERRORS
// ============================================================================

/// Reasons a query is rejected before dispatch
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Query has no search dimension populated")]
    Empty,
    #[error("Empty pattern for {0}")]
    EmptyPattern(Dimension),
    #[error("Fuzzy threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("Invalid regex for {dimension}: {message}")]
    InvalidRegex { dimension: Dimension, message: String },
    #[error("Invalid glob '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
    #[error("Date range start {since} is after its end {until}")]
    InvertedDateRange {
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },
    #[error("Page limit must be greater than zero")]
    ZeroLimit,
    #[error("Commit id prefix is not hexadecimal: {0}")]
    InvalidCommitPrefix(String),
    #[error("No registered searcher can handle this query")]
    NoApplicableSearcher,
}

// ============================================================================
// PATTERNS
// ============================================================================

/// How a text pattern is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Case-insensitive substring
    #[default]
    Literal,
    /// Regular expression (`regex` crate syntax)
    Regex,
}

/// A pattern for a free-text dimension (author, message, content)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextPattern {
    pub pattern: String,
    #[serde(default)]
    pub kind: PatternKind,
}

impl TextPattern {
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternKind::Literal,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternKind::Regex,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.kind == PatternKind::Literal
    }

    fn validate(&self, dimension: Dimension) -> Result<(), ValidationError> {
        if self.pattern.trim().is_empty() {
            return Err(ValidationError::EmptyPattern(dimension));
        }
        if self.kind == PatternKind::Regex {
            regex::Regex::new(&self.pattern).map_err(|e| ValidationError::InvalidRegex {
                dimension,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn normalized(&self) -> Self {
        match self.kind {
            PatternKind::Literal => Self::literal(self.pattern.trim().to_lowercase()),
            PatternKind::Regex => self.clone(),
        }
    }
}

/// A pattern over file paths touched by a commit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "lowercase")]
pub enum PathPattern {
    /// Shell-style glob, `*` does not cross `/`, `**` does
    Glob(String),
    /// Regular expression matched anywhere in the path
    Regex(String),
}

impl PathPattern {
    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Glob(p) | PathPattern::Regex(p) => p,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyPattern(Dimension::Path));
        }
        match self {
            PathPattern::Glob(p) => globset::GlobBuilder::new(p)
                .literal_separator(true)
                .build()
                .map(|_| ())
                .map_err(|e| ValidationError::InvalidGlob {
                    pattern: p.clone(),
                    message: e.to_string(),
                }),
            PathPattern::Regex(p) => regex::Regex::new(p).map(|_| ()).map_err(|e| {
                ValidationError::InvalidRegex {
                    dimension: Dimension::Path,
                    message: e.to_string(),
                }
            }),
        }
    }
}

/// Inclusive commit-time bounds; an absent bound is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.since.is_none_or(|s| time >= s) && self.until.is_none_or(|u| time <= u)
    }

    fn is_open(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }
}

/// Fuzzy matching switch and acceptance threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuzzyOptions {
    pub enabled: bool,
    pub threshold: f64,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

/// Offset/limit window over the ranked result list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Pagination {
    /// Apply the window to an already ranked list
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

// ============================================================================
// SEARCH QUERY
// ============================================================================

/// A multi-dimensional history search request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    /// Hex prefix of a commit id
    pub commit_id: Option<String>,
    pub author: Option<TextPattern>,
    pub message: Option<TextPattern>,
    pub date_range: Option<DateRange>,
    pub path: Option<PathPattern>,
    /// Lower-case file extensions without the leading dot
    pub extensions: BTreeSet<String>,
    pub content: Option<TextPattern>,
    pub fuzzy: FuzzyOptions,
    pub pagination: Pagination,
    pub max_duration: Option<Duration>,
    /// Keep only commits hit on every populated dimension
    pub require_all: bool,
}

impl SearchQuery {
    pub fn builder() -> SearchQueryBuilder {
        SearchQueryBuilder::default()
    }

    /// Dimensions that carry a pattern
    pub fn populated_dimensions(&self) -> BTreeSet<Dimension> {
        let mut dims = BTreeSet::new();
        if self.commit_id.is_some() {
            dims.insert(Dimension::CommitId);
        }
        if self.author.is_some() {
            dims.insert(Dimension::Author);
        }
        if self.message.is_some() {
            dims.insert(Dimension::Message);
        }
        if self.date_range.is_some_and(|r| !r.is_open()) {
            dims.insert(Dimension::DateRange);
        }
        if self.path.is_some() {
            dims.insert(Dimension::Path);
        }
        if !self.extensions.is_empty() {
            dims.insert(Dimension::Extension);
        }
        if self.content.is_some() {
            dims.insert(Dimension::Content);
        }
        dims
    }

    /// Check every invariant of a dispatchable query
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.populated_dimensions().is_empty() {
            return Err(ValidationError::Empty);
        }

        if let Some(prefix) = &self.commit_id {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                return Err(ValidationError::EmptyPattern(Dimension::CommitId));
            }
            if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ValidationError::InvalidCommitPrefix(prefix.to_string()));
            }
        }

        if let Some(author) = &self.author {
            author.validate(Dimension::Author)?;
        }
        if let Some(message) = &self.message {
            message.validate(Dimension::Message)?;
        }
        if let Some(content) = &self.content {
            content.validate(Dimension::Content)?;
        }
        if let Some(path) = &self.path {
            path.validate()?;
        }
        if self.extensions.iter().any(|e| e.is_empty()) {
            return Err(ValidationError::EmptyPattern(Dimension::Extension));
        }

        if let Some(DateRange {
            since: Some(since),
            until: Some(until),
        }) = self.date_range
            && since > until
        {
            return Err(ValidationError::InvertedDateRange { since, until });
        }

        if self.fuzzy.enabled {
            let t = self.fuzzy.threshold;
            if t.is_nan() || !(0.0..=1.0).contains(&t) {
                return Err(ValidationError::ThresholdOutOfRange(t));
            }
        }

        if self.pagination.limit == Some(0) {
            return Err(ValidationError::ZeroLimit);
        }

        Ok(())
    }

    /// Cache-key form: case folded where matching is case-insensitive,
    /// pagination and duration stripped
    pub fn normalized(&self) -> SearchQuery {
        SearchQuery {
            commit_id: self.commit_id.as_ref().map(|p| p.trim().to_lowercase()),
            author: self.author.as_ref().map(TextPattern::normalized),
            message: self.message.as_ref().map(TextPattern::normalized),
            date_range: self.date_range.filter(|r| !r.is_open()),
            path: self.path.clone(),
            extensions: self.extensions.clone(),
            content: self.content.as_ref().map(TextPattern::normalized),
            fuzzy: if self.fuzzy.enabled {
                self.fuzzy
            } else {
                FuzzyOptions {
                    enabled: false,
                    threshold: 0.0,
                }
            },
            pagination: Pagination::default(),
            max_duration: None,
            require_all: self.require_all,
        }
    }
}

/// Normalize an extension argument: `.RS` and `rs` are the same extension
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

// ============================================================================
// BUILDER
// ============================================================================

/// Typed builder for [`SearchQuery`]; `build` validates
#[derive(Debug, Clone, Default)]
pub struct SearchQueryBuilder {
    query: SearchQuery,
}

impl SearchQueryBuilder {
    pub fn commit_id(mut self, prefix: impl Into<String>) -> Self {
        self.query.commit_id = Some(prefix.into());
        self
    }

    pub fn author(mut self, pattern: impl Into<String>) -> Self {
        self.query.author = Some(TextPattern::literal(pattern));
        self
    }

    pub fn author_regex(mut self, pattern: impl Into<String>) -> Self {
        self.query.author = Some(TextPattern::regex(pattern));
        self
    }

    pub fn message(mut self, pattern: impl Into<String>) -> Self {
        self.query.message = Some(TextPattern::literal(pattern));
        self
    }

    pub fn message_regex(mut self, pattern: impl Into<String>) -> Self {
        self.query.message = Some(TextPattern::regex(pattern));
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.query.date_range.get_or_insert_with(DateRange::default).since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.query.date_range.get_or_insert_with(DateRange::default).until = Some(until);
        self
    }

    pub fn path_glob(mut self, glob: impl Into<String>) -> Self {
        self.query.path = Some(PathPattern::Glob(glob.into()));
        self
    }

    pub fn path_regex(mut self, pattern: impl Into<String>) -> Self {
        self.query.path = Some(PathPattern::Regex(pattern.into()));
        self
    }

    pub fn extension(mut self, ext: &str) -> Self {
        self.query.extensions.insert(normalize_extension(ext));
        self
    }

    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.query
            .extensions
            .extend(exts.into_iter().map(|e| normalize_extension(e.as_ref())));
        self
    }

    pub fn content(mut self, pattern: impl Into<String>) -> Self {
        self.query.content = Some(TextPattern::literal(pattern));
        self
    }

    pub fn content_regex(mut self, pattern: impl Into<String>) -> Self {
        self.query.content = Some(TextPattern::regex(pattern));
        self
    }

    /// Enable fuzzy matching with the given similarity threshold
    pub fn fuzzy(mut self, threshold: f64) -> Self {
        self.query.fuzzy = FuzzyOptions {
            enabled: true,
            threshold,
        };
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.pagination.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.pagination.limit = Some(limit);
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.query.max_duration = Some(duration);
        self
    }

    pub fn require_all(mut self, require_all: bool) -> Self {
        self.query.require_all = require_all;
        self
    }

    pub fn build(self) -> Result<SearchQuery, ValidationError> {
        self.query.validate()?;
        Ok(self.query)
    }
}

// ============================================================================
// TESTS
// ============================================================================
