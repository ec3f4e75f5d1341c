//! Search result records produced by searcher variants

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::CommitInfo;

/// A searchable dimension of commit history
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    CommitId,
    Author,
    Message,
    DateRange,
    Path,
    Extension,
    Content,
    /// Combined author/message/content similarity
    Fuzzy,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::CommitId => "commit_id",
            Dimension::Author => "author",
            Dimension::Message => "message",
            Dimension::DateRange => "date_range",
            Dimension::Path => "path",
            Dimension::Extension => "extension",
            Dimension::Content => "content",
            Dimension::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a dimension score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Fuzzy,
    Bm25,
}

/// Raw per-dimension relevance, normalized by the ranking engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub raw: f64,
    pub kind: MatchKind,
}

impl DimensionScore {
    pub fn exact() -> Self {
        Self {
            raw: 1.0,
            kind: MatchKind::Exact,
        }
    }

    pub fn fuzzy(similarity: f64) -> Self {
        Self {
            raw: similarity,
            kind: MatchKind::Fuzzy,
        }
    }

    pub fn bm25(raw: f64) -> Self {
        Self {
            raw,
            kind: MatchKind::Bm25,
        }
    }

    fn strength(&self) -> (u8, f64) {
        let rank = match self.kind {
            MatchKind::Exact => 2,
            MatchKind::Fuzzy | MatchKind::Bm25 => 1,
        };
        (rank, self.raw)
    }

    fn stronger_than(&self, other: &DimensionScore) -> bool {
        let (a_rank, a_raw) = self.strength();
        let (b_rank, b_raw) = other.strength();
        a_rank > b_rank || (a_rank == b_rank && a_raw > b_raw)
    }
}

/// One hit: a commit, optionally narrowed to a file and line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub commit_id: String,
    pub commit_time: DateTime<Utc>,
    pub author: String,
    pub summary: String,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub snippet: Option<String>,
    pub scores: BTreeMap<Dimension, DimensionScore>,
    /// Name of the searcher that produced the result
    pub searcher: String,
    /// Every searcher that produced this key, after coalescing
    pub matched_by: BTreeSet<String>,
    /// Aggregate relevance assigned by the ranking engine
    pub score: f64,
}

/// Identity of a hit for coalescing across searchers
pub type ResultKey = (String, Option<String>, Option<u32>);

impl SearchResult {
    /// A commit-level hit with no file or line attached
    pub fn for_commit(commit: &CommitInfo, searcher: &str) -> Self {
        Self {
            commit_id: commit.id.clone(),
            commit_time: commit.time,
            author: commit.author_name.clone(),
            summary: commit.summary().to_string(),
            file_path: None,
            line_number: None,
            snippet: None,
            scores: BTreeMap::new(),
            searcher: searcher.to_string(),
            matched_by: BTreeSet::from([searcher.to_string()]),
            score: 0.0,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line_number = Some(line);
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_score(mut self, dimension: Dimension, score: DimensionScore) -> Self {
        self.scores.insert(dimension, score);
        self
    }

    pub fn key(&self) -> ResultKey {
        (
            self.commit_id.clone(),
            self.file_path.clone(),
            self.line_number,
        )
    }

    /// Fold a duplicate hit (same key) into this one.
    ///
    /// Per dimension the stronger score survives. The producing tag and its
    /// snippet come from the lexically smallest searcher name; a missing
    /// snippet is filled from the other hit.
    pub fn absorb(&mut self, other: SearchResult) {
        for (dim, score) in other.scores {
            match self.scores.get(&dim) {
                Some(existing) if !score.stronger_than(existing) => {}
                _ => {
                    self.scores.insert(dim, score);
                }
            }
        }
        if other.searcher < self.searcher {
            self.searcher = other.searcher;
            if other.snippet.is_some() {
                self.snippet = other.snippet;
            }
        } else if self.snippet.is_none() {
            self.snippet = other.snippet;
        }
        self.matched_by.extend(other.matched_by);
    }
}
