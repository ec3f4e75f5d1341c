//! Matching of one free-text field against a text pattern

use crate::fuzzy::FuzzyMatcher;
use crate::provider::TextMatcher;
use crate::query::{DimensionScore, FuzzyOptions, TextPattern};

use super::SearcherError;

/// A scored hit inside a field
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldHit {
    pub score: DimensionScore,
    pub fragment: String,
}

/// Literal, regex, or fuzzy matcher for author, message and content text.
///
/// Without fuzzy matching a literal or regex hit scores `Exact`. With fuzzy
/// matching on a literal pattern the score is the best window similarity;
/// a plain substring hit is always accepted and scores at least the
/// threshold.
#[derive(Debug, Clone)]
pub(crate) struct FieldMatcher {
    exact: TextMatcher,
    fuzzy: Option<(String, FuzzyMatcher)>,
}

impl FieldMatcher {
    pub fn new(pattern: &TextPattern, fuzzy: &FuzzyOptions) -> Result<Self, SearcherError> {
        let exact = TextMatcher::for_pattern(pattern)
            .map_err(|e| SearcherError::InvalidPattern(e.to_string()))?;
        let fuzzy = (fuzzy.enabled && pattern.is_literal())
            .then(|| (pattern.pattern.trim().to_string(), FuzzyMatcher::new(fuzzy.threshold)));
        Ok(Self { exact, fuzzy })
    }

    pub fn is_fuzzy(&self) -> bool {
        self.fuzzy.is_some()
    }

    pub fn exact(&self) -> &TextMatcher {
        &self.exact
    }

    pub fn score(&self, text: &str) -> Option<FieldHit> {
        let substring = self.exact.find(text);
        let Some((pattern, matcher)) = &self.fuzzy else {
            return substring.map(|m| FieldHit {
                score: DimensionScore::exact(),
                fragment: m.to_string(),
            });
        };

        match (matcher.best_match(pattern, text), substring) {
            (Some(hit), _) => Some(FieldHit {
                score: DimensionScore::fuzzy(hit.similarity),
                fragment: hit.matched,
            }),
            (None, Some(m)) => Some(FieldHit {
                score: DimensionScore::fuzzy(matcher.threshold()),
                fragment: m.to_string(),
            }),
            (None, None) => None,
        }
    }
}
