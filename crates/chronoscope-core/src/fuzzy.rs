//! Fuzzy Matching
//!
//! Normalized Indel similarity between strings, case-insensitive and
//! Unicode-aware:
//!
//! `similarity = 1 - (len_a + len_b - 2 * lcs) / (len_a + len_b)`
//!
//! Two cheap upper bounds reject candidates before the quadratic LCS:
//! the length bound `1 - |len_a - len_b| / (len_a + len_b)` and a character
//! histogram bound. Rejection never discards a candidate whose true
//! similarity reaches the threshold.

use std::collections::HashMap;

use serde::Serialize;

use crate::query::DEFAULT_FUZZY_THRESHOLD;

/// The best-scoring window of a text against a pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyHit {
    pub similarity: f64,
    /// The window of the original text that scored best
    pub matched: String,
    pub byte_offset: usize,
}

/// Threshold-bound similarity matcher
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatcher {
    threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl FuzzyMatcher {
    /// Out-of-range thresholds are clamped; NaN falls back to the default
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_nan() {
            DEFAULT_FUZZY_THRESHOLD
        } else {
            threshold.clamp(0.0, 1.0)
        };
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Unbounded similarity in `[0, 1]`
    pub fn similarity(a: &str, b: &str) -> f64 {
        indel_similarity(&fold(a), &fold(b))
    }

    /// Similarity when it reaches the threshold, `None` otherwise
    pub fn score(&self, pattern: &str, candidate: &str) -> Option<f64> {
        self.score_folded(&fold(pattern), &fold(candidate))
    }

    pub fn is_match(&self, pattern: &str, candidate: &str) -> bool {
        self.score(pattern, candidate).is_some()
    }

    /// Best window of `text` spanning as many words as `pattern` has.
    ///
    /// Returns `None` when no window reaches the threshold.
    pub fn best_match(&self, pattern: &str, text: &str) -> Option<FuzzyHit> {
        let folded_pattern = fold(pattern);
        if folded_pattern.is_empty() {
            return None;
        }
        let width = word_spans(pattern).len().max(1);
        let spans = word_spans(text);

        let mut best: Option<FuzzyHit> = None;
        let mut consider = |start: usize, end: usize| {
            let window = &text[start..end];
            if let Some(sim) = self.score_folded(&folded_pattern, &fold(window))
                && best.as_ref().is_none_or(|b| sim > b.similarity)
            {
                best = Some(FuzzyHit {
                    similarity: sim,
                    matched: window.to_string(),
                    byte_offset: start,
                });
            }
        };

        if spans.is_empty() {
            let trimmed_start = text.len() - text.trim_start().len();
            let trimmed_end = text.trim_end().len();
            if trimmed_start < trimmed_end {
                consider(trimmed_start, trimmed_end);
            }
        } else if spans.len() <= width {
            consider(spans[0].0, spans[spans.len() - 1].1);
        } else {
            for window in spans.windows(width) {
                consider(window[0].0, window[width - 1].1);
            }
        }
        best
    }

    fn score_folded(&self, a: &[char], b: &[char]) -> Option<f64> {
        if length_bound(a.len(), b.len()) < self.threshold {
            return None;
        }
        if histogram_bound(a, b) < self.threshold {
            return None;
        }
        let sim = indel_similarity(a, b);
        (sim >= self.threshold).then_some(sim)
    }
}

/// Lower-cased characters of `s`
fn fold(s: &str) -> Vec<char> {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Byte spans of word tokens: alphanumeric runs plus `_`
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        let word = ch.is_alphanumeric() || ch == '_';
        match (word, start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                spans.push((s, idx));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn length_bound(la: usize, lb: usize) -> f64 {
    let total = la + lb;
    if total == 0 {
        return 1.0;
    }
    1.0 - la.abs_diff(lb) as f64 / total as f64
}

/// `2 * sum(min(count_a, count_b)) / total` bounds the LCS-based similarity
fn histogram_bound(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let mut counts: HashMap<char, i32> = HashMap::with_capacity(a.len());
    for c in a {
        *counts.entry(*c).or_default() += 1;
    }
    let mut shared = 0usize;
    for c in b {
        if let Some(n) = counts.get_mut(c)
            && *n > 0
        {
            *n -= 1;
            shared += 1;
        }
    }
    (2 * shared) as f64 / total as f64
}

fn indel_similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(a, b)) as f64 / total as f64
}

/// Longest common subsequence length, two-row dynamic programming
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if inner.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; inner.len() + 1];
    let mut curr = vec![0usize; inner.len() + 1];
    for oc in outer {
        for (j, ic) in inner.iter().enumerate() {
            curr[j + 1] = if oc == ic {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[inner.len()]
}

// ============================================================================
// TESTS
// ============================================================================
