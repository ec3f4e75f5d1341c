//! Ranking
//!
//! Aggregates per-dimension scores into one relevance value and orders
//! results deterministically.
//!
//! Normalization per match kind:
//! - `Exact` scores 1.0
//! - `Fuzzy` keeps its similarity
//! - `Bm25` saturates as `raw / (raw + saturation)`
//!
//! The aggregate is the weighted mean of normalized dimension scores.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::query::{Dimension, DimensionScore, MatchKind, SearchResult};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// BM25 and aggregation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingConfig {
    /// Term frequency saturation (default 1.2)
    pub k1: f64,
    /// Length normalization (default 0.75)
    pub b: f64,
    /// Raw BM25 value that normalizes to 0.5
    pub bm25_saturation: f64,
    /// Per-dimension weights; missing dimensions weigh 1.0
    pub weights: BTreeMap<Dimension, f64>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            bm25_saturation: 1.0,
            weights: BTreeMap::new(),
        }
    }
}

// ============================================================================
// BM25
// ============================================================================

/// Corpus statistics a BM25 score is computed against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusStats {
    pub document_count: usize,
    pub average_document_length: f64,
}

/// Okapi BM25 term weight
///
/// # Arguments
/// * `tf` - Occurrences of the term in the document
/// * `doc_len` - Document length in terms
/// * `df` - Documents containing the term
/// * `corpus` - Document count and average length
pub fn bm25_term(config: &RankingConfig, tf: u32, doc_len: u32, df: u32, corpus: CorpusStats) -> f64 {
    if tf == 0 {
        return 0.0;
    }
    let n = corpus.document_count as f64;
    let df = f64::from(df).min(n);
    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

    let avg = if corpus.average_document_length > 0.0 {
        corpus.average_document_length
    } else {
        1.0
    };
    let tf = f64::from(tf);
    let norm = config.k1 * (1.0 - config.b + config.b * f64::from(doc_len) / avg);
    idf * tf * (config.k1 + 1.0) / (tf + norm)
}

// ============================================================================
// RANKING ENGINE
// ============================================================================

/// Scores and orders results
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Map a raw dimension score into `[0, 1]`
    pub fn normalize(&self, score: &DimensionScore) -> f64 {
        let value = match score.kind {
            MatchKind::Exact => 1.0,
            MatchKind::Fuzzy => score.raw,
            MatchKind::Bm25 => {
                let raw = score.raw.max(0.0);
                let saturation = self.config.bm25_saturation.max(f64::EPSILON);
                raw / (raw + saturation)
            }
        };
        if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
    }

    fn weight(&self, dim: Dimension) -> f64 {
        self.config.weights.get(&dim).copied().unwrap_or(1.0).max(0.0)
    }

    /// Weighted mean of the normalized dimension scores
    pub fn aggregate(&self, result: &SearchResult) -> f64 {
        let mut total = 0.0;
        let mut weights = 0.0;
        for (dim, score) in &result.scores {
            let w = self.weight(*dim);
            total += w * self.normalize(score);
            weights += w;
        }
        if weights <= 0.0 {
            return 0.0;
        }
        (total / weights).clamp(0.0, 1.0)
    }

    /// Assign aggregate scores and sort in final order
    pub fn rank(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        for result in &mut results {
            result.score = self.aggregate(result);
        }
        results.sort_by(compare_ranked);
        results
    }
}

/// Total order over scored results: score, recency, path, line, commit, searcher
pub fn compare_ranked(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.commit_time.cmp(&a.commit_time))
        .then_with(|| a.file_path.cmp(&b.file_path))
        .then_with(|| a.line_number.cmp(&b.line_number))
        .then_with(|| a.commit_id.cmp(&b.commit_id))
        .then_with(|| a.searcher.cmp(&b.searcher))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn result(id: &str, secs: i64, scores: &[(Dimension, DimensionScore)]) -> SearchResult {
        let mut r = SearchResult {
            commit_id: id.to_string(),
            commit_time: DateTime::from_timestamp(secs, 0).unwrap(),
            author: "a".to_string(),
            summary: "s".to_string(),
            file_path: None,
            line_number: None,
            snippet: None,
            scores: BTreeMap::new(),
            searcher: "test".to_string(),
            matched_by: Default::default(),
            score: 0.0,
        };
        for (d, s) in scores {
            r.scores.insert(*d, *s);
        }
        r
    }

    fn corpus(n: usize, avg: f64) -> CorpusStats {
        CorpusStats {
            document_count: n,
            average_document_length: avg,
        }
    }

    #[test]
    fn test_bm25_rewards_frequency_and_rarity() {
        let c = RankingConfig::default();
        let common = bm25_term(&c, 1, 10, 90, corpus(100, 10.0));
        let rare = bm25_term(&c, 1, 10, 2, corpus(100, 10.0));
        assert!(rare > common);

        let once = bm25_term(&c, 1, 10, 5, corpus(100, 10.0));
        let thrice = bm25_term(&c, 3, 10, 5, corpus(100, 10.0));
        assert!(thrice > once);

        let short = bm25_term(&c, 1, 5, 5, corpus(100, 10.0));
        let long = bm25_term(&c, 1, 50, 5, corpus(100, 10.0));
        assert!(short > long);

        assert_eq!(bm25_term(&c, 0, 10, 5, corpus(100, 10.0)), 0.0);
        assert!(bm25_term(&c, 1, 10, 100, corpus(100, 10.0)) > 0.0);
    }

    #[test]
    fn test_normalization() {
        let engine = RankingEngine::default();
        assert_eq!(engine.normalize(&DimensionScore::exact()), 1.0);
        assert_eq!(engine.normalize(&DimensionScore::fuzzy(0.85)), 0.85);
        assert_eq!(engine.normalize(&DimensionScore::bm25(1.0)), 0.5);
        assert_eq!(engine.normalize(&DimensionScore::bm25(-3.0)), 0.0);
        assert_eq!(engine.normalize(&DimensionScore::fuzzy(f64::NAN)), 0.0);
    }

    #[test]
    fn test_weighted_aggregate() {
        let mut config = RankingConfig::default();
        config.weights.insert(Dimension::Author, 3.0);
        let engine = RankingEngine::new(config);
        let r = result(
            "c",
            0,
            &[
                (Dimension::Author, DimensionScore::exact()),
                (Dimension::Message, DimensionScore::fuzzy(0.6)),
            ],
        );
        assert!((engine.aggregate(&r) - (3.0 + 0.6) / 4.0).abs() < 1e-12);
        assert_eq!(engine.aggregate(&result("c", 0, &[])), 0.0);
    }

    #[test]
    fn test_rank_tie_breaks() {
        let engine = RankingEngine::default();
        let exact = [(Dimension::Author, DimensionScore::exact())];
        let ranked = engine.rank(vec![
            result("b", 100, &exact),
            result("a", 100, &exact),
            result("c", 200, &exact),
            result("d", 300, &[(Dimension::Author, DimensionScore::fuzzy(0.9))]),
        ]);
        let ids: Vec<_> = ranked.iter().map(|r| r.commit_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
    }
}
