//! Chronoscope Search Benchmarks
//!
//! Benchmarks for the hot paths of a query using Criterion.
//! Run with: cargo bench -p chronoscope-core

use chrono::DateTime;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use chronoscope_core::index::tokenizer::{term_frequencies, tokenize};
use chronoscope_core::ranking::{CorpusStats, bm25_term};
use chronoscope_core::{CommitInfo, Dimension, DimensionScore, FuzzyMatcher, RankingConfig, RankingEngine, SearchResult};

const SOURCE: &str = "pub fn parse_expression(tokens: &[Token]) -> Result<Expr, ParseError> {\n    \
    let mut parser = Parser::new(tokens);\n    parser.expression()\n}\n";

fn bench_similarity(c: &mut Criterion) {
    c.bench_function("fuzzy_similarity_short", |b| {
        b.iter(|| black_box(FuzzyMatcher::similarity("kitten", "sitting")))
    });
}

fn bench_early_rejection(c: &mut Criterion) {
    let matcher = FuzzyMatcher::new(0.9);
    let long = "x".repeat(400);

    c.bench_function("fuzzy_reject_by_length", |b| {
        b.iter(|| black_box(matcher.is_match("parser", &long)))
    });
}

fn bench_best_match(c: &mut Criterion) {
    let matcher = FuzzyMatcher::new(0.8);

    c.bench_function("fuzzy_best_match_line", |b| {
        b.iter(|| black_box(matcher.best_match("parse expresion", SOURCE)))
    });
}

fn bench_tokenize(c: &mut Criterion) {
    let text = SOURCE.repeat(50);

    c.bench_function("tokenize_200_lines", |b| {
        b.iter(|| black_box(tokenize(&text)))
    });
    c.bench_function("term_frequencies_200_lines", |b| {
        b.iter(|| black_box(term_frequencies(&text)))
    });
}

fn bench_bm25(c: &mut Criterion) {
    let config = RankingConfig::default();
    let corpus = CorpusStats {
        document_count: 10_000,
        average_document_length: 350.0,
    };

    c.bench_function("bm25_term", |b| {
        b.iter(|| black_box(bm25_term(&config, 3, 420, 120, corpus)))
    });
}

fn bench_rank(c: &mut Criterion) {
    let engine = RankingEngine::default();
    let results: Vec<SearchResult> = (0..500)
        .map(|i| {
            let commit = CommitInfo {
                id: format!("{i:040x}"),
                author_name: "Alice".to_string(),
                author_email: "alice@example.com".to_string(),
                time: DateTime::from_timestamp(1_700_000_000 + i, 0).unwrap_or_default(),
                message: format!("Commit {i}"),
                parents: vec![],
                changes: vec![],
            };
            SearchResult::for_commit(&commit, "content")
                .with_score(Dimension::Content, DimensionScore::bm25((i % 17) as f64 / 4.0))
        })
        .collect();

    c.bench_function("rank_500", |b| {
        b.iter(|| black_box(engine.rank(results.clone())))
    });
}

criterion_group!(
    benches,
    bench_similarity,
    bench_early_rejection,
    bench_best_match,
    bench_tokenize,
    bench_bm25,
    bench_rank,
);
criterion_main!(benches);
