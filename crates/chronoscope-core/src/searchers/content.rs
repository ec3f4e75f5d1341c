//! File content searcher

use std::sync::Arc;

use crate::index::tokenizer::{term_frequencies, tokenize};
use crate::orchestrator::SearchContext;
use crate::provider::{ChangeStatus, CommitInfo, snippet};
use crate::query::{Dimension, DimensionScore, SearchQuery, SearchResult};
use crate::ranking::{CorpusStats, bm25_term};

use super::field::FieldMatcher;
use super::scan::CommitScan;
use super::{Capability, ResultStream, Searcher, SearcherError};

/// Line-level search in the files each commit added or modified.
///
/// Binary and oversized blobs are skipped. With a healthy index, literal
/// hits on whole tokens are scored by BM25 over the file; other hits score
/// `Exact`.
/// Fuzzy queries score each line by its best window similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSearcher;

/// BM25 of a whole file for the query terms.
///
/// `None` without an index, or when no query term occurs as a whole token
/// (a substring hit such as `foo` inside `fooo`).
fn file_bm25(ctx: &SearchContext, terms: &[String], text: &str) -> Option<DimensionScore> {
    let index = ctx.index()?;
    let corpus = CorpusStats {
        document_count: index.document_count(),
        average_document_length: index.average_document_length(),
    };
    let (stats, length) = term_frequencies(text);
    let frequencies: Vec<_> = terms
        .iter()
        .map(|term| (term, stats.get(term).map(|s| s.frequency).unwrap_or(0)))
        .collect();
    if frequencies.iter().all(|(_, tf)| *tf == 0) {
        return None;
    }

    let config = ctx.ranking().config();
    let raw = frequencies
        .into_iter()
        .map(|(term, tf)| bm25_term(config, tf, length, index.document_frequency(term), corpus))
        .sum();
    Some(DimensionScore::bm25(raw))
}

fn visit_file(
    ctx: &SearchContext,
    commit: &CommitInfo,
    path: &str,
    blob: &[u8],
    matcher: &FieldMatcher,
    bm25_terms: &[String],
    name: &str,
) -> Vec<SearchResult> {
    let make = |line: u32, snippet: String, score: DimensionScore| {
        SearchResult::for_commit(commit, name)
            .with_file(path)
            .with_line(line)
            .with_snippet(snippet)
            .with_score(Dimension::Content, score)
    };

    if matcher.is_fuzzy() {
        return crate::provider::lines(blob)
            .into_iter()
            .filter_map(|(number, line)| {
                let hit = matcher.score(&line)?;
                Some(make(number, snippet(&line), hit.score))
            })
            .collect();
    }

    let found = matcher.exact().find_lines(blob);
    if found.is_empty() {
        return Vec::new();
    }
    let score = if bm25_terms.is_empty() {
        None
    } else {
        file_bm25(ctx, bm25_terms, &String::from_utf8_lossy(blob))
    }
    .unwrap_or_else(DimensionScore::exact);

    found
        .into_iter()
        .map(|m| make(m.line_number, m.snippet(), score))
        .collect()
}

impl Searcher for ContentSearcher {
    fn name(&self) -> &str {
        "content"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Content]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.content.is_some()
    }

    fn estimated_cost(&self, query: &SearchQuery) -> f64 {
        if query.fuzzy.enabled { 60.0 } else { 40.0 }
    }

    fn search(
        &self,
        ctx: Arc<SearchContext>,
        query: Arc<SearchQuery>,
    ) -> Result<ResultStream, SearcherError> {
        let pattern = query
            .content
            .as_ref()
            .ok_or_else(|| SearcherError::Failed("query has no content pattern".into()))?;
        let matcher = FieldMatcher::new(pattern, &query.fuzzy)?;
        let bm25_terms = if pattern.is_literal() && !matcher.is_fuzzy() {
            let mut terms = tokenize(&pattern.pattern);
            terms.dedup();
            terms
        } else {
            Vec::new()
        };
        let name = self.name().to_string();

        Ok(CommitScan::boxed(
            ctx,
            move |ctx: &SearchContext, commit: &CommitInfo| {
                let mut results = Vec::new();
                for change in &commit.changes {
                    if change.status == ChangeStatus::Deleted || ctx.is_cancelled() {
                        continue;
                    }
                    let Some(blob) = ctx.read_text(&commit.id, &change.path)? else {
                        continue;
                    };
                    results.extend(visit_file(
                        ctx,
                        commit,
                        &change.path,
                        &blob,
                        &matcher,
                        &bm25_terms,
                        &name,
                    ));
                }
                Ok(results)
            },
        ))
    }
}

/// Linear scan of every text file a commit touched; the reference the
/// searcher is checked against
#[cfg(test)]
pub(crate) fn scan_lines(
    provider: &dyn crate::provider::HistoryProvider,
    pattern: &str,
) -> Vec<(String, String, u32)> {
    let matcher = crate::provider::TextMatcher::literal(pattern).unwrap();
    let mut hits = Vec::new();
    for commit in provider.commits().unwrap() {
        for change in commit.changes.iter().filter(|c| c.status != ChangeStatus::Deleted) {
            let Some(blob) = provider.read_file(&commit.id, &change.path).unwrap() else {
                continue;
            };
            if crate::provider::is_binary(&blob) {
                continue;
            }
            for m in matcher.find_lines(&blob) {
                hits.push((commit.id.clone(), change.path.clone(), m.line_number));
            }
        }
    }
    hits.sort();
    hits
}
