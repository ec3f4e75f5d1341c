//! Merging of concurrent searcher streams

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use futures::future::select_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::query::{Dimension, ResultKey, SearchResult};
use crate::ranking::{RankingEngine, compare_ranked};

/// Results buffered per stream by the score-ordered merge
pub const DEFAULT_LOOKAHEAD: usize = 32;

/// How searcher streams are interleaved before the final ranking pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeStrategy {
    /// k-way merge on preliminary score with a bounded window per stream
    ScoreOrdered { lookahead: usize },
    /// Forward results as they arrive
    FirstArrival,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::ScoreOrdered {
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

impl MergeStrategy {
    /// Capacity of each searcher's channel
    pub fn channel_capacity(&self) -> usize {
        match self {
            MergeStrategy::ScoreOrdered { lookahead } => (*lookahead).max(1),
            MergeStrategy::FirstArrival => DEFAULT_LOOKAHEAD,
        }
    }
}

/// Drain every receiver into `emit` according to `strategy`.
///
/// Returns once all senders are gone and every buffered result is emitted.
pub(crate) async fn merge_streams<E>(
    strategy: MergeStrategy,
    receivers: Vec<mpsc::Receiver<SearchResult>>,
    ranking: &RankingEngine,
    emit: E,
) where
    E: FnMut(SearchResult),
{
    match strategy {
        MergeStrategy::ScoreOrdered { lookahead } => {
            score_ordered(receivers, lookahead.max(1), ranking, emit).await
        }
        MergeStrategy::FirstArrival => first_arrival(receivers, emit).await,
    }
}

async fn first_arrival<E>(mut receivers: Vec<mpsc::Receiver<SearchResult>>, mut emit: E)
where
    E: FnMut(SearchResult),
{
    while !receivers.is_empty() {
        let pending = receivers
            .iter_mut()
            .enumerate()
            .map(|(i, rx)| Box::pin(async move { (i, rx.recv().await) }));
        let ((idx, item), _, _) = select_all(pending).await;
        match item {
            Some(result) => emit(result),
            None => {
                receivers.swap_remove(idx);
            }
        }
    }
}

async fn score_ordered<E>(
    mut receivers: Vec<mpsc::Receiver<SearchResult>>,
    lookahead: usize,
    ranking: &RankingEngine,
    mut emit: E,
) where
    E: FnMut(SearchResult),
{
    let n = receivers.len();
    let mut windows: Vec<VecDeque<SearchResult>> = vec![VecDeque::new(); n];
    let mut open = vec![true; n];

    loop {
        for i in 0..n {
            while open[i] && windows[i].len() < lookahead {
                match receivers[i].try_recv() {
                    Ok(mut result) => {
                        result.score = ranking.aggregate(&result);
                        windows[i].push_back(result);
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => open[i] = false,
                }
            }
        }

        let starved = (0..n).any(|i| open[i] && windows[i].is_empty());
        let full = windows.iter().any(|w| w.len() >= lookahead);
        if !starved || full {
            let best = (0..n)
                .filter_map(|i| windows[i].front().map(|r| (i, r)))
                .min_by(|(_, a), (_, b)| compare_ranked(a, b))
                .map(|(i, _)| i);
            match best {
                Some(i) => {
                    if let Some(result) = windows[i].pop_front() {
                        emit(result);
                    }
                    continue;
                }
                None => return,
            }
        }

        // Some open stream has nothing buffered: wait on the starved ones
        let waiting = receivers
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| open[*i] && windows[*i].is_empty())
            .map(|(i, rx)| Box::pin(async move { (i, rx.recv().await) }));
        let ((idx, item), _, _) = select_all(waiting).await;
        match item {
            Some(mut result) => {
                result.score = ranking.aggregate(&result);
                windows[idx].push_back(result);
            }
            None => open[idx] = false,
        }
    }
}

/// Fold duplicate hits into one result per key, in key order.
///
/// Contributions are folded in searcher order so the outcome does not
/// depend on arrival timing.
pub(crate) fn coalesce(mut results: Vec<SearchResult>) -> Vec<SearchResult> {
    results.sort_by(|a, b| a.searcher.cmp(&b.searcher));
    let mut by_key: BTreeMap<ResultKey, SearchResult> = BTreeMap::new();
    for result in results {
        match by_key.get_mut(&result.key()) {
            Some(existing) => existing.absorb(result),
            None => {
                by_key.insert(result.key(), result);
            }
        }
    }
    by_key.into_values().collect()
}

/// Keep results whose commit was hit on every `required` dimension
pub(crate) fn retain_intersection(
    results: Vec<SearchResult>,
    required: &BTreeSet<Dimension>,
) -> Vec<SearchResult> {
    if required.is_empty() {
        return results;
    }
    let mut covered: HashMap<String, BTreeSet<Dimension>> = HashMap::new();
    for result in &results {
        covered
            .entry(result.commit_id.clone())
            .or_default()
            .extend(result.scores.keys().copied());
    }
    results
        .into_iter()
        .filter(|r| {
            covered
                .get(&r.commit_id)
                .is_some_and(|dims| required.is_subset(dims))
        })
        .collect()
}
