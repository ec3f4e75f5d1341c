//! Result-set properties over generated histories

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chronoscope_core::{
    CommitInfo, DateRange, EngineConfig, HistoryProvider, MemoryCommit, MemoryProvider,
    Orchestrator, SearchQuery,
};
use chronoscope_e2e_tests::mocks::{at, generated_history};

fn orchestrator(provider: Arc<MemoryProvider>, config: EngineConfig) -> Orchestrator {
    Orchestrator::builder(provider)
        .config(config)
        .with_default_searchers()
        .unwrap()
        .build()
        .unwrap()
}

async fn commit_ids(orchestrator: &Orchestrator, query: SearchQuery) -> BTreeSet<String> {
    let outcome = orchestrator.search(query).await.unwrap();
    assert!(outcome.is_complete());
    outcome.results.into_iter().map(|r| r.commit_id).collect()
}

/// Commits satisfying `keep`, by linear scan
fn scan(provider: &MemoryProvider, keep: impl Fn(&CommitInfo) -> bool) -> BTreeSet<String> {
    provider
        .commits()
        .unwrap()
        .into_iter()
        .filter(|c| keep(c))
        .map(|c| c.id)
        .collect()
}

fn authored_by(c: &CommitInfo, name: &str) -> bool {
    c.author_line().to_lowercase().contains(name)
}

fn mentions(c: &CommitInfo, word: &str) -> bool {
    c.message.to_lowercase().contains(word)
}

fn touches_extension(c: &CommitInfo, ext: &str) -> bool {
    c.changes
        .iter()
        .any(|f| Path::new(&f.path).extension().is_some_and(|e| e == ext))
}

#[tokio::test]
async fn results_match_linear_scan() {
    let provider = generated_history(120, 7);
    let orch = orchestrator(provider.clone(), EngineConfig::default());

    let author = commit_ids(&orch, SearchQuery::builder().author("alice").build().unwrap()).await;
    assert_eq!(author, scan(&provider, |c| authored_by(c, "alice")));
    assert!(!author.is_empty());

    let message = commit_ids(&orch, SearchQuery::builder().message("cache").build().unwrap()).await;
    assert_eq!(message, scan(&provider, |c| mentions(c, "cache")));

    let ext = commit_ids(&orch, SearchQuery::builder().extension("rs").build().unwrap()).await;
    assert_eq!(ext, scan(&provider, |c| touches_extension(c, "rs")));

    let since = at(1_600_000_000 + 30 * 86_400);
    let until = at(1_600_000_000 + 60 * 86_400);
    let range = DateRange {
        since: Some(since),
        until: Some(until),
    };
    let dated = commit_ids(
        &orch,
        SearchQuery::builder().since(since).until(until).build().unwrap(),
    )
    .await;
    assert_eq!(dated, scan(&provider, |c| range.contains(c.time)));
    assert_eq!(dated.len(), 31);
}

#[tokio::test]
async fn combined_dimensions_match_linear_scan() {
    let provider = generated_history(120, 11);
    let orch = orchestrator(provider.clone(), EngineConfig::default());

    let any = commit_ids(
        &orch,
        SearchQuery::builder().author("bob").message("index").build().unwrap(),
    )
    .await;
    assert_eq!(
        any,
        scan(&provider, |c| authored_by(c, "bob") || mentions(c, "index"))
    );

    let all = commit_ids(
        &orch,
        SearchQuery::builder()
            .author("bob")
            .message("index")
            .require_all(true)
            .build()
            .unwrap(),
    )
    .await;
    assert_eq!(
        all,
        scan(&provider, |c| authored_by(c, "bob") && mentions(c, "index"))
    );
    assert!(all.is_subset(&any));
}

#[tokio::test]
async fn repeated_queries_return_identical_lists() {
    let provider = generated_history(80, 3);
    let cached = orchestrator(provider.clone(), EngineConfig::default());
    let uncached = orchestrator(
        provider,
        EngineConfig {
            cache_enabled: false,
            ..EngineConfig::default()
        },
    );
    let query = SearchQuery::builder()
        .message("stream")
        .content("socket")
        .limit(25)
        .build()
        .unwrap();

    let miss = cached.search(query.clone()).await.unwrap();
    let hit = cached.search(query.clone()).await.unwrap();
    let fresh = uncached.search(query.clone()).await.unwrap();
    let again = uncached.search(query).await.unwrap();

    assert!(!miss.from_cache);
    assert!(hit.from_cache);
    assert_eq!(miss.results, hit.results);
    assert_eq!(miss.results, fresh.results);
    assert_eq!(fresh.results, again.results);
    assert_eq!(cached.computation_count(), 1);
    assert_eq!(uncached.computation_count(), 2);
}

#[tokio::test]
async fn raising_fuzzy_threshold_never_adds_matches() {
    let provider = generated_history(100, 5);
    let orch = orchestrator(provider, EngineConfig::default());

    let mut previous: Option<BTreeSet<String>> = None;
    for threshold in [0.5, 0.6, 0.7, 0.8, 0.9, 1.0] {
        let found = commit_ids(
            &orch,
            SearchQuery::builder()
                .message("parsr")
                .fuzzy(threshold)
                .build()
                .unwrap(),
        )
        .await;
        if let Some(previous) = &previous {
            assert!(
                found.is_subset(previous),
                "threshold {threshold} added matches"
            );
        }
        previous = Some(found);
    }
}

#[tokio::test]
async fn new_commit_invalidates_cached_results() {
    let provider = generated_history(40, 9);
    let orch = orchestrator(provider.clone(), EngineConfig::default());
    let query = SearchQuery::builder().author("erin").build().unwrap();

    let before = orch.search(query.clone()).await.unwrap();
    let cached = orch.search(query.clone()).await.unwrap();
    assert!(cached.from_cache);
    assert_eq!(orch.computation_count(), 1);

    provider
        .commit(MemoryCommit::new("Erin", at(1_700_000_000), "Late change").file("late.txt", "x\n"))
        .unwrap();
    let after = orch.search(query).await.unwrap();

    assert!(!after.from_cache);
    assert_eq!(orch.computation_count(), 2);
    assert_eq!(after.total_matches, before.total_matches + 1);
    assert_eq!(after.results[0].summary, "Late change");
}
