//! Acceptance scenarios against real git repositories

use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;

use chronoscope_core::{
    Dimension, EngineConfig, HistoryProvider, IncrementalIndex, Orchestrator, QueryState,
    SearchQuery,
};
use chronoscope_e2e_tests::harness::TestRepo;
use chronoscope_e2e_tests::mocks::{five_commit_history, foo_fooo_history};
use tempfile::TempDir;

#[tokio::test]
async fn exact_author_returns_only_their_commits() {
    let repo = TestRepo::new();
    let ids = five_commit_history(&repo);
    let orchestrator = repo.orchestrator();

    let outcome = orchestrator
        .search(SearchQuery::builder().author("alice").build().unwrap())
        .await
        .unwrap();

    assert_eq!(outcome.status, QueryState::Completed);
    assert!(outcome.errors.is_empty());
    let found: BTreeSet<String> = outcome.results.iter().map(|r| r.commit_id.clone()).collect();
    assert_eq!(found, BTreeSet::from([ids[0].clone(), ids[3].clone()]));
    // Equal exact scores fall back to recency
    assert_eq!(outcome.results[0].commit_id, ids[3]);
}

#[tokio::test]
async fn fuzzy_content_scores_near_tokens() {
    let repo = TestRepo::new();
    foo_fooo_history(&repo);
    let orchestrator = repo.orchestrator();

    let outcome = orchestrator
        .search(SearchQuery::builder().content("foo").fuzzy(0.8).build().unwrap())
        .await
        .unwrap();

    let by_line: BTreeMap<u32, f64> = outcome
        .results
        .iter()
        .filter_map(|r| Some((r.line_number?, r.scores.get(&Dimension::Content)?.raw)))
        .collect();
    assert_eq!(by_line.len(), 2);
    assert_eq!(by_line[&2], 1.0);
    assert!(by_line[&6] >= 0.8 && by_line[&6] < 1.0);
    assert_eq!(outcome.results[0].line_number, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_queries_compute_once() {
    let repo = TestRepo::new();
    five_commit_history(&repo);
    let orchestrator = repo.orchestrator();
    let query = SearchQuery::builder()
        .content("tokenize")
        .message("parser")
        .build()
        .unwrap();

    let (first, second) = tokio::join!(
        orchestrator.search(query.clone()),
        orchestrator.search(query.clone())
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(orchestrator.computation_count(), 1);
    assert_eq!(first.results, second.results);
    assert!(first.from_cache || second.from_cache);
    assert!(!first.results.is_empty());
}

#[tokio::test]
async fn truncated_index_is_rebuilt_with_equal_results() {
    let repo = TestRepo::new();
    five_commit_history(&repo);
    let query = SearchQuery::builder().content("tokenize").build().unwrap();

    // Baseline from a healthy index elsewhere
    let clean_dir = TempDir::new().unwrap();
    let baseline = Orchestrator::builder(repo.provider())
        .config(EngineConfig {
            data_dir: Some(clean_dir.path().to_path_buf()),
            ..EngineConfig::default()
        })
        .with_default_searchers()
        .unwrap()
        .persistent_index()
        .build()
        .unwrap();
    baseline.build_index().await.unwrap();
    let expected = baseline.search(query.clone()).await.unwrap();
    assert!(expected.warnings.is_empty());
    assert_eq!(expected.total_matches, 2);

    // Build the index under test, close it, then cut the file in half
    let provider = repo.provider();
    let path = IncrementalIndex::path_for(&repo.data_dir(), &provider.identity());
    {
        let index = IncrementalIndex::open_at(&path).unwrap();
        index.update(provider.as_ref(), None).unwrap();
    }
    let len = std::fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len / 2)
        .unwrap();

    let orchestrator = repo.orchestrator();
    let outcome = orchestrator.search(query).await.unwrap();

    assert_eq!(outcome.status, QueryState::Completed);
    assert!(outcome.warnings.iter().any(|w| w.contains("corruption")));
    assert_eq!(outcome.results, expected.results);

    let status = orchestrator.index_status().unwrap();
    assert!(status.healthy);
    assert!(status.built);
    assert_eq!(status.commit_count, 5);
}

#[tokio::test]
async fn combined_dimensions_on_git_history() {
    let repo = TestRepo::new();
    let ids = five_commit_history(&repo);
    let orchestrator = repo.orchestrator();

    let outcome = orchestrator
        .search(
            SearchQuery::builder()
                .author("alice")
                .extension("rs")
                .require_all(true)
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    let found: BTreeSet<String> = outcome.results.iter().map(|r| r.commit_id.clone()).collect();
    assert_eq!(found, BTreeSet::from([ids[0].clone(), ids[3].clone()]));

    let outcome = orchestrator
        .search(SearchQuery::builder().path_glob("assets/*.png").build().unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.total_matches, 1);
    assert_eq!(outcome.results[0].commit_id, ids[3]);
    assert_eq!(outcome.results[0].file_path.as_deref(), Some("assets/logo.png"));

    // Binary blobs never match content
    let outcome = orchestrator
        .search(SearchQuery::builder().content("PNG").build().unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.total_matches, 0);
    assert_eq!(outcome.status, QueryState::Completed);
}

#[tokio::test]
async fn commit_id_prefix_on_git_history() {
    let repo = TestRepo::new();
    let ids = five_commit_history(&repo);
    let orchestrator = repo.orchestrator();

    let outcome = orchestrator
        .search(SearchQuery::builder().commit_id(&ids[2][..10]).build().unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.total_matches, 1);
    assert_eq!(outcome.results[0].commit_id, ids[2]);
    assert_eq!(outcome.results[0].summary, "Update docs");
}
