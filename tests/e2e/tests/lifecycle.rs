//! Query lifecycle: cancellation, deadlines, progress and index upkeep

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chronoscope_core::{
    EngineConfig, HistoryProvider, IncrementalIndex, Orchestrator, ProgressSink, ProgressUpdate,
    QueryState, RebuildPolicy, SearchQuery,
};
use chronoscope_e2e_tests::harness::{CommitSpec, TestRepo};
use chronoscope_e2e_tests::mocks::{SlowSearcher, five_commit_history, generated_history};
use uuid::Uuid;

const SLOW_COMMITS: usize = 60;

fn slow_orchestrator() -> Orchestrator {
    Orchestrator::builder(generated_history(SLOW_COMMITS, 1))
        .register(Arc::new(SlowSearcher::new(Duration::from_millis(20))))
        .unwrap()
        .build()
        .unwrap()
}

fn slow_query() -> SearchQuery {
    SearchQuery::builder().message("anything").build().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_query_keeps_partial_results() {
    let orchestrator = slow_orchestrator();
    let handle = orchestrator.submit(slow_query()).unwrap();
    let id = handle.id();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!handle.status().state.is_terminal());
    assert!(orchestrator.status(id).is_some());
    assert!(orchestrator.cancel(id));

    let outcome = handle.finish().await.unwrap();
    assert_eq!(outcome.status, QueryState::Cancelled);
    assert!(outcome.total_matches > 0);
    assert!(outcome.total_matches < SLOW_COMMITS);
    assert!(!orchestrator.cancel(id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_times_out_without_caching() {
    let orchestrator = slow_orchestrator();
    let query = SearchQuery::builder()
        .message("anything")
        .max_duration(Duration::from_millis(100))
        .build()
        .unwrap();

    let first = orchestrator.search(query.clone()).await.unwrap();
    assert_eq!(first.status, QueryState::TimedOut);
    assert!(first.total_matches < SLOW_COMMITS);
    assert!(!first.is_complete());

    let second = orchestrator.search(query).await.unwrap();
    assert_eq!(second.status, QueryState::TimedOut);
    assert!(!second.from_cache);
    assert_eq!(orchestrator.computation_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_query_honours_its_own_deadline() {
    let orchestrator = slow_orchestrator();
    let leader = orchestrator.submit(slow_query()).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let follower = SearchQuery::builder()
        .message("anything")
        .max_duration(Duration::from_millis(50))
        .build()
        .unwrap();
    let started = Instant::now();
    let waited = orchestrator.search(follower).await.unwrap();
    assert_eq!(waited.status, QueryState::TimedOut);
    assert!(!waited.from_cache);
    assert!(started.elapsed() < Duration::from_millis(600));

    let led = leader.finish().await.unwrap();
    assert_eq!(led.status, QueryState::Completed);
    assert_eq!(led.total_matches, SLOW_COMMITS);
    assert_eq!(orchestrator.computation_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_query_can_be_cancelled() {
    let orchestrator = slow_orchestrator();
    let leader = orchestrator.submit(slow_query()).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let follower = orchestrator.submit(slow_query()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled_at = Instant::now();
    assert!(orchestrator.cancel(follower.id()));

    let waited = follower.finish().await.unwrap();
    assert_eq!(waited.status, QueryState::Cancelled);
    assert!(!waited.from_cache);
    assert!(cancelled_at.elapsed() < Duration::from_millis(600));

    let led = leader.finish().await.unwrap();
    assert_eq!(led.status, QueryState::Completed);
    assert_eq!(led.total_matches, SLOW_COMMITS);
}

#[tokio::test]
async fn handle_streams_the_ranked_page() {
    let orchestrator = Orchestrator::builder(generated_history(50, 2))
        .with_default_searchers()
        .unwrap()
        .build()
        .unwrap();
    let query = SearchQuery::builder().author("carol").limit(5).build().unwrap();

    let expected = orchestrator.search(query.clone()).await.unwrap();
    let mut handle = orchestrator.submit(query).unwrap();
    let mut streamed = Vec::new();
    while let Some(result) = handle.next().await {
        streamed.push(result);
    }
    let outcome = handle.finish().await.unwrap();

    assert_eq!(streamed, outcome.results);
    assert_eq!(streamed, expected.results);
    assert!(streamed.len() <= 5);
}

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl ProgressSink for Recorder {
    fn on_progress(&self, _query_id: Uuid, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

#[tokio::test]
async fn progress_reaches_completion() {
    let recorder = Arc::new(Recorder::default());
    let orchestrator = Orchestrator::builder(generated_history(200, 4))
        .config(EngineConfig {
            batch_size: 16,
            progress_interval: Duration::ZERO,
            cache_enabled: false,
            ..EngineConfig::default()
        })
        .progress_sink(recorder.clone())
        .with_default_searchers()
        .unwrap()
        .build()
        .unwrap();

    let outcome = orchestrator
        .search(SearchQuery::builder().author("dave").build().unwrap())
        .await
        .unwrap();

    let updates = recorder.updates.lock().unwrap();
    assert!(updates.len() > 2);
    let last = updates.last().unwrap();
    assert_eq!(last.completed, 200);
    assert_eq!(last.total, 200);
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.results, outcome.total_matches as u64);
}

#[tokio::test]
async fn index_updates_incrementally() {
    let repo = TestRepo::new();
    five_commit_history(&repo);
    let orchestrator = repo.orchestrator();

    let first = orchestrator.build_index().await.unwrap();
    assert_eq!(first.commits_indexed, 5);
    assert!(first.terms_added > 0);

    let unchanged = orchestrator.build_index().await.unwrap();
    assert_eq!(unchanged.commits_indexed, 0);

    repo.commit(CommitSpec::new("erin", 1_700_432_000, "Add tokenizer").file(
        "src/tokenizer.rs",
        "fn tokenize() {\n    split_words();\n}\n",
    ));
    let delta = orchestrator.build_index().await.unwrap();
    assert_eq!(delta.commits_indexed, 1);
    assert!(!delta.full_rebuild);
    assert!(delta.generation > first.generation);

    let full = orchestrator.rebuild_index().await.unwrap();
    assert!(full.full_rebuild);
    assert_eq!(full.commits_indexed, 6);

    let status = orchestrator.index_status().unwrap();
    assert!(status.healthy);
    assert_eq!(status.commit_count, 6);
    assert_eq!(status.last_indexed_commit, Some(repo.provider().head().unwrap()));
    assert!(status.last_build.is_some_and(|b| b.full_rebuild));
}

#[tokio::test]
async fn background_rebuild_serves_queries_meanwhile() {
    let repo = TestRepo::new();
    five_commit_history(&repo);
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

    let orchestrator = repo
        .builder()
        .config(EngineConfig {
            rebuild_policy: RebuildPolicy::Background,
            ..repo.config()
        })
        .build()
        .unwrap();
    let outcome = orchestrator
        .search(SearchQuery::builder().content("tokenize").build().unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.status, QueryState::Completed);
    assert_eq!(outcome.total_matches, 2);
    assert!(!outcome.warnings.is_empty());

    let mut healthy = false;
    for _ in 0..100 {
        let status = orchestrator.index_status().unwrap();
        if status.healthy && status.built {
            healthy = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(healthy, "background rebuild did not finish");
}

#[tokio::test]
async fn unindexed_orchestrator_rejects_index_operations() {
    let orchestrator = Orchestrator::builder(generated_history(3, 8))
        .with_default_searchers()
        .unwrap()
        .build()
        .unwrap();
    assert!(orchestrator.build_index().await.is_err());
    assert!(orchestrator.index_status().is_err());
}
