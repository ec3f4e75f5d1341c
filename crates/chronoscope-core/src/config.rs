//! Engine configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::index::DEFAULT_MAX_FILE_BYTES;
use crate::orchestrator::MergeStrategy;
use crate::ranking::RankingConfig;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_CACHE_CAPACITY: usize = 128;
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// What a query does when it finds the index marked for rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildPolicy {
    /// Rebuild before dispatching the query
    #[default]
    Immediate,
    /// Rebuild on a background task; queries run without the index meanwhile
    Background,
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Searchers running at once, across all queries
    pub worker_pool_size: usize,
    pub merge_strategy: MergeStrategy,
    /// Commits between cancellation checks and progress updates
    pub batch_size: usize,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    pub cache_ttl: Option<Duration>,
    pub progress_interval: Duration,
    /// Larger files are skipped by content search and indexing
    pub max_file_bytes: usize,
    pub rebuild_policy: RebuildPolicy,
    /// Index location; the platform data directory when unset
    pub data_dir: Option<PathBuf>,
    pub ranking: RankingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            merge_strategy: MergeStrategy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            cache_enabled: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            rebuild_policy: RebuildPolicy::default(),
            data_dir: None,
            ranking: RankingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `CHRONOSCOPE_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay settings from a variable lookup; unparsable values are
    /// logged and ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(workers) = parse_var(&lookup, "CHRONOSCOPE_WORKERS") {
            self.worker_pool_size = workers;
        }
        if let Some(batch) = parse_var(&lookup, "CHRONOSCOPE_BATCH_SIZE") {
            self.batch_size = batch;
        }
        if let Some(capacity) = parse_var(&lookup, "CHRONOSCOPE_CACHE_CAPACITY") {
            self.cache_capacity = capacity;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CHRONOSCOPE_CACHE_TTL_SECS") {
            self.cache_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(dir) = lookup("CHRONOSCOPE_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(merge) = lookup("CHRONOSCOPE_MERGE") {
            match merge.trim().to_ascii_lowercase().as_str() {
                "ordered" => self.merge_strategy = MergeStrategy::default(),
                "arrival" => self.merge_strategy = MergeStrategy::FirstArrival,
                other => tracing::warn!("Ignoring CHRONOSCOPE_MERGE={other}: expected ordered or arrival"),
            }
        }
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {name}={raw}");
            None
        }
    }
}
