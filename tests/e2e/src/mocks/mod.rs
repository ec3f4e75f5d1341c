//! Fixtures and instrumented searchers

mod fixtures;
mod searchers;

pub use fixtures::{at, five_commit_history, foo_fooo_history, generated_history, AUTHORS, WORDS};
pub use searchers::SlowSearcher;
