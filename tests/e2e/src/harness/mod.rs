//! Test harness

mod test_repo;

pub use test_repo::{CommitSpec, TestRepo};
