//! End-to-end test support for chronoscope
//!
//! - [`harness`]: throwaway git repositories and index directories
//! - [`mocks`]: fixture histories and instrumented searchers

pub mod harness;
pub mod mocks;
