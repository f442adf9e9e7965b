//! CLI integration tests.

mod common;

mod list_tests;
mod plan_tests;
#[cfg(unix)]
mod run_tests;
