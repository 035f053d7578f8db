//! lit-runner - a lit-style test harness
//!
//! This library discovers test files, substitutes `%`-tokens in their
//! `RUN:` lines, executes them with an internal or platform shell, and
//! classifies the results.

pub mod cli;
pub mod commands;
pub mod common;
pub mod runner;
pub mod shell;
pub mod suite;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use runner::{run_suite, Outcome, RunOptions, SuiteReport, TestResult};
pub use suite::{TestCase, TestSuiteConfig};
