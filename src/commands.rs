//! CLI command definitions
//!
//! Defines the clap commands for the test runner.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Discover and run tests
    Run {
        /// Suite directories or individual test files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Per-test timeout in seconds (0 = no timeout)
        #[arg(long)]
        timeout: Option<u64>,

        /// Number of tests to run in parallel
        #[arg(long, short = 'j')]
        workers: Option<usize>,

        /// Treat unexpected passes (XPASS) as failures
        #[arg(long)]
        xfail_strict: bool,

        /// Print every result with its output, not just failures
        #[arg(long, short = 'a')]
        show_all: bool,

        /// Stop the whole run after this many seconds
        #[arg(long)]
        max_time: Option<u64>,

        /// Only run tests whose name contains this text
        #[arg(long)]
        filter: Option<String>,

        /// Extra directory to search for tools (repeatable, searched first)
        #[arg(long = "tool-dir")]
        tool_dirs: Vec<PathBuf>,

        /// Suite parameter NAME=VALUE (repeatable)
        /// A truthy VALUE makes NAME an available feature
        #[arg(long = "param", short = 'D')]
        params: Vec<String>,

        /// Write a JSON report to this file
        #[arg(long)]
        json: Option<PathBuf>,

        /// Run RUN lines with the platform shell instead of the internal one
        #[arg(long)]
        external_shell: bool,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// List the tests that would run
    #[command(alias = "ls")]
    List {
        /// Suite directories or individual test files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only list tests whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },
}
