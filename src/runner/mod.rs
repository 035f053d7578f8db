//! Test execution
//!
//! Runs discovered tests on a bounded worker pool. Each test gets a
//! private temp directory and its own [`ProcessTracker`] so a timeout or
//! interrupt can kill everything it started.

mod outcome;
mod report;

pub use outcome::{classify, Outcome, RawStatus, TestResult};
pub use report::{write_json, JsonReport, Reporter, SuiteReport};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

use crate::common::Error;
use crate::shell::{executor_for, ExecContext, ProcessTracker, ScriptExecutor};
use crate::suite::{TestCase, TestPaths, TestSuiteConfig};

/// How a suite is run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    /// Wall-clock limit for each test
    pub timeout: Option<Duration>,
    pub xfail_strict: bool,
    /// Print failure output as tests finish
    pub verbose: bool,
    /// Print every result, not just the failing ones
    pub show_all: bool,
    pub progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout: None,
            xfail_strict: false,
            verbose: false,
            show_all: false,
            progress: false,
        }
    }
}

/// Resolve once the cancel flag is raised
///
/// A dropped sender means nobody can cancel any more, so this never resolves.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run the substituted commands in order, stopping at the first failure
async fn execute(
    executor: &dyn ScriptExecutor,
    commands: &[String],
    ctx: &mut ExecContext,
) -> (RawStatus, String) {
    let mut log = String::new();
    for command in commands {
        match executor.run(command, ctx).await {
            Ok(result) => {
                log.push_str(&result.transcript);
                if !result.success() {
                    return (RawStatus::Failed, log);
                }
            }
            Err(Error::ScriptParse(message)) => {
                log.push_str(&format!("$ {}\n# shell parser error: {}\n", command, message));
                return (RawStatus::Failed, log);
            }
            Err(e) => {
                log.push_str(&format!("$ {}\n# {}\n", command, e));
                return (RawStatus::Unresolved, log);
            }
        }
    }
    (RawStatus::Passed, log)
}

fn finished(
    config: &TestSuiteConfig,
    test: TestCase,
    raw: RawStatus,
    started: Instant,
    output: String,
) -> TestResult {
    let outcome = classify(raw, test.expected_result);
    TestResult {
        display_name: config.test_display_name(&test.name),
        outcome,
        elapsed: started.elapsed(),
        output,
        test,
    }
}

/// Run a single test to completion
///
/// Every process the test starts is registered with `tracker`; on timeout
/// they are killed before the test's futures are dropped.
pub async fn run_test(
    config: &TestSuiteConfig,
    test: TestCase,
    executor: &dyn ScriptExecutor,
    timeout: Option<Duration>,
    tracker: ProcessTracker,
) -> TestResult {
    let started = Instant::now();

    if let Some(reason) = test.load_error.clone() {
        return finished(config, test, RawStatus::Unresolved, started, reason);
    }
    if test.is_unsupported() {
        let reason = if !test.missing_features.is_empty() {
            format!("Test requires: {}", test.missing_features.join(", "))
        } else {
            format!("Test is unsupported with: {}", test.unsupported_by.join(", "))
        };
        return finished(config, test, RawStatus::Skipped, started, reason);
    }
    if test.run_lines.is_empty() {
        let reason = "Test has no 'RUN:' line".to_string();
        return finished(config, test, RawStatus::Unresolved, started, reason);
    }

    let tmp = match tempfile::Builder::new().prefix("lit-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            let reason = format!("could not create temp directory: {}", e);
            return finished(config, test, RawStatus::Unresolved, started, reason);
        }
    };
    let paths = TestPaths::new(&test.file_path, tmp.path());

    let mut commands = Vec::with_capacity(test.run_lines.len());
    for run_line in &test.run_lines {
        match config.substitutions.apply(&run_line.command, &paths, &test.name) {
            Ok(command) => commands.push(command),
            Err(e) => {
                tracing::debug!("{}: {}", test.name, e);
                let reason = format!("line {}: {}", run_line.line, e);
                return finished(config, test, RawStatus::Unresolved, started, reason);
            }
        }
    }

    let mut ctx = ExecContext::new(tmp.path().to_path_buf(), config.exec_environment.clone());
    ctx.pipefail = config.pipefail;
    ctx.tracker = tracker.clone();

    let (raw, output) = {
        let work = execute(executor, &commands, &mut ctx);
        tokio::pin!(work);
        tokio::select! {
            done = &mut work => done,
            _ = deadline(timeout) => {
                let killed = tracker.kill_all();
                tracing::debug!("{}: timed out, killed {} process group(s)", test.name, killed);
                let limit = timeout.map(|t| t.as_secs()).unwrap_or_default();
                (RawStatus::TimedOut, format!("Reached timeout of {} seconds", limit))
            }
        }
    };

    finished(config, test, raw, started, output)
}

/// Run `tests` with up to `options.workers` in flight
///
/// Raising `cancel` stops scheduling, kills the processes of running
/// tests, and marks the report interrupted.
pub async fn run_suite(
    config: Arc<TestSuiteConfig>,
    tests: Vec<TestCase>,
    options: &RunOptions,
    cancel: watch::Receiver<bool>,
) -> SuiteReport {
    let started = Instant::now();
    let total = tests.len();
    let executor: Arc<dyn ScriptExecutor> = Arc::from(executor_for(config.use_internal_shell));
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel::<TestResult>();

    tracing::info!(
        "Running {} test(s) from '{}' with {} worker(s), {} shell",
        total,
        config.name,
        options.workers.max(1),
        executor.name()
    );

    let mut workers = JoinSet::new();
    for test in tests {
        let config = Arc::clone(&config);
        let executor = Arc::clone(&executor);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        let mut cancel = cancel.clone();
        let timeout = options.timeout;

        workers.spawn(async move {
            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = cancelled(&mut cancel) => return,
            };

            let tracker = ProcessTracker::new();
            let name = test.name.clone();
            tokio::select! {
                result = run_test(&config, test, executor.as_ref(), timeout, tracker.clone()) => {
                    let _ = tx.send(result);
                }
                _ = cancelled(&mut cancel) => {
                    let killed = tracker.kill_all();
                    tracing::debug!("{}: interrupted, killed {} process group(s)", name, killed);
                }
            }
        });
    }
    drop(tx);

    let reporter = Reporter::new(total, options);
    let mut results = Vec::with_capacity(total);
    while let Some(result) = rx.recv().await {
        reporter.test_finished(&result);
        results.push(result);
    }
    reporter.finish();

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("Test worker failed: {}", e);
        }
    }

    let interrupted = *cancel.borrow() || results.len() < total;
    results.sort_by_key(|r| r.test.index);

    SuiteReport {
        suite: config.name.clone(),
        results,
        total,
        elapsed: started.elapsed(),
        interrupted,
        xfail_strict: options.xfail_strict,
    }
}
