//! Result reporting: live status lines, the summary, and the JSON report

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::outcome::{Outcome, TestResult};
use super::RunOptions;
use crate::common::{Error, Result};

/// Aggregated results of one suite
#[derive(Debug)]
pub struct SuiteReport {
    pub suite: String,
    /// Sorted by discovery index
    pub results: Vec<TestResult>,
    /// Number of tests scheduled
    pub total: usize,
    pub elapsed: Duration,
    /// The run was cancelled before every test finished
    pub interrupted: bool,
    pub xfail_strict: bool,
}

impl SuiteReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Non-zero counts per outcome
    pub fn counts(&self) -> BTreeMap<Outcome, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.outcome).or_insert(0) += 1;
        }
        counts
    }

    /// Results that fail the run, in discovery order
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_failure(self.xfail_strict))
            .collect()
    }

    pub fn success(&self) -> bool {
        !self.interrupted && self.failures().is_empty()
    }

    /// 0 if every test passed (as expected), 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// Print the end-of-run summary
    pub fn print_summary(&self) {
        let failures = self.failures();
        if !failures.is_empty() {
            println!();
            println!(
                "{}",
                format!("Failed Tests ({}):", failures.len()).red().bold()
            );
            for result in &failures {
                println!("  {} {}", outcome_label(result.outcome), result.display_name);
            }
        }

        if self.interrupted {
            println!();
            println!(
                "{} {} of {} tests did not run",
                "Interrupted:".yellow().bold(),
                self.total - self.results.len(),
                self.total
            );
        }

        println!();
        println!("Testing Time: {:.2}s", self.elapsed.as_secs_f64());
        for (outcome, count) in self.counts() {
            println!("  {:<12}: {}", outcome_name(outcome), count);
        }
    }
}

fn outcome_name(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Pass => "Passed",
        Outcome::XFail => "Expectedly Failed",
        Outcome::Unsupported => "Unsupported",
        Outcome::Fail => "Failed",
        Outcome::XPass => "Unexpectedly Passed",
        Outcome::Unresolved => "Unresolved",
        Outcome::Timeout => "Timed Out",
    }
}

fn outcome_label(outcome: Outcome) -> ColoredString {
    let label = outcome.label();
    match outcome {
        Outcome::Pass | Outcome::XFail => label.green(),
        Outcome::Unsupported => label.yellow(),
        Outcome::XPass => label.yellow().bold(),
        Outcome::Fail | Outcome::Unresolved | Outcome::Timeout => label.red().bold(),
    }
}

/// Prints results as they arrive, around an optional progress bar
pub struct Reporter {
    progress: Option<ProgressBar>,
    total: usize,
    verbose: bool,
    show_all: bool,
    xfail_strict: bool,
}

impl Reporter {
    pub fn new(total: usize, options: &RunOptions) -> Self {
        let progress = if options.progress && total > 0 {
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
            {
                pb.set_style(style.progress_chars("=> "));
            }
            Some(pb)
        } else {
            None
        };

        Self {
            progress,
            total,
            verbose: options.verbose,
            show_all: options.show_all,
            xfail_strict: options.xfail_strict,
        }
    }

    pub fn test_finished(&self, result: &TestResult) {
        let failing = result.outcome.is_failure(self.xfail_strict);
        if failing || self.show_all {
            let line = format!(
                "{}: {} ({} of {})",
                outcome_label(result.outcome),
                result.display_name,
                result.test.index + 1,
                self.total
            );
            let details = (self.show_all || (failing && self.verbose)) && !result.output.is_empty();
            self.print(|| {
                println!("{}", line);
                if details {
                    let rule = "*".repeat(20);
                    println!("{} TEST '{}' OUTPUT {}", rule, result.display_name, rule);
                    print!("{}", result.output);
                    if !result.output.ends_with('\n') {
                        println!();
                    }
                    println!("{}", "*".repeat(40));
                }
            });
        }

        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
    }

    fn print(&self, f: impl FnOnce()) {
        match &self.progress {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }
}

/// Machine-readable report
#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub version: &'static str,
    pub elapsed: f64,
    pub interrupted: bool,
    pub tests: Vec<JsonTest>,
}

#[derive(Debug, Serialize)]
pub struct JsonTest {
    pub name: String,
    pub code: Outcome,
    pub elapsed: f64,
    pub output: String,
}

impl JsonReport {
    pub fn from_reports(reports: &[SuiteReport]) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            elapsed: reports.iter().map(|r| r.elapsed.as_secs_f64()).sum(),
            interrupted: reports.iter().any(|r| r.interrupted),
            tests: reports
                .iter()
                .flat_map(|r| &r.results)
                .map(|t| JsonTest {
                    name: t.display_name.clone(),
                    code: t.outcome,
                    elapsed: t.elapsed.as_secs_f64(),
                    output: t.output.clone(),
                })
                .collect(),
        }
    }
}

/// Write the JSON report for `reports` to `path`
pub fn write_json(path: &Path, reports: &[SuiteReport]) -> Result<()> {
    let json = serde_json::to_string_pretty(&JsonReport::from_reports(reports))?;
    std::fs::write(path, json).map_err(|e| Error::FileWrite {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::TestCase;
    use std::path::Path;

    fn result(index: usize, name: &str, outcome: Outcome) -> TestResult {
        let test = TestCase::from_source(
            index,
            Path::new(name),
            name.to_string(),
            "// RUN: true\n",
            &Default::default(),
        );
        TestResult {
            display_name: format!("S :: {}", name),
            test,
            outcome,
            elapsed: Duration::from_millis(5),
            output: String::new(),
        }
    }

    fn report(outcomes: &[Outcome], xfail_strict: bool) -> SuiteReport {
        SuiteReport {
            suite: "S".to_string(),
            results: outcomes
                .iter()
                .enumerate()
                .map(|(i, o)| result(i, &format!("t{}.cpp", i), *o))
                .collect(),
            total: outcomes.len(),
            elapsed: Duration::from_secs(1),
            interrupted: false,
            xfail_strict,
        }
    }

    #[test]
    fn test_exit_code_policy() {
        assert_eq!(report(&[Outcome::Pass, Outcome::XFail, Outcome::Unsupported], false).exit_code(), 0);
        assert_eq!(report(&[Outcome::Pass, Outcome::Fail], false).exit_code(), 1);
        assert_eq!(report(&[Outcome::Unresolved], false).exit_code(), 1);
        assert_eq!(report(&[Outcome::Timeout], false).exit_code(), 1);
        assert_eq!(report(&[Outcome::XPass], false).exit_code(), 0);
        assert_eq!(report(&[Outcome::XPass], true).exit_code(), 1);
    }

    #[test]
    fn test_interrupted_run_fails() {
        let mut r = report(&[Outcome::Pass], false);
        r.total = 3;
        r.interrupted = true;
        assert!(!r.success());
    }

    #[test]
    fn test_counts_and_failures_keep_order() {
        let r = report(&[Outcome::Fail, Outcome::Pass, Outcome::Unresolved, Outcome::Pass], false);
        assert_eq!(r.count(Outcome::Pass), 2);
        assert_eq!(r.counts().get(&Outcome::Fail), Some(&1));
        assert_eq!(r.counts().get(&Outcome::Timeout), None);

        let names: Vec<_> = r.failures().iter().map(|t| t.test.name.clone()).collect();
        assert_eq!(names, ["t0.cpp", "t2.cpp"]);
    }

    #[test]
    fn test_json_report_shape() {
        let r = report(&[Outcome::Pass, Outcome::XFail], false);
        let value = serde_json::to_value(JsonReport::from_reports(&[r])).unwrap();
        assert_eq!(value["tests"][0]["name"], "S :: t0.cpp");
        assert_eq!(value["tests"][0]["code"], "PASS");
        assert_eq!(value["tests"][1]["code"], "XFAIL");
        assert_eq!(value["interrupted"], false);
    }
}
