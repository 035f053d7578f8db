//! CLI command handling
//!
//! Groups the given paths by suite, builds each suite's configuration,
//! runs or lists its tests, and prints the results.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::watch;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::paths::find_suite_config;
use crate::common::{Error, Result};
use crate::runner::{self, RunOptions, SuiteReport};
use crate::suite::discovery::{find_test_files, test_name};
use crate::suite::{BuildOptions, TestCase, TestSuiteConfig};

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands, verbose: bool) -> Result<i32> {
    let config = Config::load()?;

    match command {
        Commands::Run {
            paths,
            timeout,
            workers,
            xfail_strict,
            show_all,
            max_time,
            filter,
            tool_dirs,
            params,
            json,
            external_shell,
            no_progress,
        } => {
            let build = BuildOptions {
                extra_tool_dirs: tool_dirs
                    .into_iter()
                    .chain(config.tool_dirs.iter().cloned())
                    .collect(),
                params: params.iter().map(|p| parse_param(p)).collect::<Result<_>>()?,
                external_shell: external_shell || config.defaults.external_shell,
            };
            let timeout_secs = timeout.unwrap_or(config.timeouts.test_secs);
            let options = RunOptions {
                workers: workers.filter(|&n| n > 0).unwrap_or_else(|| config.default_workers()),
                timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
                xfail_strict: xfail_strict || config.defaults.xfail_strict,
                verbose,
                show_all,
                progress: !no_progress && config.defaults.progress,
            };
            let max_time = max_time
                .or((config.timeouts.max_time_secs > 0).then_some(config.timeouts.max_time_secs))
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs);

            run(&paths, &build, &options, filter.as_deref(), max_time, json.as_deref()).await
        }

        Commands::List { paths, filter } => {
            let build = BuildOptions {
                extra_tool_dirs: config.tool_dirs.clone(),
                ..Default::default()
            };
            let mut found = 0;
            for (config_path, inputs) in group_by_suite(&paths)? {
                let suite = TestSuiteConfig::load(&config_path, &build)?;
                for test in select_tests(&suite, &inputs, filter.as_deref())? {
                    println!("{}", suite.test_display_name(&test.name));
                    found += 1;
                }
            }
            if found == 0 {
                return Err(no_tests(&paths));
            }
            Ok(0)
        }
    }
}

async fn run(
    paths: &[PathBuf],
    build: &BuildOptions,
    options: &RunOptions,
    filter: Option<&str>,
    max_time: Option<Duration>,
    json: Option<&Path>,
) -> Result<i32> {
    // Every suite is built before anything runs
    let mut suites = Vec::new();
    for (config_path, inputs) in group_by_suite(paths)? {
        let suite = TestSuiteConfig::load(&config_path, build)?;
        let tests = select_tests(&suite, &inputs, filter)?;
        if !tests.is_empty() {
            suites.push((Arc::new(suite), tests));
        }
    }
    if suites.is_empty() {
        return Err(no_tests(paths));
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cancel_tx = Arc::new(cancel_tx);
    {
        let cancel_tx = Arc::clone(&cancel_tx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Interrupted, stopping tests...".yellow());
                let _ = cancel_tx.send(true);
            }
        });
    }
    if let Some(limit) = max_time {
        let cancel_tx = Arc::clone(&cancel_tx);
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            tracing::warn!("Reached maximum run time of {} seconds", limit.as_secs());
            let _ = cancel_tx.send(true);
        });
    }

    let mut reports: Vec<SuiteReport> = Vec::new();
    for (suite, tests) in suites {
        if *cancel_rx.borrow() {
            break;
        }
        println!(
            "{} {}: {} tests, {} workers",
            "Testing".blue().bold(),
            suite.name.white().bold(),
            tests.len(),
            options.workers.min(tests.len()).max(1)
        );
        let report = runner::run_suite(suite, tests, options, cancel_rx.clone()).await;
        report.print_summary();
        reports.push(report);
    }

    if let Some(path) = json {
        runner::write_json(path, &reports)?;
        tracing::info!("Wrote JSON report to {}", path.display());
    }

    let interrupted = *cancel_rx.borrow();
    let code = reports.iter().map(SuiteReport::exit_code).max().unwrap_or(0);
    if code == 0 && !interrupted {
        println!("\n{}", "All tests passed".green().bold());
        Ok(0)
    } else {
        Ok(1)
    }
}

fn no_tests(paths: &[PathBuf]) -> Error {
    let shown: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    Error::SuiteConfig(format!("no tests found in {}", shown.join(", ")))
}

/// Parse `NAME=VALUE`; a bare `NAME` has an empty value
fn parse_param(param: &str) -> Result<(String, String)> {
    let (name, value) = param.split_once('=').unwrap_or((param, ""));
    if name.is_empty() {
        return Err(Error::SuiteConfig(format!(
            "invalid parameter '{}', expected NAME=VALUE",
            param
        )));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Map each input to its nearest `lit.toml`, keeping first-seen order
fn group_by_suite(paths: &[PathBuf]) -> Result<Vec<(PathBuf, Vec<PathBuf>)>> {
    let mut groups: Vec<(PathBuf, Vec<PathBuf>)> = Vec::new();
    for path in paths {
        let path = path.canonicalize().map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config_path =
            find_suite_config(&path).ok_or_else(|| Error::SuiteNotFound(path.clone()))?;

        match groups.iter_mut().find(|(c, _)| *c == config_path) {
            Some((_, inputs)) => inputs.push(path),
            None => groups.push((config_path, vec![path])),
        }
    }
    Ok(groups)
}

/// Tests of `suite` selected by `inputs`, in discovery order
///
/// A directory input selects every test file under it; a file input
/// selects that file even when its suffix is not one of the suite's.
fn select_tests(
    suite: &TestSuiteConfig,
    inputs: &[PathBuf],
    filter: Option<&str>,
) -> Result<Vec<TestCase>> {
    let root = suite
        .source_root
        .canonicalize()
        .unwrap_or_else(|_| suite.source_root.clone());

    let mut seen = BTreeSet::new();
    let mut files = Vec::new();
    for input in inputs {
        let found = if input.is_dir() {
            let walk_from = if root.starts_with(input) { &root } else { input };
            find_test_files(walk_from, &suite.suffixes, &suite.excludes)?
        } else {
            vec![input.clone()]
        };
        for file in found {
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }

    Ok(files
        .into_iter()
        .map(|path| {
            let name = test_name(&root, &path);
            (path, name)
        })
        .filter(|(_, name)| filter.map_or(true, |text| name.contains(text)))
        .enumerate()
        .map(|(index, (path, name))| {
            TestCase::load(index, &path, name, &suite.available_features)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_suite(dir: &Path) -> TestSuiteConfig {
        std::fs::write(
            dir.join("lit.toml"),
            "name = \"Demo\"\nsuffixes = [\".cpp\"]\nexcludes = [\"Inputs\"]\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.join("sub/Inputs")).unwrap();
        for name in ["a.cpp", "sub/b.cpp", "sub/Inputs/c.cpp", "notes.txt"] {
            std::fs::write(dir.join(name), "// RUN: true\n").unwrap();
        }
        TestSuiteConfig::load(&dir.join("lit.toml"), &BuildOptions::default()).unwrap()
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("gpu=1").unwrap(), ("gpu".into(), "1".into()));
        assert_eq!(parse_param("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert_eq!(parse_param("flag").unwrap(), ("flag".into(), "".into()));
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_group_by_suite() {
        let dir = tempdir().unwrap();
        write_suite(dir.path());
        let groups =
            group_by_suite(&[dir.path().join("a.cpp"), dir.path().join("sub")]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
        assert!(groups[0].0.ends_with("lit.toml"));

        assert!(group_by_suite(&[dir.path().join("missing.cpp")]).is_err());
    }

    #[test]
    fn test_select_tests_from_root_and_files() {
        let dir = tempdir().unwrap();
        let suite = write_suite(dir.path());
        let root = dir.path().canonicalize().unwrap();

        let tests = select_tests(&suite, &[root.clone()], None).unwrap();
        let names: Vec<_> = tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a.cpp", "sub/b.cpp"]);
        assert_eq!(tests[1].index, 1);

        // Explicit files run even without a matching suffix, once each
        let inputs = [root.join("notes.txt"), root.join("a.cpp"), root.join("a.cpp")];
        let tests = select_tests(&suite, &inputs, None).unwrap();
        let names: Vec<_> = tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["notes.txt", "a.cpp"]);
    }

    #[test]
    fn test_select_tests_filter_reindexes() {
        let dir = tempdir().unwrap();
        let suite = write_suite(dir.path());
        let root = dir.path().canonicalize().unwrap();

        let tests = select_tests(&suite, &[root], Some("sub/")).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name, "sub/b.cpp");
        assert_eq!(tests[0].index, 0);
    }
}
