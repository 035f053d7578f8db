//! Configuration and suite file paths
//!
//! User configuration lives in the platform config directory:
//! - Linux: `~/.config/lit-runner/config.toml`
//! - macOS: `~/Library/Application Support/lit-runner/config.toml`
//! - Windows: `%APPDATA%\lit-runner\config.toml`

use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "lit-runner";

/// Environment variable overriding the user config file location
pub const CONFIG_ENV: &str = "LIT_RUNNER_CONFIG";

/// File name of a suite configuration
pub const SUITE_CONFIG_FILE: &str = "lit.toml";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the user configuration file
///
/// `LIT_RUNNER_CONFIG` takes precedence over the platform location.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Find the suite configuration governing `path`
///
/// Looks for `lit.toml` in `path` itself (if it is a directory) and then
/// in each ancestor directory, nearest first.
pub fn find_suite_config(path: &Path) -> Option<PathBuf> {
    let start = if path.is_dir() { Some(path) } else { path.parent() };

    start?
        .ancestors()
        .map(|dir| dir.join(SUITE_CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_find_suite_config_in_ancestor() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(SUITE_CONFIG_FILE), "name = \"x\"").unwrap();
        let test_file = nested.join("t.cpp");
        std::fs::write(&test_file, "// RUN: true").unwrap();

        let found = find_suite_config(&test_file).unwrap();
        assert_eq!(found, dir.path().join(SUITE_CONFIG_FILE));

        let found = find_suite_config(&nested).unwrap();
        assert_eq!(found, dir.path().join(SUITE_CONFIG_FILE));
    }

    #[test]
    fn test_nearest_suite_config_wins() {
        let dir = tempdir().unwrap();
        let inner = dir.path().join("inner");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(dir.path().join(SUITE_CONFIG_FILE), "").unwrap();
        std::fs::write(inner.join(SUITE_CONFIG_FILE), "").unwrap();

        assert_eq!(
            find_suite_config(&inner).unwrap(),
            inner.join(SUITE_CONFIG_FILE)
        );
    }
}
