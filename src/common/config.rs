//! User configuration file handling
//!
//! Holds defaults for `lit-runner run` that command-line flags override.

use serde::Deserialize;
use std::path::PathBuf;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Default run settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Extra directories searched for tools, after `--tool-dir` and before the suite's own
    #[serde(default)]
    pub tool_dirs: Vec<PathBuf>,
}

/// Default run settings
#[derive(Debug, Deserialize)]
pub struct Defaults {
    /// Number of parallel workers (0 = available parallelism)
    #[serde(default)]
    pub workers: usize,

    /// Treat unexpected passes as failures
    #[serde(default)]
    pub xfail_strict: bool,

    /// Show a progress bar while running
    #[serde(default = "default_progress")]
    pub progress: bool,

    /// Force the platform shell instead of the internal one
    #[serde(default)]
    pub external_shell: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            workers: 0,
            xfail_strict: false,
            progress: default_progress(),
            external_shell: false,
        }
    }
}

fn default_progress() -> bool {
    true
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Per-test wall-clock timeout (0 = none)
    #[serde(default = "default_test_timeout")]
    pub test_secs: u64,

    /// Whole-run timeout (0 = none)
    #[serde(default)]
    pub max_time_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            test_secs: default_test_timeout(),
            max_time_secs: 0,
        }
    }
}

fn default_test_timeout() -> u64 {
    600
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content =
                    std::fs::read_to_string(&path).map_err(|e| super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    })?;
                return Self::parse(&content).map_err(|e| match e {
                    super::Error::ConfigParse { message, .. } => super::Error::ConfigParse {
                        path: path.display().to_string(),
                        message,
                    },
                    other => other,
                });
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse {
            path: "<config>".to_string(),
            message: e.to_string(),
        })
    }

    /// Number of workers to use when the CLI did not specify one
    pub fn default_workers(&self) -> usize {
        if self.defaults.workers > 0 {
            return self.defaults.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.timeouts.test_secs, 600);
        assert!(config.defaults.progress);
        assert!(!config.defaults.xfail_strict);
        assert!(config.default_workers() >= 1);
    }

    #[test]
    fn test_partial_config() {
        let config = Config::parse(
            r#"
tool_dirs = ["/opt/llvm/bin"]

[defaults]
workers = 3
xfail_strict = true

[timeouts]
test_secs = 20
"#,
        )
        .unwrap();
        assert_eq!(config.default_workers(), 3);
        assert!(config.defaults.xfail_strict);
        assert_eq!(config.timeouts.test_secs, 20);
        assert_eq!(config.timeouts.max_time_secs, 0);
        assert_eq!(config.tool_dirs, vec![PathBuf::from("/opt/llvm/bin")]);
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let err = Config::parse("defaults = 3").unwrap_err();
        assert!(matches!(err, super::super::Error::ConfigParse { .. }));
    }
}
