//! Suite configuration (`lit.toml`)
//!
//! The raw TOML is deserialized into [`SuiteFile`], then built once into an
//! immutable [`TestSuiteConfig`]: every tool is looked up eagerly and the
//! substitution table is validated before any test runs.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::resolver;
use super::substitution::{Substitution, SubstitutionTable, ToolSubstitution};
use crate::common::{Error, Result};

/// A suite configuration file as written on disk
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    /// Name of the test suite
    pub name: String,
    /// File extensions (with leading dot) that mark test files
    #[serde(default)]
    pub suffixes: Vec<String>,
    /// Root to discover tests under, relative to the config file
    pub source_root: Option<PathBuf>,
    /// Run scripts with the internal shell rather than the platform one
    #[serde(default = "default_true")]
    pub use_internal_shell: bool,
    /// A pipeline fails if any of its stages fails
    #[serde(default = "default_true")]
    pub pipefail: bool,
    /// Directories searched for tools before `PATH`
    #[serde(default)]
    pub tool_dirs: Vec<PathBuf>,
    /// Features tests can name in REQUIRES/UNSUPPORTED/XFAIL
    #[serde(default)]
    pub available_features: Vec<String>,
    /// Directory or file names never treated as tests
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Tools resolved at build time
    #[serde(default)]
    pub tools: Vec<ToolEntry>,
    /// Literal substitutions
    #[serde(default)]
    pub substitutions: Vec<LiteralEntry>,
    /// Extra environment for test processes
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// A `[[tools]]` entry
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ToolEntry {
    /// `%token` to substitute, or a bare tool name that is only checked
    pub token: String,
    /// Executable name to look up (default: the token without `%`)
    pub command: Option<String>,
    /// Arguments appended after the resolved path
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Whether tests using the token fail as unresolved when it is missing
    #[serde(default = "default_true")]
    pub required: bool,
}

/// A `[[substitutions]]` entry
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LiteralEntry {
    pub token: String,
    pub value: String,
}

/// Options coming from the command line and user config
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Searched before the suite's own tool directories
    pub extra_tool_dirs: Vec<PathBuf>,
    /// `--param NAME=VALUE` pairs
    pub params: Vec<(String, String)>,
    /// Force the platform shell
    pub external_shell: bool,
}

/// A bare tool the suite relies on but does not substitute
#[derive(Debug, Clone)]
pub struct CheckedTool {
    pub name: String,
    pub resolved_path: Option<PathBuf>,
}

/// Immutable configuration of one suite for one run
#[derive(Debug, Clone)]
pub struct TestSuiteConfig {
    pub name: String,
    pub suffixes: BTreeSet<String>,
    pub source_root: PathBuf,
    /// Location of the `lit.toml` this was built from
    pub config_path: PathBuf,
    pub substitutions: SubstitutionTable,
    /// Environment overrides applied on top of the inherited environment
    pub exec_environment: BTreeMap<String, String>,
    /// Search order used for tool lookup
    pub tool_dirs: Vec<PathBuf>,
    pub available_features: BTreeSet<String>,
    pub excludes: Vec<String>,
    pub use_internal_shell: bool,
    pub pipefail: bool,
    pub checked_tools: Vec<CheckedTool>,
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl TestSuiteConfig {
    /// Load and build the suite configuration at `config_path`
    pub fn load(config_path: &Path, options: &BuildOptions) -> Result<Self> {
        let content = std::fs::read_to_string(config_path).map_err(|e| Error::FileRead {
            path: config_path.display().to_string(),
            error: e.to_string(),
        })?;
        let file: SuiteFile = toml::from_str(&content).map_err(|e| Error::ConfigParse {
            path: config_path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::build(file, config_path, options)
    }

    /// Build from an already-parsed suite file
    pub fn build(file: SuiteFile, config_path: &Path, options: &BuildOptions) -> Result<Self> {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if file.name.trim().is_empty() {
            return Err(Error::SuiteConfig("'name' must not be empty".to_string()));
        }
        if file.suffixes.is_empty() {
            return Err(Error::SuiteConfig(format!(
                "suite '{}' lists no suffixes",
                file.name
            )));
        }
        if let Some(bad) = file.suffixes.iter().find(|s| !s.starts_with('.') || s.len() < 2) {
            return Err(Error::SuiteConfig(format!(
                "suffix '{}' must look like '.ext'",
                bad
            )));
        }

        let source_root = match &file.source_root {
            Some(root) => absolutize(&config_dir, root),
            None => config_dir.clone(),
        };
        if !source_root.is_dir() {
            return Err(Error::SuiteConfig(format!(
                "source root '{}' is not a directory",
                source_root.display()
            )));
        }

        let mut tool_dirs: Vec<PathBuf> = options.extra_tool_dirs.clone();
        tool_dirs.extend(file.tool_dirs.iter().map(|d| absolutize(&config_dir, d)));

        let mut search_dirs = tool_dirs.clone();
        search_dirs.extend(resolver::path_dirs());

        let mut entries = Vec::new();
        let mut checked_tools = Vec::new();
        for tool in &file.tools {
            let command = tool
                .command
                .clone()
                .unwrap_or_else(|| tool.token.trim_start_matches('%').to_string());
            let resolved_path = resolver::find(&command, &search_dirs);

            if resolved_path.is_none() {
                tracing::warn!(
                    "Tool '{}' for '{}' not found in suite '{}'",
                    command,
                    tool.token,
                    file.name
                );
            }

            if tool.token.starts_with('%') {
                entries.push(Substitution::tool(ToolSubstitution {
                    token: tool.token.clone(),
                    tool: command,
                    resolved_path,
                    extra_args: tool.extra_args.clone(),
                    unresolved_is_error: tool.required,
                }));
            } else {
                checked_tools.push(CheckedTool {
                    name: command,
                    resolved_path,
                });
            }
        }
        entries.extend(
            file.substitutions
                .iter()
                .map(|s| Substitution::literal(&s.token, &s.value)),
        );
        let substitutions = SubstitutionTable::build(entries)?;

        let mut available_features: BTreeSet<String> =
            file.available_features.iter().cloned().collect();
        let mut exec_environment = file.environment.clone();
        for (name, value) in &options.params {
            if is_truthy(value) {
                available_features.insert(name.clone());
            }
            exec_environment.insert(
                format!("LIT_PARAM_{}", name.to_ascii_uppercase().replace('-', "_")),
                value.clone(),
            );
        }

        // Tool directories go first on PATH so bare tool names in RUN lines
        // pick up the same binaries substitution did
        if !tool_dirs.is_empty() {
            let inherited = exec_environment
                .get("PATH")
                .cloned()
                .or_else(|| std::env::var("PATH").ok())
                .unwrap_or_default();
            let mut dirs = tool_dirs.clone();
            dirs.extend(std::env::split_paths(&inherited));
            let joined = std::env::join_paths(dirs)
                .map_err(|e| Error::SuiteConfig(format!("invalid tool directory: {}", e)))?;
            exec_environment.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
        }

        tracing::debug!(
            "Built suite '{}' with {} substitutions, root {}",
            file.name,
            substitutions.len(),
            source_root.display()
        );

        Ok(Self {
            name: file.name,
            suffixes: file.suffixes.into_iter().collect(),
            source_root,
            config_path: config_path.to_path_buf(),
            substitutions,
            exec_environment,
            tool_dirs,
            available_features,
            excludes: file.excludes,
            use_internal_shell: file.use_internal_shell && !options.external_shell,
            pipefail: file.pipefail,
            checked_tools,
        })
    }

    /// Display name of a test in this suite
    pub fn test_display_name(&self, test_name: &str) -> String {
        format!("{} :: {}", self.name, test_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(text: &str) -> SuiteFile {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_build_minimal_suite() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("lit.toml");
        let file = parse(
            r#"
name = "CMFE"
suffixes = [".cpp"]

[[substitutions]]
token = "%dump-ast-for"
value = "-Xclang -ast-dump -Xclang -ast-dump-filter -Xclang"
"#,
        );
        let config = TestSuiteConfig::build(file, &config_path, &BuildOptions::default()).unwrap();
        assert_eq!(config.name, "CMFE");
        assert!(config.suffixes.contains(".cpp"));
        assert_eq!(config.source_root, dir.path());
        assert!(config.use_internal_shell);
        assert!(config.pipefail);
        assert!(config.substitutions.get("%dump-ast-for").is_some());
        assert_eq!(config.test_display_name("a.cpp"), "CMFE :: a.cpp");
    }

    #[test]
    fn test_missing_required_tool_is_recorded_not_fatal() {
        let dir = tempdir().unwrap();
        let file = parse(
            r#"
name = "s"
suffixes = [".cpp"]
tool_dirs = ["bin"]

[[tools]]
token = "%cmc"
command = "definitely-not-a-real-tool-xyz"

[[tools]]
token = "not-a-real-checker-xyz"
"#,
        );
        let config =
            TestSuiteConfig::build(file, &dir.path().join("lit.toml"), &BuildOptions::default())
                .unwrap();
        assert_eq!(config.substitutions.unresolved_tokens(), vec!["%cmc"]);
        assert_eq!(config.checked_tools.len(), 1);
        assert!(config.checked_tools[0].resolved_path.is_none());
        assert_eq!(config.tool_dirs, vec![dir.path().join("bin")]);
        let path = &config.exec_environment["PATH"];
        assert!(path.starts_with(&dir.path().join("bin").to_string_lossy().into_owned()));
    }

    #[test]
    fn test_collision_is_fatal_at_build() {
        let dir = tempdir().unwrap();
        let file = parse(
            r#"
name = "s"
suffixes = [".cpp"]

[[tools]]
token = "%cc"
required = false

[[substitutions]]
token = "%cc"
value = "gcc"
"#,
        );
        let err = TestSuiteConfig::build(file, &dir.path().join("lit.toml"), &BuildOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::SubstitutionCollision { .. }));
    }

    #[test]
    fn test_invalid_suffix_and_missing_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lit.toml");

        let err = TestSuiteConfig::build(
            parse("name = \"s\"\nsuffixes = [\"cpp\"]"),
            &path,
            &BuildOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SuiteConfig(_)));

        let err = TestSuiteConfig::build(
            parse("name = \"s\"\nsuffixes = [\".cpp\"]\nsource_root = \"nope\""),
            &path,
            &BuildOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SuiteConfig(_)));
    }

    #[test]
    fn test_params_and_external_shell_override() {
        let dir = tempdir().unwrap();
        let options = BuildOptions {
            params: vec![
                ("gpu".to_string(), "1".to_string()),
                ("opt-level".to_string(), "O2".to_string()),
            ],
            external_shell: true,
            ..Default::default()
        };
        let config = TestSuiteConfig::build(
            parse("name = \"s\"\nsuffixes = [\".ll\"]\navailable_features = [\"x86\"]"),
            &dir.path().join("lit.toml"),
            &options,
        )
        .unwrap();
        assert!(config.available_features.contains("gpu"));
        assert!(config.available_features.contains("x86"));
        assert!(!config.available_features.contains("opt-level"));
        assert_eq!(config.exec_environment["LIT_PARAM_OPT_LEVEL"], "O2");
        assert!(!config.use_internal_shell);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lit.toml");
        std::fs::write(&path, "name = \"s\"\nsuffixes = [\".c\"]\nbogus = 1\n").unwrap();
        let err = TestSuiteConfig::load(&path, &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }
}
