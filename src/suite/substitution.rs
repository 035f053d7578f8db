//! Substitution of `%tokens` in run-lines
//!
//! A token is `%` followed by a maximal run of `[A-Za-z0-9_-]`. A
//! registered token matches only when the whole run equals its name:
//! `%t` matches in `%t.ll` (the run stops at `.`) but never inside
//! `%test`. Substitution is a single left-to-right pass, so replacement
//! text is never rescanned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::common::{shell_quote, Error, Result};

/// Tokens supplied per test by the harness itself
pub const BUILTIN_TOKENS: &[&str] = &["%s", "%S", "%p", "%t", "%T"];

/// A tool invocation resolved at suite-build time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSubstitution {
    /// Token such as `%cmc`
    pub token: String,
    /// Name the tool was looked up by
    pub tool: String,
    /// Where the tool was found, if anywhere
    pub resolved_path: Option<PathBuf>,
    /// Arguments appended after the tool path
    pub extra_args: Vec<String>,
    /// Whether referencing the token fails the test when unresolved
    pub unresolved_is_error: bool,
}

impl ToolSubstitution {
    /// Replacement text, or `None` if the tool is missing and required
    fn replacement(&self) -> Option<String> {
        let program = match &self.resolved_path {
            Some(path) => shell_quote(&path.to_string_lossy()),
            None if self.unresolved_is_error => return None,
            None => self.tool.clone(),
        };
        let mut parts = vec![program];
        parts.extend(self.extra_args.iter().cloned());
        Some(parts.join(" "))
    }
}

/// What a token expands to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// Inserted verbatim
    Literal(String),
    /// Resolved tool path plus extra arguments
    Tool(ToolSubstitution),
}

/// A single registered substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub token: String,
    pub replacement: Replacement,
}

impl Substitution {
    /// A literal substitution
    pub fn literal(token: &str, value: &str) -> Self {
        Self {
            token: token.to_string(),
            replacement: Replacement::Literal(value.to_string()),
        }
    }

    /// A tool substitution
    pub fn tool(tool: ToolSubstitution) -> Self {
        Self {
            token: tool.token.clone(),
            replacement: Replacement::Tool(tool),
        }
    }
}

/// Per-test paths behind the built-in tokens
#[derive(Debug, Clone)]
pub struct TestPaths {
    /// The test file (`%s`)
    pub source: PathBuf,
    /// The test's private temporary directory (`%T`)
    pub tmp_dir: PathBuf,
}

impl TestPaths {
    pub fn new(source: &Path, tmp_dir: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            tmp_dir: tmp_dir.to_path_buf(),
        }
    }

    /// Temp file base (`%t`): `<tmp_dir>/<file name>.tmp`
    pub fn tmp_base(&self) -> PathBuf {
        let file_name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "test".to_string());
        self.tmp_dir.join(format!("{}.tmp", file_name))
    }

    fn builtin(&self, token: &str) -> Option<String> {
        let path = match token {
            "%s" => self.source.clone(),
            "%S" | "%p" => self
                .source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            "%t" => self.tmp_base(),
            "%T" => self.tmp_dir.clone(),
            _ => return None,
        };
        Some(shell_quote(&path.to_string_lossy()))
    }
}

/// Ordered, validated table of substitutions for one suite
#[derive(Debug, Clone, Default)]
pub struct SubstitutionTable {
    entries: Vec<Substitution>,
    index: HashMap<String, usize>,
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn validate_token(token: &str) -> Result<()> {
    let Some(name) = token.strip_prefix('%') else {
        return Err(Error::invalid_token(token, "tokens must start with '%'"));
    };
    if name.is_empty() {
        return Err(Error::invalid_token(token, "token name is empty"));
    }
    if let Some(bad) = name.chars().find(|c| !is_token_char(*c)) {
        return Err(Error::invalid_token(
            token,
            &format!("'{}' cannot appear in a token name", bad),
        ));
    }
    Ok(())
}

impl SubstitutionTable {
    /// Build the table, rejecting invalid and colliding tokens
    pub fn build(entries: Vec<Substitution>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            validate_token(&entry.token)?;
            if BUILTIN_TOKENS.contains(&entry.token.as_str()) {
                return Err(Error::SubstitutionCollision {
                    token: entry.token.clone(),
                });
            }
            if index.insert(entry.token.clone(), i).is_some() {
                return Err(Error::SubstitutionCollision {
                    token: entry.token.clone(),
                });
            }
        }
        Ok(Self { entries, index })
    }

    /// Registered substitutions in registration order
    pub fn entries(&self) -> &[Substitution] {
        &self.entries
    }

    pub fn get(&self, token: &str) -> Option<&Substitution> {
        self.index.get(token).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tokens that are registered but cannot be resolved
    pub fn unresolved_tokens(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| match &e.replacement {
                Replacement::Tool(t) if t.resolved_path.is_none() && t.unresolved_is_error => {
                    Some(e.token.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Substitute every token in `line`
    ///
    /// `test_name` is only used to name the test in resolution errors.
    pub fn apply(&self, line: &str, paths: &TestPaths, test_name: &str) -> Result<String> {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('%') {
                out.push('%');
                rest = tail;
                continue;
            }

            let run_len = after
                .char_indices()
                .find(|(_, c)| !is_token_char(*c))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            if run_len == 0 {
                out.push('%');
                rest = after;
                continue;
            }

            let token = &rest[pos..pos + 1 + run_len];
            if let Some(value) = paths.builtin(token) {
                out.push_str(&value);
            } else if let Some(entry) = self.get(token) {
                match &entry.replacement {
                    Replacement::Literal(value) => out.push_str(value),
                    Replacement::Tool(tool) => match tool.replacement() {
                        Some(value) => out.push_str(&value),
                        None => return Err(Error::unresolved_tool(token, test_name)),
                    },
                }
            } else {
                out.push_str(token);
            }
            rest = &after[run_len..];
        }
        out.push_str(rest);

        Ok(out)
    }
}
