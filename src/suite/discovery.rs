//! Test discovery and directive parsing
//!
//! Walks a suite root for files whose extension is in the suffix set and
//! parses the `RUN:`, `XFAIL:`, `REQUIRES:`, `UNSUPPORTED:` and `END.`
//! directives embedded in each one.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::common::paths::SUITE_CONFIG_FILE;
use crate::common::{Error, Result};

/// What the test author expects to happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedResult {
    Pass,
    XFail,
}

/// A `RUN:` directive, with continuations already joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLine {
    /// 1-based line of the first `RUN:` making up this command
    pub line: usize,
    pub command: String,
}

/// Directives found in a test file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub run_lines: Vec<RunLine>,
    pub xfail: Vec<String>,
    pub requires: Vec<String>,
    pub unsupported: Vec<String>,
}

/// One discovered test
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Position in discovery order
    pub index: usize,
    /// Absolute or as-given path of the test file
    pub file_path: PathBuf,
    /// Path relative to the suite source root, `/`-separated
    pub name: String,
    pub run_lines: Vec<RunLine>,
    pub expected_result: ExpectedResult,
    /// Required features that are not available
    pub missing_features: Vec<String>,
    /// Available features listed in `UNSUPPORTED:`
    pub unsupported_by: Vec<String>,
    /// Why the file could not be read or parsed
    pub load_error: Option<String>,
}

impl TestCase {
    /// Whether directives exclude this test from running
    pub fn is_unsupported(&self) -> bool {
        !self.missing_features.is_empty() || !self.unsupported_by.is_empty()
    }

    /// Build a test case from a file's contents
    pub fn from_source(
        index: usize,
        file_path: &Path,
        name: String,
        content: &str,
        features: &BTreeSet<String>,
    ) -> Self {
        let mut case = Self {
            index,
            file_path: file_path.to_path_buf(),
            name,
            run_lines: Vec::new(),
            expected_result: ExpectedResult::Pass,
            missing_features: Vec::new(),
            unsupported_by: Vec::new(),
            load_error: None,
        };

        let directives = match parse_directives(file_path, content) {
            Ok(d) => d,
            Err(e) => {
                case.load_error = Some(e.to_string());
                return case;
            }
        };

        let matches = |item: &String| item == "*" || features.contains(item);
        if directives.xfail.iter().any(matches) {
            case.expected_result = ExpectedResult::XFail;
        }
        case.missing_features = directives
            .requires
            .iter()
            .filter(|f| !features.contains(*f))
            .cloned()
            .collect();
        case.unsupported_by = directives.unsupported.iter().filter(|f| matches(*f)).cloned().collect();
        case.run_lines = directives.run_lines;
        case
    }

    /// Read and parse a test file
    pub fn load(index: usize, file_path: &Path, name: String, features: &BTreeSet<String>) -> Self {
        match std::fs::read(file_path) {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                Self::from_source(index, file_path, name, &content, features)
            }
            Err(e) => {
                let mut case = Self::from_source(index, file_path, name, "", features);
                case.load_error = Some(
                    Error::FileRead {
                        path: file_path.display().to_string(),
                        error: e.to_string(),
                    }
                    .to_string(),
                );
                case
            }
        }
    }
}

/// Locate `keyword` in `line` where it is not the tail of a longer word
fn find_keyword(line: &str, keyword: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = line[from..].find(keyword) {
        let at = from + pos;
        let preceded_by_word = line[..at]
            .chars()
            .next_back()
            .map(|c| c.is_alphanumeric() || c == '_')
            .unwrap_or(false);
        if !preceded_by_word {
            return Some(at);
        }
        from = at + keyword.len();
    }
    None
}

fn split_list(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse directives out of a test file's text
pub fn parse_directives(path: &Path, content: &str) -> Result<Directives> {
    let mut directives = Directives::default();
    let mut pending: Option<RunLine> = None;

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;

        if let Some(pos) = find_keyword(line, "RUN:") {
            let text = line[pos + "RUN:".len()..].trim();
            let (text, continues) = match text.strip_suffix('\\') {
                Some(head) => (head.trim_end(), true),
                None => (text, false),
            };

            let mut run = match pending.take() {
                Some(mut run) => {
                    if !text.is_empty() {
                        if !run.command.is_empty() {
                            run.command.push(' ');
                        }
                        run.command.push_str(text);
                    }
                    run
                }
                None => RunLine {
                    line: line_no,
                    command: text.to_string(),
                },
            };

            if continues {
                pending = Some(run);
            } else {
                run.command = run.command.trim().to_string();
                if run.command.is_empty() {
                    return Err(Error::directive(path, line_no, "empty RUN: line"));
                }
                directives.run_lines.push(run);
            }
        } else if let Some(pos) = find_keyword(line, "XFAIL:") {
            directives.xfail.extend(split_list(&line[pos + "XFAIL:".len()..]));
        } else if let Some(pos) = find_keyword(line, "REQUIRES:") {
            directives.requires.extend(split_list(&line[pos + "REQUIRES:".len()..]));
        } else if let Some(pos) = find_keyword(line, "UNSUPPORTED:") {
            directives
                .unsupported
                .extend(split_list(&line[pos + "UNSUPPORTED:".len()..]));
        } else if find_keyword(line, "END.").is_some() {
            break;
        }
    }

    if let Some(run) = pending {
        return Err(Error::directive(
            path,
            run.line,
            "RUN: line ends with '\\' but no RUN: line follows",
        ));
    }

    Ok(directives)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn is_excluded(entry: &DirEntry, excludes: &[String]) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| excludes.iter().any(|e| e == name))
            .unwrap_or(false)
}

/// Whether `path` has one of the configured suffixes (e.g. `.cpp`)
pub fn has_suffix(path: &Path, suffixes: &BTreeSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| suffixes.contains(&format!(".{}", ext)))
        .unwrap_or(false)
}

/// Collect test files under `root`, sorted by path
///
/// Hidden entries, excluded names, and the suite config file are
/// skipped. Read-only; calling it again yields the same list.
pub fn find_test_files(
    root: &Path,
    suffixes: &BTreeSet<String>,
    excludes: &[String],
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e) && !is_excluded(e, excludes));

    for entry in walker {
        let entry = entry.map_err(|e| Error::FileRead {
            path: e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| root.display().to_string()),
            error: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name() == SUITE_CONFIG_FILE {
            continue;
        }
        if has_suffix(entry.path(), suffixes) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    tracing::debug!("Found {} test files under {}", files.len(), root.display());
    Ok(files)
}

/// Test name for `path`: relative to `root` with `/` separators
pub fn test_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Discover every test under `root` whose extension is in `suffixes`
pub fn discover(
    root: &Path,
    suffixes: &BTreeSet<String>,
    excludes: &[String],
    features: &BTreeSet<String>,
) -> Result<Vec<TestCase>> {
    let files = find_test_files(root, suffixes, excludes)?;
    Ok(files
        .iter()
        .enumerate()
        .map(|(i, path)| TestCase::load(i, path, test_name(root, path), features))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_run_lines_and_continuations() {
        let src = "\
// RUN: %cmc -march=SKL -emit-llvm -- %s 2>&1 \\
// RUN:   | FileCheck %s
// RUN: FileCheck %s --input-file %t.ll
int main() {}
";
        let d = parse_directives(Path::new("a.cpp"), src).unwrap();
        assert_eq!(d.run_lines.len(), 2);
        assert_eq!(
            d.run_lines[0].command,
            "%cmc -march=SKL -emit-llvm -- %s 2>&1 | FileCheck %s"
        );
        assert_eq!(d.run_lines[0].line, 1);
        assert_eq!(d.run_lines[1].line, 3);
    }

    #[test]
    fn test_parse_lists_and_end_marker() {
        let src = "\
; REQUIRES: x86, asserts
; UNSUPPORTED: windows
; XFAIL: *
; RUN: true
; END.
; RUN: false
";
        let d = parse_directives(Path::new("a.ll"), src).unwrap();
        assert_eq!(d.requires, vec!["x86", "asserts"]);
        assert_eq!(d.unsupported, vec!["windows"]);
        assert_eq!(d.xfail, vec!["*"]);
        assert_eq!(d.run_lines.len(), 1);
    }

    #[test]
    fn test_keyword_inside_word_is_ignored() {
        let src = "// PRERUN: nope\n// XRUN: nope\n// RUN: yes\n";
        let d = parse_directives(Path::new("a.cpp"), src).unwrap();
        assert_eq!(d.run_lines.len(), 1);
        assert_eq!(d.run_lines[0].command, "yes");
    }

    #[test]
    fn test_dangling_continuation_is_error() {
        let err = parse_directives(Path::new("a.cpp"), "// RUN: echo \\\n").unwrap_err();
        assert!(matches!(err, Error::DirectiveParse { line: 1, .. }));
    }

    #[test]
    fn test_expected_result_from_features() {
        let src = "// XFAIL: gpu\n// RUN: true\n";
        let with = TestCase::from_source(0, Path::new("a"), "a".into(), src, &set(&["gpu"]));
        let without = TestCase::from_source(0, Path::new("a"), "a".into(), src, &set(&[]));
        assert_eq!(with.expected_result, ExpectedResult::XFail);
        assert_eq!(without.expected_result, ExpectedResult::Pass);
    }

    #[test]
    fn test_requires_and_unsupported() {
        let src = "// REQUIRES: x86\n// UNSUPPORTED: slow\n// RUN: true\n";
        let case = TestCase::from_source(0, Path::new("a"), "a".into(), src, &set(&["x86"]));
        assert!(!case.is_unsupported());

        let case = TestCase::from_source(0, Path::new("a"), "a".into(), src, &set(&[]));
        assert_eq!(case.missing_features, vec!["x86"]);
        assert!(case.is_unsupported());

        let case = TestCase::from_source(0, Path::new("a"), "a".into(), src, &set(&["x86", "slow"]));
        assert_eq!(case.unsupported_by, vec!["slow"]);
    }

    #[test]
    fn test_discover_selects_by_suffix_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join("Inputs")).unwrap();
        std::fs::write(root.join("b.cpp"), "// RUN: true\n").unwrap();
        std::fs::write(root.join("a.cpp"), "// RUN: true\n").unwrap();
        std::fs::write(root.join("notes.txt"), "// RUN: true\n").unwrap();
        std::fs::write(root.join("sub").join("c.cpp"), "// RUN: true\n").unwrap();
        std::fs::write(root.join("sub").join("d.c"), "// RUN: true\n").unwrap();
        std::fs::write(root.join(".git").join("e.cpp"), "").unwrap();
        std::fs::write(root.join("Inputs").join("f.cpp"), "").unwrap();
        std::fs::write(root.join(SUITE_CONFIG_FILE), "").unwrap();

        let suffixes = set(&[".cpp"]);
        let excludes = vec!["Inputs".to_string()];
        let first = discover(root, &suffixes, &excludes, &set(&[])).unwrap();
        let names: Vec<_> = first.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a.cpp", "b.cpp", "sub/c.cpp"]);
        assert_eq!(first[2].index, 2);

        let second = discover(root, &suffixes, &excludes, &set(&[])).unwrap();
        let again: Vec<_> = second.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, again);

        let both = find_test_files(root, &set(&[".cpp", ".c"]), &excludes).unwrap();
        assert_eq!(both.len(), 4);
    }

    #[test]
    fn test_unreadable_file_records_load_error() {
        let case = TestCase::load(0, Path::new("/nonexistent/x.cpp"), "x.cpp".into(), &set(&[]));
        assert!(case.load_error.is_some());
        assert!(case.run_lines.is_empty());
    }
}
