//! Common utilities shared across the harness

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Quote a word for the harness shell when it contains characters the
/// lexer would otherwise split or interpret
pub fn shell_quote(word: &str) -> String {
    let needs_quotes = word.is_empty()
        || word.chars().any(|c| {
            c.is_whitespace()
                || matches!(
                    c,
                    '\'' | '"' | '\\' | '|' | '&' | ';' | '<' | '>' | '(' | ')' | '`' | '$'
                )
        });
    if !needs_quotes {
        return word.to_string();
    }
    // Close, escape, reopen for embedded single quotes
    format!("'{}'", word.replace('\'', r#"'"'"'"#))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain_word_unchanged() {
        assert_eq!(shell_quote("/usr/bin/cmc"), "/usr/bin/cmc");
    }

    #[test]
    fn test_shell_quote_spaces() {
        assert_eq!(shell_quote("/opt/my tools/cmc"), "'/opt/my tools/cmc'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("/opt/x86(64)/cc"), "'/opt/x86(64)/cc'");
    }
}
