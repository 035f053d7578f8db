//! Error types for the test harness
//!
//! Error messages are meant to be actionable: configuration errors say
//! which file and entry to fix, per-test errors name the test.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Suite Configuration Errors ===
    #[error("No lit.toml found in '{0}' or any parent directory")]
    SuiteNotFound(PathBuf),

    #[error("Invalid suite configuration: {0}")]
    SuiteConfig(String),

    #[error("Invalid configuration file '{path}': {message}")]
    ConfigParse { path: String, message: String },

    // === Substitution Errors ===
    #[error("Invalid substitution token '{token}': {reason}")]
    InvalidToken { token: String, reason: String },

    #[error("Substitution token '{token}' is registered more than once or shadows a built-in token")]
    SubstitutionCollision { token: String },

    #[error("Tool for '{token}' was not found, required by test '{test}'")]
    UnresolvedTool { token: String, test: String },

    // === Test File Errors ===
    #[error("{path}:{line}: {message}")]
    DirectiveParse {
        path: String,
        line: usize,
        message: String,
    },

    // === Script Errors ===
    #[error("Shell parse error: {0}")]
    ScriptParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Failed to write file '{path}': {error}")]
    FileWrite { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unresolved tool error for a test
    pub fn unresolved_tool(token: &str, test: &str) -> Self {
        Self::UnresolvedTool {
            token: token.to_string(),
            test: test.to_string(),
        }
    }

    /// Create an invalid token error
    pub fn invalid_token(token: &str, reason: &str) -> Self {
        Self::InvalidToken {
            token: token.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a directive parse error for a test file line (1-based)
    pub fn directive(path: &std::path::Path, line: usize, message: impl Into<String>) -> Self {
        Self::DirectiveParse {
            path: path.display().to_string(),
            line,
            message: message.into(),
        }
    }

    /// Whether this error invalidates the whole suite rather than one test
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::SuiteNotFound(_)
                | Error::SuiteConfig(_)
                | Error::ConfigParse { .. }
                | Error::InvalidToken { .. }
                | Error::SubstitutionCollision { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_classified() {
        assert!(Error::SubstitutionCollision { token: "%t".into() }.is_configuration());
        assert!(Error::SuiteConfig("bad".into()).is_configuration());
        assert!(!Error::unresolved_tool("%cmc", "a.cpp").is_configuration());
        assert!(!Error::ScriptParse("x".into()).is_configuration());
    }

    #[test]
    fn test_unresolved_tool_message_names_token_and_test() {
        let msg = Error::unresolved_tool("%cmc", "CMFE :: a.cpp").to_string();
        assert!(msg.contains("%cmc"));
        assert!(msg.contains("CMFE :: a.cpp"));
    }
}
