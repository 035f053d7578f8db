//! Test outcomes and their classification

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::suite::{ExpectedResult, TestCase};

/// Final verdict for one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pass,
    XFail,
    Unsupported,
    Fail,
    XPass,
    Unresolved,
    Timeout,
}

impl Outcome {
    pub const ALL: [Outcome; 7] = [
        Outcome::Pass,
        Outcome::XFail,
        Outcome::Unsupported,
        Outcome::Fail,
        Outcome::XPass,
        Outcome::Unresolved,
        Outcome::Timeout,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::XFail => "XFAIL",
            Outcome::Unsupported => "UNSUPPORTED",
            Outcome::Fail => "FAIL",
            Outcome::XPass => "XPASS",
            Outcome::Unresolved => "UNRESOLVED",
            Outcome::Timeout => "TIMEOUT",
        }
    }

    /// Whether this outcome makes the run fail
    pub fn is_failure(self, xfail_strict: bool) -> bool {
        match self {
            Outcome::Fail | Outcome::Unresolved | Outcome::Timeout => true,
            Outcome::XPass => xfail_strict,
            Outcome::Pass | Outcome::XFail | Outcome::Unsupported => false,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What running the commands produced, before expectations are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStatus {
    Passed,
    Failed,
    TimedOut,
    /// The test could not be prepared (missing tool, bad directives)
    Unresolved,
    /// Directives exclude the test
    Skipped,
}

/// Combine the raw status with what the test expects
pub fn classify(raw: RawStatus, expected: ExpectedResult) -> Outcome {
    match (raw, expected) {
        (RawStatus::TimedOut, _) => Outcome::Timeout,
        (RawStatus::Unresolved, _) => Outcome::Unresolved,
        (RawStatus::Skipped, _) => Outcome::Unsupported,
        (RawStatus::Passed, ExpectedResult::Pass) => Outcome::Pass,
        (RawStatus::Passed, ExpectedResult::XFail) => Outcome::XPass,
        (RawStatus::Failed, ExpectedResult::Pass) => Outcome::Fail,
        (RawStatus::Failed, ExpectedResult::XFail) => Outcome::XFail,
    }
}

/// Result of one test
#[derive(Debug, Clone)]
pub struct TestResult {
    pub test: TestCase,
    /// `suite :: name`
    pub display_name: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_matrix() {
        use ExpectedResult::*;
        assert_eq!(classify(RawStatus::Passed, Pass), Outcome::Pass);
        assert_eq!(classify(RawStatus::Failed, Pass), Outcome::Fail);
        assert_eq!(classify(RawStatus::Failed, XFail), Outcome::XFail);
        assert_eq!(classify(RawStatus::Passed, XFail), Outcome::XPass);
        assert_eq!(classify(RawStatus::TimedOut, XFail), Outcome::Timeout);
        assert_eq!(classify(RawStatus::Unresolved, Pass), Outcome::Unresolved);
        assert_eq!(classify(RawStatus::Skipped, XFail), Outcome::Unsupported);
    }

    #[test]
    fn test_failure_policy() {
        assert!(Outcome::Fail.is_failure(false));
        assert!(Outcome::Unresolved.is_failure(false));
        assert!(Outcome::Timeout.is_failure(false));
        assert!(!Outcome::XPass.is_failure(false));
        assert!(Outcome::XPass.is_failure(true));
        assert!(!Outcome::XFail.is_failure(true));
        assert!(!Outcome::Unsupported.is_failure(true));
    }

    #[test]
    fn test_outcome_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Outcome::XFail).unwrap(), "\"XFAIL\"");
        assert_eq!(serde_json::to_string(&Outcome::Unresolved).unwrap(), "\"UNRESOLVED\"");
    }
}
