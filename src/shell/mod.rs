//! Run-line execution
//!
//! A run-line, after substitution, is a small shell script. It is run
//! either by the internal interpreter ([`InternalShell`]) or handed to the
//! platform shell ([`ExternalShell`]). Both capture output and register
//! their children with a [`ProcessTracker`] so the caller can enforce
//! timeouts.

mod builtins;
mod external;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod process;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::common::Result;

pub use external::ExternalShell;
pub use interpreter::InternalShell;
pub use process::{ProcessTracker, Status};

/// Working directory and environment, mutated by `cd` and `export`
#[derive(Debug, Clone)]
pub struct ShellState {
    pub cwd: PathBuf,
    /// Overrides applied on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

/// Everything a script needs to run, shared by a test's run-lines
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub state: ShellState,
    pub tracker: ProcessTracker,
    /// A pipeline fails if any stage fails
    pub pipefail: bool,
}

impl ExecContext {
    pub fn new(cwd: PathBuf, env: BTreeMap<String, String>) -> Self {
        Self {
            state: ShellState { cwd, env },
            tracker: ProcessTracker::new(),
            pipefail: true,
        }
    }
}

/// Captured result of running one script
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Human-readable log of each command run and what it printed
    pub transcript: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a substituted run-line
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Run `script` to completion
    ///
    /// Parse errors are returned as `Error::ScriptParse`; a command that
    /// cannot be spawned is reported through the result's exit code.
    async fn run(&self, script: &str, ctx: &mut ExecContext) -> Result<ExecutionResult>;
}

/// Pick the executor a suite asks for
pub fn executor_for(use_internal_shell: bool) -> Box<dyn ScriptExecutor> {
    if use_internal_shell {
        Box::new(InternalShell)
    } else {
        Box::new(ExternalShell::detect())
    }
}

fn append_block(transcript: &mut String, label: &str, data: &str) {
    if data.is_empty() {
        return;
    }
    transcript.push_str(&format!("# {}:\n", label));
    transcript.push_str(data);
    if !data.ends_with('\n') {
        transcript.push('\n');
    }
}
