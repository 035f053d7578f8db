//! Platform shell executor
//!
//! Hands the whole run-line to `bash -c` (with `pipefail`), `sh -c`, or
//! `cmd /C` on Windows. `cd` and `export` do not carry over between
//! run-lines in this mode.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::process::Status;
use super::{append_block, ExecContext, ExecutionResult, ScriptExecutor};
use crate::common::Result;

/// Delegates scripts to the platform shell
#[derive(Debug, Clone)]
pub struct ExternalShell {
    program: PathBuf,
    /// Whether the shell understands `set -o pipefail`
    supports_pipefail: bool,
}

impl ExternalShell {
    /// Prefer bash, fall back to sh (or cmd on Windows)
    pub fn detect() -> Self {
        #[cfg(windows)]
        {
            Self {
                program: PathBuf::from("cmd"),
                supports_pipefail: false,
            }
        }

        #[cfg(not(windows))]
        {
            match which::which("bash") {
                Ok(program) => Self {
                    program,
                    supports_pipefail: true,
                },
                Err(_) => Self {
                    program: PathBuf::from("sh"),
                    supports_pipefail: false,
                },
            }
        }
    }

    fn command(&self, script: &str, pipefail: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        if cfg!(windows) {
            cmd.arg("/C").arg(script);
        } else if pipefail && self.supports_pipefail {
            cmd.arg("-c").arg(format!("set -o pipefail; {}", script));
        } else {
            cmd.arg("-c").arg(script);
        }
        cmd
    }
}

#[async_trait]
impl ScriptExecutor for ExternalShell {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn run(&self, script: &str, ctx: &mut ExecContext) -> Result<ExecutionResult> {
        let mut cmd = self.command(script, ctx.pipefail);
        cmd.current_dir(&ctx.state.cwd)
            .envs(&ctx.state.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!("{} -c {}", self.program.display(), script);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!("Failed to spawn '{}': {}", self.program.display(), e);
                let stderr = format!("'{}': could not start shell: {}\n", self.program.display(), e);
                let mut transcript = format!("$ {}\n", script);
                append_block(&mut transcript, "command stderr", &stderr);
                transcript.push_str("# command failed with exit status 127\n");
                return Ok(ExecutionResult {
                    exit_code: 127,
                    stdout: String::new(),
                    stderr,
                    transcript,
                });
            }
        };
        let pid = child.id();
        if let Some(pid) = pid {
            ctx.tracker.register(pid);
        }

        // Returns once both pipes close, so the group stays registered
        // while background jobs still hold them
        let output = child.wait_with_output().await;
        if let Some(pid) = pid {
            ctx.tracker.release(pid);
        }
        let output = output?;

        let status = Status::from(output.status);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let mut transcript = format!("$ {}\n", script);
        append_block(&mut transcript, "command stdout", &stdout);
        append_block(&mut transcript, "command stderr", &stderr);
        if !status.success() {
            transcript.push_str(&format!("# command failed with exit status {}\n", status.code));
        }

        Ok(ExecutionResult {
            exit_code: status.code,
            stdout,
            stderr,
            transcript,
        })
    }
}
