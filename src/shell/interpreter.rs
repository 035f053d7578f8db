//! Internal shell interpreter
//!
//! Pipeline stages run concurrently. Each stage's stdout is streamed in
//! chunks over a channel into the next stage's stdin; the last stage's
//! stdout and every stage's stderr are collected for the transcript.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture, FutureExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::builtins::{self, BuiltinOutput};
use super::lexer::RedirectOp;
use super::parser::{self, Connector, Pipeline, Redirect};
use super::process::{ProcessTracker, Status};
use super::{append_block, ExecContext, ExecutionResult, ScriptExecutor, ShellState};
use crate::common::Result;

const CHUNK_SIZE: usize = 8 * 1024;
const CHANNEL_DEPTH: usize = 16;

type Chunk = Vec<u8>;

/// The harness's own shell
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalShell;

enum Input {
    Null,
    Pipe(mpsc::Receiver<Chunk>),
    File(std::fs::File),
}

impl Input {
    fn into_stdio(self) -> (Stdio, Option<mpsc::Receiver<Chunk>>) {
        match self {
            Input::Null => (Stdio::null(), None),
            Input::Pipe(rx) => (Stdio::piped(), Some(rx)),
            Input::File(f) => (Stdio::from(f), None),
        }
    }
}

enum Output {
    Sink(mpsc::Sender<Chunk>),
    File(std::fs::File),
    Null,
}

impl Output {
    fn try_clone(&self) -> std::io::Result<Self> {
        Ok(match self {
            Output::Sink(tx) => Output::Sink(tx.clone()),
            Output::File(f) => Output::File(f.try_clone()?),
            Output::Null => Output::Null,
        })
    }

    fn into_stdio(self) -> (Stdio, Option<mpsc::Sender<Chunk>>) {
        match self {
            Output::Sink(tx) => (Stdio::piped(), Some(tx)),
            Output::File(f) => (Stdio::from(f), None),
            Output::Null => (Stdio::null(), None),
        }
    }

    async fn write_all(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        match self {
            // A closed reader is a broken pipe; the data is dropped like a shell would
            Output::Sink(tx) => {
                let _ = tx.send(data.to_vec()).await;
            }
            Output::File(f) => {
                if let Err(e) = f.write_all(data) {
                    tracing::debug!("Redirect write failed: {}", e);
                }
            }
            Output::Null => {}
        }
    }
}

/// `not` wrappers around a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invert {
    /// `not`: succeed iff the command exits non-zero without crashing
    Not,
    /// `not --crash`: succeed iff the command dies from a signal
    Crash,
}

impl Invert {
    fn apply(self, status: Status) -> Status {
        let ok = match self {
            Invert::Not => status.signal.is_none() && status.code != 0,
            Invert::Crash => status.signal.is_some(),
        };
        if ok {
            Status::SUCCESS
        } else {
            Status::FAILURE
        }
    }
}

fn strip_not(args: &[String]) -> (Vec<Invert>, &[String]) {
    let mut inverts = Vec::new();
    let mut rest = args;
    while rest.first().map(String::as_str) == Some("not") {
        if rest.get(1).map(String::as_str) == Some("--crash") {
            inverts.push(Invert::Crash);
            rest = &rest[2..];
        } else {
            inverts.push(Invert::Not);
            rest = &rest[1..];
        }
    }
    (inverts, rest)
}

fn resolve(state: &ShellState, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        state.cwd.join(p)
    }
}

fn is_null_device(target: &str) -> bool {
    target == "/dev/null" || target.eq_ignore_ascii_case("nul")
}

fn open_output(state: &ShellState, target: &str, append: bool) -> std::io::Result<Output> {
    if is_null_device(target) {
        return Ok(Output::Null);
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(resolve(state, target))?;
    Ok(Output::File(file))
}

/// Apply redirections left to right, like a POSIX shell
fn apply_redirects(
    redirects: &[Redirect],
    state: &ShellState,
    stdin: &mut Input,
    stdout: &mut Output,
    stderr: &mut Output,
) -> std::result::Result<(), String> {
    for redirect in redirects {
        let target = redirect.target.as_deref().unwrap_or_default();
        let describe = |e: std::io::Error| format!("{} {}: {}", redirect.op, target, e);
        match redirect.op {
            RedirectOp::In => {
                *stdin = if is_null_device(target) {
                    Input::Null
                } else {
                    Input::File(std::fs::File::open(resolve(state, target)).map_err(describe)?)
                };
            }
            RedirectOp::Out => *stdout = open_output(state, target, false).map_err(describe)?,
            RedirectOp::Append => *stdout = open_output(state, target, true).map_err(describe)?,
            RedirectOp::Err => *stderr = open_output(state, target, false).map_err(describe)?,
            RedirectOp::ErrAppend => *stderr = open_output(state, target, true).map_err(describe)?,
            RedirectOp::ErrToOut => *stderr = stdout.try_clone().map_err(describe)?,
            RedirectOp::OutToErr => *stdout = stderr.try_clone().map_err(describe)?,
            RedirectOp::Both => {
                let out = open_output(state, target, false).map_err(describe)?;
                *stderr = out.try_clone().map_err(describe)?;
                *stdout = out;
            }
        }
    }
    Ok(())
}

fn pipeline_status(statuses: &[Status], pipefail: bool) -> Status {
    if pipefail {
        statuses
            .iter()
            .rev()
            .find(|s| !s.success())
            .copied()
            .unwrap_or(Status::SUCCESS)
    } else {
        statuses.last().copied().unwrap_or(Status::SUCCESS)
    }
}

fn collect(mut rx: mpsc::Receiver<Chunk>) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut data = Vec::new();
        while let Some(chunk) = rx.recv().await {
            data.extend_from_slice(&chunk);
        }
        data
    })
}

fn pump<R>(mut reader: R, tx: mpsc::Sender<Chunk>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}

async fn write_builtin_output(output: BuiltinOutput, stdout: &mut Output, stderr: &mut Output) -> Status {
    stdout.write_all(&output.stdout).await;
    stderr.write_all(&output.stderr).await;
    Status::from_code(output.code)
}

/// Spawn and wait for one external command
///
/// Returns the child's pid alongside its status. The process group stays
/// registered with `tracker` until the caller has drained its output.
async fn run_external(
    args: Vec<String>,
    state: ShellState,
    tracker: ProcessTracker,
    stdin: Input,
    stdout: Output,
    stderr: Output,
) -> (Status, Option<u32>) {
    let mut diagnostics = match stderr.try_clone() {
        Ok(out) => out,
        Err(_) => Output::Null,
    };

    // Relative paths with a directory part are relative to the shell's cwd
    let program = if args[0].contains('/') || args[0].contains(std::path::MAIN_SEPARATOR) {
        resolve(&state, &args[0]).into_os_string()
    } else {
        args[0].clone().into()
    };

    let (stdin_stdio, input_rx) = stdin.into_stdio();
    let (stdout_stdio, stdout_tx) = stdout.into_stdio();
    let (stderr_stdio, stderr_tx) = stderr.into_stdio();

    let mut cmd = Command::new(&program);
    cmd.args(&args[1..])
        .current_dir(&state.cwd)
        .envs(&state.env)
        .stdin(stdin_stdio)
        .stdout(stdout_stdio)
        .stderr(stderr_stdio)
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let code = if e.kind() == std::io::ErrorKind::PermissionDenied {
                126
            } else {
                127
            };
            tracing::debug!("Failed to spawn '{}': {}", args[0], e);
            diagnostics
                .write_all(format!("'{}': command not found or not executable: {}\n", args[0], e).as_bytes())
                .await;
            return (Status::from_code(code), None);
        }
    };
    drop(diagnostics);

    let pid = child.id();
    if let Some(pid) = pid {
        tracker.register(pid);
    }

    if let (Some(mut rx), Some(mut child_stdin)) = (input_rx, child.stdin.take()) {
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if child_stdin.write_all(&chunk).await.is_err() {
                    break;
                }
            }
            let _ = child_stdin.shutdown().await;
        });
    }
    if let (Some(tx), Some(out)) = (stdout_tx, child.stdout.take()) {
        pump(out, tx);
    }
    if let (Some(tx), Some(err)) = (stderr_tx, child.stderr.take()) {
        pump(err, tx);
    }

    let status = match child.wait().await {
        Ok(status) => Status::from(status),
        Err(e) => {
            tracing::warn!("Failed to wait for '{}': {}", args[0], e);
            Status::FAILURE
        }
    };
    (status, pid)
}

impl InternalShell {
    /// Run one pipeline, returning its status and captured stdout/stderr
    async fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        ctx: &mut ExecContext,
    ) -> (Status, Vec<u8>, Vec<u8>) {
        let (out_tx, out_rx) = mpsc::channel::<Chunk>(CHANNEL_DEPTH);
        let (err_tx, err_rx) = mpsc::channel::<Chunk>(CHANNEL_DEPTH);
        let stdout_task = collect(out_rx);
        let stderr_task = collect(err_rx);

        let count = pipeline.stages.len();
        let single = count == 1;
        let mut next_input: Option<mpsc::Receiver<Chunk>> = None;
        let mut stages: Vec<BoxFuture<'static, (Status, Option<u32>)>> = Vec::with_capacity(count);
        let mut inverts_per_stage = Vec::with_capacity(count);

        for (i, command) in pipeline.stages.iter().enumerate() {
            let mut stdin = match next_input.take() {
                Some(rx) => Input::Pipe(rx),
                None => Input::Null,
            };
            let mut stdout = if i + 1 == count {
                Output::Sink(out_tx.clone())
            } else {
                let (tx, rx) = mpsc::channel::<Chunk>(CHANNEL_DEPTH);
                next_input = Some(rx);
                Output::Sink(tx)
            };
            let mut stderr = Output::Sink(err_tx.clone());

            let (inverts, args) = strip_not(&command.args);
            inverts_per_stage.push(inverts);

            if let Err(message) =
                apply_redirects(&command.redirects, &ctx.state, &mut stdin, &mut stdout, &mut stderr)
            {
                let mut diag = Output::Sink(err_tx.clone());
                stages.push(
                    async move {
                        diag.write_all(format!("{}\n", message).as_bytes()).await;
                        (Status::FAILURE, None)
                    }
                    .boxed(),
                );
                continue;
            }

            if args.is_empty() {
                stages.push(
                    async move {
                        stderr.write_all(b"not: missing command\n").await;
                        (Status::from_code(2), None)
                    }
                    .boxed(),
                );
                continue;
            }

            let args = args.to_vec();
            if builtins::is_builtin(&args[0]) {
                // Only a lone built-in may change the shell's own state
                let output = if single {
                    builtins::run(&args, &mut ctx.state)
                } else {
                    let mut scratch = ctx.state.clone();
                    builtins::run(&args, &mut scratch)
                };
                stages.push(
                    async move {
                        drop(stdin);
                        (write_builtin_output(output, &mut stdout, &mut stderr).await, None)
                    }
                    .boxed(),
                );
            } else {
                stages.push(
                    run_external(
                        args,
                        ctx.state.clone(),
                        ctx.tracker.clone(),
                        stdin,
                        stdout,
                        stderr,
                    )
                    .boxed(),
                );
            }
        }

        // Collectors finish once every stage has dropped its senders
        drop(out_tx);
        drop(err_tx);

        let raw = join_all(stages).await;
        let mut pids = Vec::new();
        let statuses: Vec<Status> = raw
            .into_iter()
            .zip(inverts_per_stage)
            .map(|((status, pid), inverts)| {
                pids.extend(pid);
                inverts
                    .iter()
                    .rev()
                    .fold(status, |status, invert| invert.apply(status))
            })
            .collect();

        // Background jobs holding a pipe open keep these waiting, and their
        // groups registered, until they exit or the test is killed
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        for pid in pids {
            ctx.tracker.release(pid);
        }
        (pipeline_status(&statuses, ctx.pipefail), stdout, stderr)
    }
}

#[async_trait]
impl ScriptExecutor for InternalShell {
    fn name(&self) -> &'static str {
        "internal"
    }

    async fn run(&self, script: &str, ctx: &mut ExecContext) -> Result<ExecutionResult> {
        let parsed = parser::parse(script)?;
        let mut result = ExecutionResult::default();
        let mut last = Status::SUCCESS;

        for (connector, pipeline) in &parsed.items {
            let should_run = match connector {
                Connector::Always => true,
                Connector::And => last.success(),
                Connector::Or => !last.success(),
            };
            if !should_run {
                tracing::trace!("Skipping '{}' after status {}", pipeline, last.code);
                continue;
            }

            tracing::debug!("$ {}", pipeline);
            let (status, stdout, stderr) = self.run_pipeline(pipeline, ctx).await;
            let stdout = String::from_utf8_lossy(&stdout);
            let stderr = String::from_utf8_lossy(&stderr);

            result.transcript.push_str(&format!("$ {}\n", pipeline));
            append_block(&mut result.transcript, "command stdout", &stdout);
            append_block(&mut result.transcript, "command stderr", &stderr);
            if !status.success() {
                let reason = match status.signal {
                    Some(signal) => format!("killed by signal {}", signal),
                    None => format!("exit status {}", status.code),
                };
                result
                    .transcript
                    .push_str(&format!("# command failed with {}\n", reason));
            }

            result.stdout.push_str(&stdout);
            result.stderr.push_str(&stderr);
            last = status;
        }

        result.exit_code = last.code;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn ctx(dir: &Path) -> ExecContext {
        ExecContext::new(dir.to_path_buf(), BTreeMap::new())
    }

    async fn run(script: &str, ctx: &mut ExecContext) -> ExecutionResult {
        InternalShell.run(script, ctx).await.unwrap()
    }

    #[test]
    fn test_strip_not() {
        let args: Vec<String> = ["not", "not", "--crash", "cmd", "x"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (inverts, rest) = strip_not(&args);
        assert_eq!(inverts, vec![Invert::Not, Invert::Crash]);
        assert_eq!(rest, &args[3..]);
    }

    #[test]
    fn test_pipeline_status_pipefail() {
        let statuses = [Status::from_code(3), Status::SUCCESS];
        assert_eq!(pipeline_status(&statuses, true).code, 3);
        assert_eq!(pipeline_status(&statuses, false).code, 0);
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());

        let r = run("false && echo X", &mut c).await;
        assert!(!r.stdout.contains('X'));
        assert_eq!(r.exit_code, 1);

        let r = run("true || echo X", &mut c).await;
        assert!(!r.stdout.contains('X'));
        assert_eq!(r.exit_code, 0);

        let r = run("false || echo Y && echo Z", &mut c).await;
        assert_eq!(r.stdout, "Y\nZ\n");

        let r = run("false ; echo after", &mut c).await;
        assert_eq!(r.stdout, "after\n");
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test]
    async fn test_not_builtin() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());
        assert_eq!(run("not false", &mut c).await.exit_code, 0);
        assert_eq!(run("not true", &mut c).await.exit_code, 1);
        assert_eq!(run("not not true", &mut c).await.exit_code, 0);
        assert_eq!(run("not", &mut c).await.exit_code, 2);
    }

    #[tokio::test]
    async fn test_builtin_redirects_and_cd() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mut c = ctx(dir.path());

        run("cd sub ; echo hello > out.txt ; echo more >> out.txt", &mut c).await;
        assert_eq!(c.state.cwd, dir.path().join("sub"));
        let content = std::fs::read_to_string(dir.path().join("sub/out.txt")).unwrap();
        assert_eq!(content, "hello\nmore\n");

        let r = run("echo quiet > /dev/null", &mut c).await;
        assert_eq!(r.stdout, "");
    }

    #[tokio::test]
    async fn test_redirect_failure_fails_command() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());
        let r = run("echo x < missing-input", &mut c).await;
        assert_eq!(r.exit_code, 1);
        assert!(r.stderr.contains("missing-input"));
    }

    #[tokio::test]
    async fn test_missing_program_is_127() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());
        let r = run("definitely-not-a-program-xyz --flag", &mut c).await;
        assert_eq!(r.exit_code, 127);
        assert!(r.stderr.contains("definitely-not-a-program-xyz"));
        assert!(r.transcript.contains("# command failed with exit status 127"));
    }

    #[tokio::test]
    async fn test_parse_error_is_error() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());
        let err = InternalShell.run("echo (", &mut c).await.unwrap_err();
        assert!(matches!(err, crate::common::Error::ScriptParse(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_pipeline_streams_data() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());

        let r = run("echo hello | tr a-z A-Z", &mut c).await;
        assert_eq!(r.stdout, "HELLO\n");
        assert_eq!(r.exit_code, 0);

        let r = run("printf 'b\\na\\n' | sort | head -n 1", &mut c).await;
        assert_eq!(r.stdout, "a\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_merge_into_pipe() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());

        let r = run("sh -c 'echo oops 1>&2' 2>&1 | cat", &mut c).await;
        assert_eq!(r.stdout, "oops\n");
        assert_eq!(r.stderr, "");

        let r = run("sh -c 'echo oops 1>&2'", &mut c).await;
        assert_eq!(r.stdout, "");
        assert_eq!(r.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipefail_and_not_on_external() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());
        assert_eq!(run("sh -c 'exit 3' | cat", &mut c).await.exit_code, 3);
        c.pipefail = false;
        assert_eq!(run("sh -c 'exit 3' | cat", &mut c).await.exit_code, 0);
        assert_eq!(run("not sh -c 'exit 3'", &mut c).await.exit_code, 0);
        assert_eq!(run("not --crash sh -c 'kill -9 $$'", &mut c).await.exit_code, 0);
        assert_eq!(run("not sh -c 'kill -9 $$'", &mut c).await.exit_code, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_and_cwd_reach_children() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());
        let r = run("export GREETING=hi ; sh -c 'echo $GREETING' ; pwd", &mut c).await;
        let canonical = dir.path().canonicalize().unwrap();
        assert!(r.stdout.starts_with("hi\n"));
        assert!(r.stdout.trim_end().ends_with(canonical.file_name().unwrap().to_str().unwrap()));
        assert_eq!(c.tracker.live_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_jobs_are_reaped() {
        let dir = tempdir().unwrap();
        let mut c = ctx(dir.path());
        let pid_file = dir.path().join("bg.pid");
        let script = format!(
            "sh -c 'sleep 30 > /dev/null 2>&1 & echo $! > {}'",
            pid_file.display()
        );

        let r = run(&script, &mut c).await;
        assert_eq!(r.exit_code, 0);
        assert_eq!(c.tracker.live_count(), 0);
        let background: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert!(crate::shell::process::process_gone(background, std::time::Duration::from_secs(5)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_input_redirect() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("in.txt"), "from file\n").unwrap();
        let mut c = ctx(dir.path());
        let r = run("cat < in.txt", &mut c).await;
        assert_eq!(r.stdout, "from file\n");
    }
}
