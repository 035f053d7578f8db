//! Subprocess bookkeeping
//!
//! Every child a test spawns is started in its own process group (Unix)
//! and registered here, so a timeout or interrupt can kill whole process
//! trees rather than just the direct children.

use std::collections::HashSet;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};

/// Exit status of a command, built-in or external
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub code: i32,
    /// Signal that terminated the process, if any
    pub signal: Option<i32>,
}

impl Status {
    pub const SUCCESS: Status = Status {
        code: 0,
        signal: None,
    };
    pub const FAILURE: Status = Status {
        code: 1,
        signal: None,
    };

    pub fn from_code(code: i32) -> Self {
        Self { code, signal: None }
    }

    pub fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

impl From<ExitStatus> for Status {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Status {
                    code: 128 + signal,
                    signal: Some(signal),
                };
            }
        }
        Status::from_code(status.code().unwrap_or(1))
    }
}

/// Tracks live child process groups of one test
#[derive(Debug, Clone, Default)]
pub struct ProcessTracker {
    live: Arc<Mutex<HashSet<u32>>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32) {
        if let Ok(mut live) = self.live.lock() {
            live.insert(pid);
        }
    }

    pub fn unregister(&self, pid: u32) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&pid);
        }
    }

    /// Number of children spawned and not yet reaped
    pub fn live_count(&self) -> usize {
        self.live.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Kill every registered process group
    ///
    /// Returns how many groups were signalled.
    pub fn kill_all(&self) -> usize {
        let pids: Vec<u32> = match self.live.lock() {
            Ok(mut live) => live.drain().collect(),
            Err(_) => return 0,
        };

        for pid in &pids {
            tracing::debug!("Killing process group {}", pid);
            kill_group(*pid);
        }

        // Elsewhere kill_on_drop on each child handles termination
        pids.len()
    }

    /// Kill what is left of a finished command's group and forget it
    ///
    /// Called once the command's output is drained, so background jobs it
    /// left behind do not outlive the test.
    pub fn release(&self, pid: u32) {
        kill_group(pid);
        self.unregister(pid);
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // The child was started with process_group(0), so its pid is the pgid
    let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if result != 0 {
        tracing::trace!(
            "killpg({}) failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Wait up to `within` for `pid` to stop existing
#[cfg(all(test, unix))]
pub(crate) async fn process_gone(pid: u32, within: std::time::Duration) -> bool {
    let started = std::time::Instant::now();
    loop {
        let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
        // A killed orphan stays a zombie until init reaps it
        if !alive || is_zombie(pid) {
            return true;
        }
        if started.elapsed() > within {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[cfg(all(test, unix))]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let (_, rest) = stat.rsplit_once(')')?;
            rest.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}
