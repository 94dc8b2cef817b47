//! Subprocess execution for verification checks.
//!
//! On unix every check leads its own process group. A check that times out,
//! or whose future is dropped, takes its whole group down with it, so tools
//! spawned by `npx` or `npm run` never outlive the verification phase.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};
use treemend_core::domain::CheckSpec;

/// Raw result of running one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckExecution {
    /// Check name.
    pub name: String,

    /// Exit code; `None` when the process never exited normally.
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Killed after exceeding its timeout.
    pub timed_out: bool,

    /// The process could not be started or awaited.
    pub spawn_error: Option<String>,
}

impl CheckExecution {
    fn failed_to_run(name: &str, start: Instant, error: String) -> Self {
        Self {
            name: name.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: false,
            spawn_error: Some(error),
        }
    }
}

/// Kills a check's process group when dropped while armed.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    /// The leader exited on its own; leave the group alone.
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "failed to kill check process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Runs a single check as an isolated child process.
pub struct CheckRunner;

impl CheckRunner {
    /// Directory the check runs in.
    pub fn working_dir(spec: &CheckSpec, root: &Path) -> PathBuf {
        match &spec.working_dir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        }
    }

    /// Execute `spec` under `root`. Never fails; problems are reported in
    /// the returned [`CheckExecution`].
    ///
    /// The child and everything it spawned are killed if it outlives its
    /// timeout or if the returned future is dropped.
    pub async fn execute(spec: &CheckSpec, root: &Path) -> CheckExecution {
        let start = Instant::now();

        let Some((exe, args)) = spec.command.split_first() else {
            return CheckExecution::failed_to_run(&spec.name, start, "empty command".to_string());
        };
        let cwd = Self::working_dir(spec, root);
        debug!(check = %spec.name, exe = %exe, cwd = %cwd.display(), "spawning check");

        let mut command = Command::new(exe);
        command
            .args(args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return CheckExecution::failed_to_run(&spec.name, start, e.to_string()),
        };
        let mut group = GroupGuard::new(child.id());

        let waited = tokio::time::timeout(
            Duration::from_secs(spec.timeout_secs),
            child.wait_with_output(),
        )
        .await;

        if matches!(waited, Ok(Ok(_))) {
            group.disarm();
        }

        match waited {
            Err(_elapsed) => CheckExecution {
                name: spec.name.clone(),
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: true,
                spawn_error: None,
            },
            Ok(Err(e)) => CheckExecution::failed_to_run(&spec.name, start, e.to_string()),
            Ok(Ok(output)) => CheckExecution {
                name: spec.name.clone(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: false,
                spawn_error: None,
            },
        }
    }
}
