//! Bounded-time supervision of one wrapper process.
//!
//! The wrapper is spawned as its own process group leader so the whole
//! subtree it creates (npx, node, shims) can be torn down as a unit. A
//! correctly behaving wrapper does not exit: it sits listening on stdio
//! until the timeout fires, which is the healthy steady state here.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

/// Environment overrides applied to every spawn to suppress incidental
/// noise from common child tooling (npm/npx logging, color codes, update
/// and funding nags). Mitigation only; the classifier still has to cope
/// with whatever slips through.
pub const NOISE_SUPPRESSION_ENV: &[(&str, &str)] = &[
    ("NO_COLOR", "1"),
    ("NPM_CONFIG_LOGLEVEL", "silent"),
    ("npm_config_loglevel", "silent"),
    ("NPM_CONFIG_FUND", "false"),
    ("NPM_CONFIG_AUDIT", "false"),
    ("NO_UPDATE_NOTIFIER", "1"),
    ("ADBLOCK", "1"),
];

/// How long, after signalling the group, buffered output may still drain.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Result of executing one wrapper.
#[derive(Debug)]
pub struct RunOutcome {
    /// `Some(code)` when the process exited on its own within the budget;
    /// `None` when it was still running at the deadline and the group was
    /// terminated. A child killed by signal `N` within the budget maps to
    /// `Some(-N)`.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    pub fn timed_out(&self) -> bool {
        self.exit_code.is_none()
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for {path}: {source}")]
    Wait {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run `program` with `cwd` as working directory, capturing stdout and
/// stderr until it exits or `timeout` elapses. On timeout the entire
/// process group is SIGTERMed, given a 2-second grace to drain, then
/// SIGKILLed; no descendant survives the call.
pub async fn run_with_timeout(
    program: &Path,
    cwd: &Path,
    timeout: Duration,
) -> Result<RunOutcome, RunnerError> {
    let mut cmd = Command::new(program);
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    for (key, value) in NOISE_SUPPRESSION_ENV {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
        path: program.to_path_buf(),
        source,
    })?;
    let pid = child.id();
    debug!(path = %program.display(), ?pid, "spawned wrapper");

    // Readers run independently of the wait so a chatty wrapper cannot
    // deadlock on a full pipe buffer.
    let stdout_task = spawn_reader(child.stdout.take());
    let stderr_task = spawn_reader(child.stderr.take());

    let exit_code = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status.map_err(|source| RunnerError::Wait {
                path: program.to_path_buf(),
                source,
            })?;
            Some(exit_code_of(status))
        }
        Err(_) => {
            debug!(path = %program.display(), "budget elapsed, terminating process group");
            signal_group(pid, GroupSignal::Term);
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
                signal_group(pid, GroupSignal::Kill);
                let _ = child.wait().await;
            }
            None
        }
    };

    let stdout = collect_output(stdout_task, pid).await;
    let stderr = collect_output(stderr_task, pid).await;

    Ok(RunOutcome {
        exit_code,
        stdout,
        stderr,
    })
}

fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    })
}

/// Join a reader task, bounded so a grandchild that kept the pipe open
/// past the wrapper's exit cannot hang the harness. If the first window
/// expires the whole group is SIGKILLed and the reader gets one short
/// final chance to hit EOF.
async fn collect_output(task: Option<JoinHandle<Vec<u8>>>, pid: Option<u32>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };

    match tokio::time::timeout(KILL_GRACE, &mut task).await {
        Ok(joined) => text_of(joined),
        Err(_) => {
            signal_group(pid, GroupSignal::Kill);
            match tokio::time::timeout(Duration::from_millis(500), &mut task).await {
                Ok(joined) => text_of(joined),
                Err(_) => {
                    task.abort();
                    String::new()
                }
            }
        }
    }
}

fn text_of(joined: Result<Vec<u8>, tokio::task::JoinError>) -> String {
    match joined {
        Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => String::new(),
    }
}

enum GroupSignal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let signal = match signal {
        GroupSignal::Term => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    // The child is its own group leader (process_group(0)), so its pid is
    // the pgid. ESRCH just means the group is already gone.
    if let Err(err) = killpg(Pid::from_raw(pid as i32), signal) {
        debug!(pid, %err, "process group signal not delivered");
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: GroupSignal) {
    // kill_on_drop covers the direct child on non-unix targets.
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "ok.sh", "echo hello\necho oops >&2\nexit 3");

        let outcome = run_with_timeout(&path, dir.path(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout, "hello\n");
        assert_eq!(outcome.stderr, "oops\n");
        assert!(!outcome.timed_out());
    }

    #[tokio::test]
    async fn timeout_kills_the_group_and_reports_absent_exit() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "hang.sh", "echo before\nsleep 60");

        let started = Instant::now();
        let outcome = run_with_timeout(&path, dir.path(), Duration::from_millis(300))
            .await
            .unwrap();

        assert!(outcome.timed_out());
        assert_eq!(outcome.stdout, "before\n");
        // Budget plus grace, with slack; nowhere near the 60s sleep.
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn timeout_reaps_spawned_children_too() {
        let dir = TempDir::new().unwrap();
        // A background grandchild inherits the pipe; the group kill must
        // close it or the harness would hang draining stdout.
        let path = script(&dir, "forker.sh", "sleep 60 &\nsleep 60");

        let started = Instant::now();
        let outcome = run_with_timeout(&path, dir.path(), Duration::from_millis(300))
            .await
            .unwrap();

        assert!(outcome.timed_out());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn spawn_failure_is_a_distinct_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-executable.sh");
        std::fs::write(&path, "#!/bin/sh\necho hi\n").unwrap(); // mode 644

        let err = run_with_timeout(&path, dir.path(), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn noise_suppression_env_is_applied() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "env.sh", "printf '%s' \"$NO_COLOR/$NPM_CONFIG_FUND\"");

        let outcome = run_with_timeout(&path, dir.path(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.stdout, "1/false");
    }
}
