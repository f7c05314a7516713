//! Allowlist-gated command execution.
//!
//! The allowlist is the trust boundary: a command that matches an entry
//! verbatim is handed to the shell as-is, so whoever writes the allowlist
//! is responsible for any shell syntax inside it. Nothing here tokenizes
//! or sanitizes `cmd`.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::allowlist::Allowlist;

/// Outcome of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("no cmd provided")]
    Empty,

    #[error("DENIED: {0} not in allowlist")]
    Denied(String),

    #[error("command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes commands that appear in the allowlist file.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    allowlist_path: PathBuf,
    shell: String,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(allowlist_path: PathBuf, shell: String, timeout: Duration) -> Self {
        Self {
            allowlist_path,
            shell,
            timeout,
        }
    }

    /// Fresh snapshot of the allowlist.
    pub async fn allowlist(&self) -> Result<Allowlist, ExecError> {
        Ok(Allowlist::load(&self.allowlist_path).await?)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `cmd` if and only if it is an exact allowlist entry.
    pub async fn execute(&self, cmd: &str) -> Result<ExecutionResult, ExecError> {
        if cmd.is_empty() {
            return Err(ExecError::Empty);
        }

        let allowlist = self.allowlist().await?;
        if !allowlist.contains(cmd) {
            if allowlist.is_empty() {
                tracing::warn!(command = %cmd, "Denied command, allowlist is empty");
            } else {
                tracing::warn!(command = %cmd, "Denied command not in allowlist");
            }
            return Err(ExecError::Denied(cmd.to_string()));
        }

        match run_shell(&self.shell, cmd, self.timeout).await {
            Ok(result) => {
                tracing::info!(command = %cmd, returncode = result.returncode, "Command finished");
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(command = %cmd, error = %e, "Command failed");
                Err(e)
            }
        }
    }
}

/// Run `script` through `<shell> -c` with a wall-clock limit.
///
/// The child leads its own process group. On timeout the whole group is
/// killed and reaped before returning, and any output read so far is
/// discarded.
pub async fn run_shell(
    shell: &str,
    script: &str,
    timeout: Duration,
) -> Result<ExecutionResult, ExecError> {
    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let pid = child.id();
    // Kills the group if this future is dropped before the child is reaped.
    let mut group = ProcessGroupGuard::new(pid);
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let completed = tokio::time::timeout(timeout, async {
        let (status, out, err) =
            tokio::join!(child.wait(), read_stream(stdout), read_stream(stderr));
        Ok::<_, std::io::Error>((status?, out?, err?))
    })
    .await;

    match completed {
        Ok(Ok((status, stdout, stderr))) => {
            group.disarm();
            Ok(ExecutionResult {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                returncode: exit_code(status),
            })
        }
        Ok(Err(e)) => Err(ExecError::Io(e)),
        Err(_elapsed) => {
            group.kill();
            if let Err(e) = child.start_kill() {
                tracing::debug!("Child already gone after group kill: {}", e);
            }
            // Reap so the shell does not linger as a zombie.
            child.wait().await?;
            group.disarm();
            Err(ExecError::Timeout(timeout))
        }
    }
}

/// Owns the child's process group until the child has been reaped.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn kill(&self) {
        if let Some(pid) = self.pid {
            kill_process_group(pid);
        }
    }

    /// The leader is reaped; its pid may be reused from here on.
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Exit code, or the negated signal number when killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // SAFETY: kill(2) with a negative pid only signals the process group.
    let rc = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            "killpg({}) failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn executor_with(dir: &tempfile::TempDir, allowlist: &str, timeout: Duration) -> CommandExecutor {
        let path = dir.path().join("allowed_cmds.txt");
        std::fs::write(&path, allowlist).unwrap();
        CommandExecutor::new(path, "/bin/sh".to_string(), timeout)
    }

    #[tokio::test]
    async fn test_allowlisted_command_runs() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_with(&dir, "echo hello\n", Duration::from_secs(10));

        let result = executor.execute("echo hello").await.unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "");
        assert_eq!(result.returncode, 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_with(&dir, "echo oops >&2; exit 3\n", Duration::from_secs(10));

        let result = executor.execute("echo oops >&2; exit 3").await.unwrap();
        assert_eq!(result.stdout, "");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.returncode, 3);
    }

    #[tokio::test]
    async fn test_denied_command_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let executor = executor_with(&dir, "uptime\n", Duration::from_secs(10));

        let cmd = format!("touch {}", marker.display());
        let err = executor.execute(&cmd).await.unwrap_err();
        assert!(matches!(err, ExecError::Denied(ref c) if c == &cmd));
        assert_eq!(err.to_string(), format!("DENIED: {} not in allowlist", cmd));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_prefix_of_entry_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_with(&dir, "df -h\n", Duration::from_secs(10));

        assert!(matches!(executor.execute("df").await, Err(ExecError::Denied(_))));
        assert!(matches!(
            executor.execute("df -h; id").await,
            Err(ExecError::Denied(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_allowlist_denies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let executor = CommandExecutor::new(
            dir.path().join("missing.txt"),
            "/bin/sh".to_string(),
            Duration::from_secs(10),
        );
        assert!(matches!(executor.execute("uptime").await, Err(ExecError::Denied(_))));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_with(&dir, "\n", Duration::from_secs(10));
        assert!(matches!(executor.execute("").await, Err(ExecError::Empty)));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let cmd = format!("echo $$ > {}; sleep 30", pid_file.display());
        let executor = executor_with(&dir, &format!("{}\n", cmd), Duration::from_secs(1));

        let started = Instant::now();
        let err = executor.execute(&cmd).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive, "shell {} still running after timeout", pid);
    }

    /// True once `pid` has exited (gone from /proc or left as a zombie).
    async fn wait_until_dead(pid: i32) -> bool {
        for _ in 0..50 {
            match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Err(_) => return true,
                Ok(stat) => {
                    let state = stat
                        .rsplit_once(')')
                        .and_then(|(_, rest)| rest.trim_start().chars().next());
                    if state == Some('Z') {
                        return true;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    fn read_pid(path: &std::path::Path) -> i32 {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    #[tokio::test]
    async fn test_timeout_kills_background_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let err = run_shell("/bin/sh", &script, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));

        let bg = read_pid(&pid_file);
        assert!(wait_until_dead(bg).await, "background job {} survived timeout", bg);
    }

    #[tokio::test]
    async fn test_dropped_run_kills_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let cancelled = tokio::time::timeout(
            Duration::from_millis(500),
            run_shell("/bin/sh", &script, Duration::from_secs(60)),
        )
        .await;
        assert!(cancelled.is_err());

        let bg = read_pid(&pid_file);
        assert!(wait_until_dead(bg).await, "background job {} survived drop", bg);
    }

    #[test]
    fn test_exit_code_from_signal() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code(ExitStatus::from_raw(9)), -9);
        assert_eq!(exit_code(ExitStatus::from_raw(2 << 8)), 2);
    }
}
