//! Node daemon process lifecycle.
//!
//! Each daemon is an opaque child process: it learns its repository through
//! one environment variable, and stops on SIGINT. Its output streams are
//! collected in the background so a chatty daemon never blocks on a full pipe.

use crate::{Result, TcnError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_DAEMON_BINARY: &str = "ipfs";
pub const DEFAULT_REPO_ENV: &str = "IPFS_PATH";
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Output retained per stream; older bytes are dropped first.
const MAX_CAPTURED_OUTPUT: usize = 1024 * 1024;

/// How long to wait for the output readers once the process has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSpec {
    pub binary: String,
    pub args: Vec<String>,
    pub repo_env: String,
}

impl Default for DaemonSpec {
    fn default() -> Self {
        Self {
            binary: DEFAULT_DAEMON_BINARY.to_string(),
            args: vec!["daemon".to_string(), "--writable".to_string()],
            repo_env: DEFAULT_REPO_ENV.to_string(),
        }
    }
}

/// Looks `binary` up on `PATH`, or checks it directly when it contains a
/// path separator.
pub fn resolve_binary(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|path| path.is_file())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The daemon exited after the interrupt.
    Exited(ExitStatus),
    /// The daemon outlived the stop timeout and was killed.
    Killed(Option<ExitStatus>),
    /// Waiting on the daemon failed; its state is unknown.
    Lost(String),
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(status) => write!(f, "{}", status),
            ExitOutcome::Killed(Some(status)) => {
                write!(f, "killed after stop timeout ({})", status)
            }
            ExitOutcome::Killed(None) => write!(f, "killed after stop timeout"),
            ExitOutcome::Lost(reason) => write!(f, "unknown ({})", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonExit {
    pub index: usize,
    pub repo_path: PathBuf,
    pub stdout: String,
    pub stderr: String,
    pub outcome: ExitOutcome,
}

#[derive(Clone, Default)]
struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    async fn append(&self, chunk: &[u8]) {
        let mut bytes = self.bytes.lock().await;
        bytes.extend_from_slice(chunk);
        if bytes.len() > MAX_CAPTURED_OUTPUT {
            let excess = bytes.len() - MAX_CAPTURED_OUTPUT;
            bytes.drain(..excess);
        }
    }

    async fn snapshot(&self) -> String {
        let bytes = self.bytes.lock().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

struct StreamCollector {
    buffer: OutputBuffer,
    task: JoinHandle<()>,
}

impl StreamCollector {
    fn spawn<R>(reader: R, index: usize, stream: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = OutputBuffer::default();
        let task = tokio::spawn(collect_stream(reader, buffer.clone(), index, stream));
        Self { buffer, task }
    }

    /// Waits briefly for the stream to reach EOF, then returns what was read.
    async fn finish(mut self) -> String {
        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
        self.buffer.snapshot().await
    }
}

async fn collect_stream<R>(mut reader: R, buffer: OutputBuffer, index: usize, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => buffer.append(&chunk[..read]).await,
            Err(error) => {
                tracing::warn!(node = index, stream, "error reading daemon output: {}", error);
                break;
            }
        }
    }
}

/// A running node daemon.
pub struct DaemonProcess {
    index: usize,
    repo_path: PathBuf,
    child: Child,
    stdout: StreamCollector,
    stderr: StreamCollector,
}

impl DaemonProcess {
    /// Spawns the daemon for node `index`. Must be called inside a tokio runtime.
    pub fn start(index: usize, spec: &DaemonSpec, repo_path: &Path) -> Result<Self> {
        let spawn_failed = |reason: String| TcnError::DaemonSpawnFailed {
            index,
            binary: spec.binary.clone(),
            reason,
        };

        let binary = resolve_binary(&spec.binary)
            .ok_or_else(|| spawn_failed("binary not found".to_string()))?;

        let mut cmd = Command::new(&binary);
        cmd.args(&spec.args)
            .env(&spec.repo_env, repo_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|error| spawn_failed(error.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_failed("stderr was not captured".to_string()))?;

        tracing::info!(
            node = index,
            pid = child.id(),
            repo = %repo_path.display(),
            "started daemon"
        );

        Ok(Self {
            index,
            repo_path: repo_path.to_path_buf(),
            child,
            stdout: StreamCollector::spawn(stdout, index, "stdout"),
            stderr: StreamCollector::spawn(stderr, index, "stderr"),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Output collected on stdout so far.
    pub async fn stdout_snapshot(&self) -> String {
        self.stdout.buffer.snapshot().await
    }

    /// Interrupts the daemon, waits up to `timeout` for it to exit and
    /// escalates to SIGKILL after that. Never fails: problems are reported
    /// through the returned outcome.
    pub async fn stop(mut self, timeout: Duration) -> DaemonExit {
        tracing::debug!(node = self.index, pid = self.pid(), "interrupting daemon");
        if let Err(reason) = send_interrupt(&mut self.child) {
            tracing::warn!(node = self.index, "failed to interrupt daemon: {}", reason);
        }

        let outcome = match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => ExitOutcome::Exited(status),
            Ok(Err(error)) => ExitOutcome::Lost(error.to_string()),
            Err(_) => {
                tracing::warn!(
                    node = self.index,
                    "daemon did not exit within {:?}, killing",
                    timeout
                );
                match self.child.kill().await {
                    Ok(()) => ExitOutcome::Killed(self.child.try_wait().ok().flatten()),
                    Err(error) => ExitOutcome::Lost(error.to_string()),
                }
            }
        };

        let stdout = self.stdout.finish().await;
        let stderr = self.stderr.finish().await;

        tracing::info!(node = self.index, "daemon stopped: {}", outcome);

        DaemonExit {
            index: self.index,
            repo_path: self.repo_path,
            stdout,
            stderr,
            outcome,
        }
    }
}

#[cfg(unix)]
fn send_interrupt(child: &Child) -> std::result::Result<(), String> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(()); // already reaped
    };

    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(error) => Err(error.to_string()),
    }
}

#[cfg(not(unix))]
fn send_interrupt(child: &mut Child) -> std::result::Result<(), String> {
    child.start_kill().map_err(|error| error.to_string())
}

/// Every daemon started for a cluster, in start order.
///
/// Dropping a registry that still holds processes kills them, so an early
/// return never leaves daemons behind; [`DaemonRegistry::stop_all`] is the
/// orderly path.
#[derive(Default)]
pub struct DaemonRegistry {
    processes: Vec<DaemonProcess>,
}

impl DaemonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn processes(&self) -> &[DaemonProcess] {
        &self.processes
    }

    pub fn register(&mut self, process: DaemonProcess) {
        self.processes.push(process);
    }

    /// Starts one daemon per repository, sequentially in index order.
    ///
    /// A spawn failure stops the daemons already started before the error
    /// is returned.
    pub async fn start_all(
        spec: &DaemonSpec,
        repos: &[PathBuf],
        stop_timeout: Duration,
    ) -> Result<Self> {
        if resolve_binary(&spec.binary).is_none() {
            return Err(TcnError::DaemonSpawnFailed {
                index: 0,
                binary: spec.binary.clone(),
                reason: "binary not found".to_string(),
            });
        }

        Self::start_each(repos, stop_timeout, |index, repo| {
            DaemonProcess::start(index, spec, repo)
        })
        .await
    }

    async fn start_each<F>(repos: &[PathBuf], stop_timeout: Duration, mut start: F) -> Result<Self>
    where
        F: FnMut(usize, &Path) -> Result<DaemonProcess>,
    {
        let mut registry = Self::new();
        for (index, repo) in repos.iter().enumerate() {
            match start(index, repo.as_path()) {
                Ok(process) => registry.register(process),
                Err(error) => {
                    tracing::error!("aborting cluster start: {}", error);
                    for exit in registry.stop_all(stop_timeout).await {
                        tracing::warn!(
                            node = exit.index,
                            stdout = %exit.stdout,
                            stderr = %exit.stderr,
                            "daemon stopped after aborted start: {}",
                            exit.outcome
                        );
                    }
                    return Err(error);
                }
            }
        }

        Ok(registry)
    }

    /// Stops every daemon, last started first. A daemon that fails to stop
    /// cleanly does not prevent the others from being stopped.
    pub async fn stop_all(&mut self, timeout: Duration) -> Vec<DaemonExit> {
        let mut exits = Vec::with_capacity(self.processes.len());
        while let Some(process) = self.processes.pop() {
            exits.push(process.stop(timeout).await);
        }
        exits.reverse();
        exits
    }
}

impl Drop for DaemonRegistry {
    fn drop(&mut self) {
        if !self.processes.is_empty() {
            tracing::warn!(
                "dropping {} running daemons without an orderly stop",
                self.processes.len()
            );
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell_spec(script: &str) -> DaemonSpec {
        DaemonSpec {
            binary: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            repo_env: DEFAULT_REPO_ENV.to_string(),
        }
    }

    async fn wait_for_output(process: &DaemonProcess, needle: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if process.stdout_snapshot().await.contains(needle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("daemon never printed {:?}", needle);
    }

    #[test]
    fn resolves_binaries() {
        assert_eq!(resolve_binary("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert!(resolve_binary("sh").is_some());
        assert!(resolve_binary("tcn-definitely-missing-daemon").is_none());
        assert!(resolve_binary("/nonexistent/daemon").is_none());
    }

    #[tokio::test]
    async fn interrupt_stops_daemon_and_drains_output() {
        let spec = shell_spec(
            "trap 'echo stopping; exit 0' INT; echo ready $IPFS_PATH; echo warn >&2; \
             while :; do sleep 0.1; done",
        );
        let dir = tempfile::tempdir().unwrap();
        let process = DaemonProcess::start(0, &spec, dir.path()).unwrap();
        wait_for_output(&process, "ready").await;

        let exit = process.stop(Duration::from_secs(5)).await;
        assert_eq!(exit.index, 0);
        assert!(matches!(exit.outcome, ExitOutcome::Exited(status) if status.success()));
        assert!(exit.stdout.contains(&format!("ready {}", dir.path().display())));
        assert!(exit.stdout.contains("stopping"));
        assert!(exit.stderr.contains("warn"));
    }

    #[tokio::test]
    async fn unresponsive_daemon_is_killed_after_timeout() {
        let spec = shell_spec("trap '' INT; echo ready; while :; do sleep 0.1; done");
        let dir = tempfile::tempdir().unwrap();
        let process = DaemonProcess::start(3, &spec, dir.path()).unwrap();
        wait_for_output(&process, "ready").await;

        let exit = process.stop(Duration::from_millis(300)).await;
        assert_eq!(exit.index, 3);
        assert!(matches!(exit.outcome, ExitOutcome::Killed(_)), "{}", exit.outcome);
        assert!(exit.stdout.contains("ready"));
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let spec = DaemonSpec {
            binary: "tcn-definitely-missing-daemon".to_string(),
            ..DaemonSpec::default()
        };
        let dir = tempfile::tempdir().unwrap();

        let error = DaemonProcess::start(2, &spec, dir.path()).err().unwrap();
        assert!(matches!(error, TcnError::DaemonSpawnFailed { index: 2, .. }));

        let repos = vec![dir.path().to_path_buf()];
        let error = DaemonRegistry::start_all(&spec, &repos, DEFAULT_STOP_TIMEOUT)
            .await
            .err()
            .unwrap();
        assert!(matches!(error, TcnError::DaemonSpawnFailed { .. }));
    }

    #[tokio::test]
    async fn failed_start_stops_already_started_daemons() {
        use nix::errno::Errno;
        use nix::sys::signal;
        use nix::unistd::Pid;

        let spec = shell_spec("echo ready; exec sleep 30");
        let dir = tempfile::tempdir().unwrap();
        let repos: Vec<PathBuf> = (0..3).map(|index| dir.path().join(index.to_string())).collect();

        let mut pids = Vec::new();
        let error = DaemonRegistry::start_each(&repos, Duration::from_secs(5), |index, repo| {
            if index == 2 {
                return Err(TcnError::DaemonSpawnFailed {
                    index,
                    binary: spec.binary.clone(),
                    reason: "refused".to_string(),
                });
            }
            let process = DaemonProcess::start(index, &spec, repo)?;
            pids.extend(process.pid());
            Ok(process)
        })
        .await
        .err()
        .unwrap();

        assert!(matches!(error, TcnError::DaemonSpawnFailed { index: 2, .. }));
        assert_eq!(pids.len(), 2);
        for pid in pids {
            // reaped by the rollback, so the pid no longer exists
            assert_eq!(
                signal::kill(Pid::from_raw(pid as i32), None),
                Err(Errno::ESRCH)
            );
        }
    }

    #[tokio::test]
    async fn registry_stops_every_daemon() {
        let spec = shell_spec("echo node $IPFS_PATH; exec sleep 30");
        let dir = tempfile::tempdir().unwrap();
        let repos: Vec<PathBuf> = (0..3).map(|index| dir.path().join(index.to_string())).collect();

        let mut registry = DaemonRegistry::start_all(&spec, &repos, DEFAULT_STOP_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(registry.len(), 3);
        for process in registry.processes() {
            wait_for_output(process, "node").await;
        }

        let exits = registry.stop_all(Duration::from_secs(5)).await;
        assert!(registry.is_empty());
        assert_eq!(exits.len(), 3);

        for (index, exit) in exits.iter().enumerate() {
            assert_eq!(exit.index, index);
            assert_eq!(exit.repo_path, repos[index]);
            assert!(matches!(exit.outcome, ExitOutcome::Exited(_)), "{}", exit.outcome);
            assert!(exit.stdout.contains(&repos[index].display().to_string()));
        }
    }
}
