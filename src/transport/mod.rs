//! Transport layer: a connection abstraction that serializes
//! concurrent callers, retries transient failures, detects broken
//! sessions and transparently reconnects (§4.1).

pub mod adb;
pub mod ssh;

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::fs::RemoteFs;

/// The raw per-transport contract. Two concrete implementations
/// ([`ssh::SshTransport`], [`adb::AdbTransport`]) share it but differ
/// in their failure modes and liveness probe.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
    async fn is_connected(&self) -> bool;

    /// A single attempt at running `cmd`, no retry logic. Returns the
    /// combined stdout+stderr, zero bytes stripped.
    async fn run_command_once(&self, cmd: &str, timeout: Duration) -> Result<String, AttemptError>;

    /// Transport-specific liveness probe (§4.1.1).
    async fn probe_alive(&self) -> bool;

    /// A single attempt at copying `remote` to `local`.
    async fn pull_file_once(&self, remote: &str, local: &Path) -> Result<(), AttemptError>;

    /// A single attempt at copying `local` to `remote`.
    async fn push_file_once(&self, local: &Path, remote: &str) -> Result<(), AttemptError>;

    /// A human-readable host identifier, for log lines and errors.
    fn host_label(&self) -> String;
}

/// The outcome of a single, unretried attempt, classified the way the
/// retry state machine in §4.1 needs to treat it.
#[derive(Debug)]
pub enum AttemptError {
    /// Authentication or argument failure: fail immediately, never
    /// retried.
    Fatal(TransportError),
    /// The attempt exceeded its timeout: counted and retried.
    Timeout,
    /// Any other I/O error: triggers a liveness probe before deciding
    /// whether to reconnect and retry.
    Io(TransportError),
    /// A file-integrity error from the transfer sub-protocol: fatal
    /// for this call, never retried.
    Integrity(TransportError),
}

/// Runs `attempt` up to `retries + 1` times following the retry/
/// recovery state machine in §4.1. `probe` and `reconnect` are
/// supplied by the caller since they are transport-specific.
pub async fn run_with_retry<T, Attempt, AttemptFut, Probe, ProbeFut, Reconnect, ReconnectFut>(
    command: &str,
    retries: u32,
    mut attempt: Attempt,
    mut probe: Probe,
    mut reconnect: Reconnect,
) -> Result<T, TransportError>
where
    Attempt: FnMut() -> AttemptFut,
    AttemptFut: Future<Output = Result<T, AttemptError>>,
    Probe: FnMut() -> ProbeFut,
    ProbeFut: Future<Output = bool>,
    Reconnect: FnMut() -> ReconnectFut,
    ReconnectFut: Future<Output = Result<(), TransportError>>,
{
    let total_attempts = retries + 1;
    let mut last_error = String::new();

    for attempt_no in 1..=total_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Integrity(e)) => return Err(e),
            Err(AttemptError::Timeout) => {
                warn!(command, attempt_no, total_attempts, "command timed out, retrying");
                last_error = format!("timeout on attempt {attempt_no}/{total_attempts}");
            }
            Err(AttemptError::Io(e)) => {
                warn!(command, attempt_no, error = %e, "i/o error, probing session liveness");
                last_error = e.to_string();
                if !probe().await {
                    debug!(command, "session reported dead, reconnecting");
                    reconnect().await?;
                }
            }
        }
    }
    Err(TransportError::RetriesExhausted {
        command: command.to_string(),
        attempts: total_attempts,
        last_error,
    })
}

/// A registered remote path to remove on scope exit, with optional
/// `rm`-style flags (e.g. `-r`, `-f`).
#[derive(Debug, Clone)]
pub struct CleanupEntry {
    pub path: String,
    pub flags: Vec<String>,
}

/// Wraps a raw [`Transport`] with the single exclusive session lock,
/// the cleanup registry, and argument-validated file transfer. Every
/// public operation acquires the lock for its whole duration (§4.1
/// "Serialization").
pub struct Session<T: Transport> {
    inner: T,
    lock: tokio::sync::Mutex<()>,
    cleanup: Mutex<VecDeque<CleanupEntry>>,
    default_timeout: Duration,
    default_retries: u32,
}

impl<T: Transport> Session<T> {
    pub fn new(inner: T, default_timeout: Duration, default_retries: u32) -> Self {
        Self {
            inner,
            lock: tokio::sync::Mutex::new(()),
            cleanup: Mutex::new(VecDeque::new()),
            default_timeout,
            default_retries,
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.lock.try_lock().is_err() {
            warn!(host = %self.inner.host_label(), "transport lock already held, connect() will wait");
        }
        let _guard = self.lock.lock().await;
        self.inner.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        let _guard = self.lock.lock().await;
        self.inner.disconnect().await
    }

    pub async fn connected(&self) -> bool {
        self.inner.is_connected().await
    }

    /// Runs `cmd`, following the retry/recovery state machine. If
    /// `log_path` is given, appends `Command: / Timestamp: / <output>`
    /// to it.
    pub async fn run_command(
        &self,
        cmd: &str,
        retries: Option<u32>,
        timeout: Option<Duration>,
        log_path: Option<&Path>,
    ) -> Result<String, TransportError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        if timeout.is_zero() {
            return Err(TransportError::ArgumentInvalid {
                operation: "run_command".into(),
                reason: "timeout must be nonzero".into(),
            });
        }
        let retries = retries.unwrap_or(self.default_retries);

        let _guard = self.lock.lock().await;
        let output = run_with_retry(
            cmd,
            retries,
            || self.inner.run_command_once(cmd, timeout),
            || self.inner.probe_alive(),
            || async {
                self.inner.disconnect().await.ok();
                self.inner.connect().await
            },
        )
        .await?;

        if let Some(path) = log_path {
            append_log(path, cmd, &output).await.ok();
        }
        Ok(output)
    }

    /// Registers a remote path for removal on scope exit.
    pub fn add_cleanup(&self, path: impl Into<String>, flags: Vec<String>) {
        self.cleanup.lock().push_back(CleanupEntry {
            path: path.into(),
            flags,
        });
    }

    /// Removes every registered path, in insertion order, via the
    /// transport's `rm`. Errors for individual entries are logged and
    /// do not stop the sweep.
    async fn run_cleanup(&self) {
        let entries: Vec<CleanupEntry> = self.cleanup.lock().drain(..).collect();
        for entry in entries {
            let flags = entry.flags.join(" ");
            let cmd = format!("rm {flags} {}", entry.path).replace("  ", " ");
            if let Err(e) = self
                .run_command(&cmd, Some(0), Some(self.default_timeout), None)
                .await
            {
                warn!(path = %entry.path, error = %e, "cleanup failed");
            }
        }
    }

    /// Entry/exit scoping: connects, runs `body`, then runs cleanup
    /// (unless `body` failed with a `TransportError`, in which case
    /// diagnostics are left in place) and disconnects.
    pub async fn scoped<R, F, Fut>(&self, body: F) -> Result<R, TransportError>
    where
        F: FnOnce(&Self) -> Fut,
        Fut: Future<Output = Result<R, TransportError>>,
    {
        self.connect().await?;
        let result = body(self).await;
        if result.is_ok() {
            self.run_cleanup().await;
        } else {
            debug!("scope exiting on transport error, skipping cleanup to preserve diagnostics");
        }
        self.disconnect().await.ok();
        result
    }

    pub async fn pull_file(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
        let fs = RemoteFs::new(self, "/tmp".into());
        let effective_local = validate_pull_args(&fs, remote, local).await?;
        let _guard = self.lock.lock().await;
        run_with_retry(
            &format!("pull {remote} -> {}", effective_local.display()),
            self.default_retries,
            || self.inner.pull_file_once(remote, &effective_local),
            || self.inner.probe_alive(),
            || async {
                self.inner.disconnect().await.ok();
                self.inner.connect().await
            },
        )
        .await
    }

    pub async fn push_file(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let fs = RemoteFs::new(self, "/tmp".into());
        let effective_remote = validate_push_args(&fs, local, remote).await?;
        let _guard = self.lock.lock().await;
        run_with_retry(
            &format!("push {} -> {effective_remote}", local.display()),
            self.default_retries,
            || self.inner.push_file_once(local, &effective_remote),
            || self.inner.probe_alive(),
            || async {
                self.inner.disconnect().await.ok();
                self.inner.connect().await
            },
        )
        .await
    }
}

/// Validates a pull's arguments before any byte is transferred (§4.1
/// "Argument validation for file transfer"): `remote` is the source,
/// `local` the destination.
async fn validate_pull_args<T: Transport>(
    fs: &RemoteFs<'_, T>,
    remote: &str,
    local: &Path,
) -> Result<PathBuf, TransportError> {
    if fs.is_directory(remote).await? {
        return Err(TransportError::ArgumentInvalid {
            operation: "pull_file".into(),
            reason: format!("{remote} is a directory, not a regular file"),
        });
    }
    if !fs.exists(remote).await? || !fs.is_file(remote).await? {
        return Err(TransportError::ArgumentInvalid {
            operation: "pull_file".into(),
            reason: format!("{remote} does not exist or is not a regular file"),
        });
    }
    if !fs.has_read_permissions(remote).await? {
        return Err(TransportError::ArgumentInvalid {
            operation: "pull_file".into(),
            reason: format!("{remote} is not readable"),
        });
    }

    let effective_local = if local.is_dir() {
        local.join(basename(remote))
    } else {
        local.to_path_buf()
    };
    if !effective_local.exists() {
        let parent = effective_local.parent().unwrap_or(Path::new("."));
        if !parent.exists() {
            return Err(TransportError::ArgumentInvalid {
                operation: "pull_file".into(),
                reason: format!("parent of {} does not exist", effective_local.display()),
            });
        }
    } else if effective_local.metadata().map(|m| m.permissions().readonly()).unwrap_or(false) {
        return Err(TransportError::ArgumentInvalid {
            operation: "pull_file".into(),
            reason: format!("{} is not writable", effective_local.display()),
        });
    }
    Ok(effective_local)
}

/// Mirrors [`validate_pull_args`] with local/remote roles swapped.
async fn validate_push_args<T: Transport>(
    fs: &RemoteFs<'_, T>,
    local: &Path,
    remote: &str,
) -> Result<String, TransportError> {
    if local.is_dir() {
        return Err(TransportError::ArgumentInvalid {
            operation: "push_file".into(),
            reason: format!("{} is a directory, not a regular file", local.display()),
        });
    }
    if !local.exists() || !local.is_file() {
        return Err(TransportError::ArgumentInvalid {
            operation: "push_file".into(),
            reason: format!("{} does not exist or is not a regular file", local.display()),
        });
    }

    let effective_remote = if fs.is_directory(remote).await? {
        format!("{}/{}", remote.trim_end_matches('/'), basename_str(remote_or_local_name(local)))
    } else {
        remote.to_string()
    };
    if !fs.exists(&effective_remote).await? {
        let parent = parent_path(&effective_remote);
        if !fs.exists(&parent).await? || !fs.is_directory(&parent).await? {
            return Err(TransportError::ArgumentInvalid {
                operation: "push_file".into(),
                reason: format!("parent of {effective_remote} does not exist"),
            });
        }
    } else if !fs.has_write_permissions(&effective_remote).await? {
        return Err(TransportError::ArgumentInvalid {
            operation: "push_file".into(),
            reason: format!("{effective_remote} is not writable"),
        });
    }
    Ok(effective_remote)
}

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn basename_str(path: &str) -> String {
    basename(path)
}

fn remote_or_local_name(local: &Path) -> &str {
    local.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => path[..i].to_string(),
        None => ".".to_string(),
    }
}

async fn append_log(path: &Path, command: &str, output: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let timestamp = chrono::Utc::now().to_rfc3339();
    let line = format!("Command: {command}\nTimestamp: {timestamp}\n{output}\n");
    file.write_all(line.as_bytes()).await
}

/// Connection parameters shared by both transports' constructors.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub timeout: Duration,
    pub retries: u32,
    pub jump_host: Option<Box<TransportConfig>>,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            timeout: Duration::from_secs(10),
            retries: 3,
            jump_host: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_jump_host(mut self, jump: TransportConfig) -> Self {
        self.jump_host = Some(Box::new(jump));
        self
    }
}
