// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harbor agent runner.
//!
//! Spawns the `harbor` CLI in its own process group, captures stdout/stderr
//! to memory and to two local files, streams those files to the object store
//! while the run is live, enforces the per-attempt timeout, and reacts to
//! cancellation through a [`CancellationToken`].

use crate::containers::last_chars;
use crate::objstore::ObjectStore;
use crate::process::{GroupKiller, ProcessGroup};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Primary env var holding the model API key.
pub const API_KEY_VAR: &str = "HARBOR_API_KEY";

/// Alternate name some agent builds read; populated from [`API_KEY_VAR`]
/// when only the primary is set.
pub const API_KEY_ALT_VAR: &str = "ANTHROPIC_API_KEY";

/// Grace between SIGTERM and SIGKILL when stopping a run.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Candidate venv locations, relative to the worker's working directory,
/// tried when `harbor` is not on PATH.
const VENV_CANDIDATES: &[&str] = &[
    ".venv/bin/harbor",
    "venv/bin/harbor",
    ".harbor/.venv/bin/harbor",
];

const STDOUT_LOG: &str = "harbor-stdout.log";
const STDERR_LOG: &str = "harbor-stderr.log";

/// Callback invoked with the group handle once the child is spawned, so the
/// caller can register it for out-of-band cancellation.
pub type SpawnHook = Box<dyn FnOnce(GroupKiller) + Send>;

/// One agent invocation.
pub struct LaunchRequest {
    pub task_root: PathBuf,
    pub agent: sv_core::AgentKind,
    pub model: Option<String>,
    /// Harbor's `--jobs-dir`: the attempt's output directory.
    pub jobs_dir: PathBuf,
    pub timeout: Duration,
    /// Object-store prefix for streamed logs (`results/{job}/attempt-{i}`).
    pub log_prefix: String,
    pub cancel: CancellationToken,
    pub on_spawn: Option<SpawnHook>,
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Errors from an agent run.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Job cancelled")]
    Cancelled,
    #[error("harbor run exceeded timeout of {0:?}")]
    Timeout(Duration),
    #[error("harbor binary not found on PATH; also tried {tried:?}")]
    BinaryNotFound { tried: Vec<PathBuf> },
    #[error("failed to spawn harbor: {0}")]
    Spawn(String),
    #[error("harbor exited with code {code}: {}", last_chars(.stderr, 400))]
    NonZero {
        code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("i/o error during harbor run: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs an agent attempt to completion.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn run(&self, req: LaunchRequest) -> Result<AgentOutput, LaunchError>;
}

/// Production launcher driving the real `harbor` binary.
pub struct HarborLauncher {
    objstore: Arc<dyn ObjectStore>,
    upload_interval: Duration,
}

impl HarborLauncher {
    pub fn new(objstore: Arc<dyn ObjectStore>, upload_interval: Duration) -> Self {
        Self { objstore, upload_interval }
    }
}

/// Resolve the harbor executable: PATH first, then venv candidates relative
/// to the working directory. The result is cached for the process lifetime.
fn resolve_harbor() -> Result<PathBuf, LaunchError> {
    static RESOLVED: OnceLock<Option<PathBuf>> = OnceLock::new();
    let cached = RESOLVED.get_or_init(|| {
        if let Ok(path) = which::which("harbor") {
            return Some(path);
        }
        VENV_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
    });
    cached.clone().ok_or_else(|| LaunchError::BinaryNotFound {
        tried: VENV_CANDIDATES.iter().map(PathBuf::from).collect(),
    })
}

/// Build the harbor CLI argument list for a request.
fn build_args(req: &LaunchRequest) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--path".to_string(),
        req.task_root.to_string_lossy().to_string(),
        "--agent".to_string(),
        req.agent.cli_name().to_string(),
    ];
    if req.agent.uses_model() {
        if let Some(model) = &req.model {
            args.push("--model".to_string());
            args.push(model.clone());
            args.push("--ak".to_string());
            args.push("reasoning_effort=medium".to_string());
        }
    }
    args.extend([
        "--env".to_string(),
        "docker".to_string(),
        "--jobs-dir".to_string(),
        req.jobs_dir.to_string_lossy().to_string(),
        "--n-concurrent".to_string(),
        "1".to_string(),
    ]);
    args
}

/// Forward the model API key into the child environment, duplicating it
/// under the alternate name when only the primary is set.
fn forward_api_key(cmd: &mut Command) {
    if let Ok(key) = std::env::var(API_KEY_VAR) {
        cmd.env(API_KEY_VAR, &key);
        if std::env::var(API_KEY_ALT_VAR).is_err() {
            cmd.env(API_KEY_ALT_VAR, key);
        }
    }
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Drain a child pipe into the shared buffer and an append-only local file.
fn spawn_capture(
    mut reader: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    path: PathBuf,
    buf: SharedBuf,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to open log sink");
                None
            }
        };
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    buf.lock().extend_from_slice(&chunk[..n]);
                    if let Some(f) = file.as_mut() {
                        if let Err(e) = f.write_all(&chunk[..n]).await {
                            tracing::warn!(path = %path.display(), error = %e, "log sink write failed");
                            file = None;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "pipe read ended");
                    break;
                }
            }
        }
        if let Some(mut f) = file {
            let _ = f.flush().await;
        }
    })
}

async fn upload_logs(
    objstore: &Arc<dyn ObjectStore>,
    prefix: &str,
    stdout: &SharedBuf,
    stderr: &SharedBuf,
) {
    for (name, buf) in [(STDOUT_LOG, stdout), (STDERR_LOG, stderr)] {
        let bytes = buf.lock().clone();
        let key = format!("{prefix}/logs/{name}");
        if let Err(e) = objstore.put(&key, bytes, Some("text/plain")).await {
            tracing::warn!(key, error = %e, "log upload failed");
        }
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut,
}

#[async_trait]
impl AgentLauncher for HarborLauncher {
    async fn run(&self, mut req: LaunchRequest) -> Result<AgentOutput, LaunchError> {
        let exe = resolve_harbor()?;
        tokio::fs::create_dir_all(&req.jobs_dir).await?;

        let mut cmd = Command::new(&exe);
        cmd.args(build_args(&req))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        forward_api_key(&mut cmd);

        let mut group =
            ProcessGroup::spawn(&mut cmd).map_err(|e| LaunchError::Spawn(e.to_string()))?;
        let killer = group.killer();
        if let Some(hook) = req.on_spawn.take() {
            hook(killer);
        }
        tracing::info!(
            exe = %exe.display(),
            agent = %req.agent,
            jobs_dir = %req.jobs_dir.display(),
            "harbor spawned"
        );

        let stdout_buf: SharedBuf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf: SharedBuf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = group.child_mut().stdout.take().map(|pipe| {
            spawn_capture(pipe, req.jobs_dir.join(STDOUT_LOG), Arc::clone(&stdout_buf))
        });
        let stderr_task = group.child_mut().stderr.take().map(|pipe| {
            spawn_capture(pipe, req.jobs_dir.join(STDERR_LOG), Arc::clone(&stderr_buf))
        });

        // Periodic log streaming while the run is live.
        let prefix = req.log_prefix.trim_end_matches('/').to_string();
        let upload_stop = CancellationToken::new();
        let uploader = {
            let objstore = Arc::clone(&self.objstore);
            let prefix = prefix.clone();
            let stdout_buf = Arc::clone(&stdout_buf);
            let stderr_buf = Arc::clone(&stderr_buf);
            let stop = upload_stop.clone();
            let interval = self.upload_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // immediate first tick carries no data
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticker.tick() => {
                            upload_logs(&objstore, &prefix, &stdout_buf, &stderr_buf).await;
                        }
                    }
                }
            })
        };

        let outcome = tokio::select! {
            status = group.wait() => Outcome::Exited(status),
            _ = req.cancel.cancelled() => Outcome::Cancelled,
            _ = tokio::time::sleep(req.timeout) => Outcome::TimedOut,
        };

        if matches!(outcome, Outcome::Cancelled | Outcome::TimedOut) {
            killer.terminate_then_kill(KILL_GRACE).await;
            let _ = group.wait().await;
        }

        // Pipes are closed once the group is reaped; readers drain and stop.
        if let Some(t) = stdout_task {
            let _ = t.await;
        }
        if let Some(t) = stderr_task {
            let _ = t.await;
        }
        upload_stop.cancel();
        let _ = uploader.await;
        upload_logs(&self.objstore, &prefix, &stdout_buf, &stderr_buf).await;

        let stdout = String::from_utf8_lossy(&stdout_buf.lock()).to_string();
        let stderr = String::from_utf8_lossy(&stderr_buf.lock()).to_string();

        match outcome {
            Outcome::Cancelled => Err(LaunchError::Cancelled),
            Outcome::TimedOut => {
                tracing::warn!(timeout = ?req.timeout, "harbor run timed out");
                Err(LaunchError::Timeout(req.timeout))
            }
            Outcome::Exited(Err(e)) => Err(LaunchError::Io(e)),
            Outcome::Exited(Ok(status)) => match status.code() {
                // Killed by a signal: someone cancelled us out-of-band.
                None => Err(LaunchError::Cancelled),
                Some(0) => {
                    tracing::info!("harbor run completed");
                    Ok(AgentOutput { stdout, stderr })
                }
                Some(code) => Err(LaunchError::NonZero { code, stdout, stderr }),
            },
        }
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    /// Record of one fake launch.
    #[derive(Debug, Clone)]
    pub struct RecordedLaunch {
        pub task_root: PathBuf,
        pub agent: sv_core::AgentKind,
        pub jobs_dir: PathBuf,
        pub log_prefix: String,
    }

    type Handler =
        Box<dyn Fn(&LaunchRequest) -> Result<AgentOutput, LaunchError> + Send + Sync>;

    /// Scriptable [`AgentLauncher`]. The handler sees each request and may
    /// write artifact fixtures under `req.jobs_dir` before returning.
    pub struct FakeLauncher {
        handler: Handler,
        launches: Mutex<Vec<RecordedLaunch>>,
    }

    impl FakeLauncher {
        pub fn new(
            handler: impl Fn(&LaunchRequest) -> Result<AgentOutput, LaunchError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self { handler: Box::new(handler), launches: Mutex::new(Vec::new()) }
        }

        /// A launcher that always succeeds with empty output.
        pub fn succeeding() -> Self {
            Self::new(|_| Ok(AgentOutput::default()))
        }

        pub fn launches(&self) -> Vec<RecordedLaunch> {
            self.launches.lock().clone()
        }
    }

    #[async_trait]
    impl AgentLauncher for FakeLauncher {
        async fn run(&self, req: LaunchRequest) -> Result<AgentOutput, LaunchError> {
            self.launches.lock().push(RecordedLaunch {
                task_root: req.task_root.clone(),
                agent: req.agent,
                jobs_dir: req.jobs_dir.clone(),
                log_prefix: req.log_prefix.clone(),
            });
            (self.handler)(&req)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLauncher, RecordedLaunch};

#[cfg(test)]
#[path = "harbor_tests.rs"]
mod tests;
