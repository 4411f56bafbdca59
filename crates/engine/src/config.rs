// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration, read once from the environment at startup and
//! injected top-down.

use std::path::PathBuf;
use std::time::Duration;
use sv_core::AgentKind;

/// Model-name markers that get the reduced per-job attempt cap. These models
/// are throttled hard enough that ten parallel attempts just trade progress
/// for rate-limit failures.
const THROTTLED_MODEL_MARKERS: &[&str] = &["opus"];

/// Reduced attempt cap for throttled models.
const THROTTLED_ATTEMPT_CAP: usize = 5;

/// Tunable worker behavior. Defaults match production; tests shrink the
/// cadences directly.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the poller scans for queued jobs.
    pub poll_interval: Duration,
    /// System-wide cap on concurrently running jobs.
    pub max_concurrent_jobs: usize,
    /// Per-user cap on concurrently running jobs.
    pub max_active_per_user: usize,
    /// Per-user cap on jobs waiting in the scheduler.
    pub max_queued_per_user: usize,
    /// Per-job cap on concurrently running attempts.
    pub attempts_per_job: usize,
    /// Per-attempt agent timeout.
    pub harbor_timeout: Duration,
    /// Which agent drives attempts.
    pub agent_kind: AgentKind,
    /// Model passed to the agent, when set.
    pub model: Option<String>,
    /// Scratch space; each job gets a subdirectory, deleted on completion.
    pub work_dir: PathBuf,
    /// Cadence of streamed log uploads during a run.
    pub log_upload_interval: Duration,
    /// Cadence of cancellation polling during a run.
    pub cancel_poll_interval: Duration,
    /// Delay between attempt starts, multiplied by attempt index.
    pub stagger_step: Duration,
    /// How long graceful shutdown waits for in-flight jobs.
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_concurrent_jobs: 3,
            max_active_per_user: 2,
            max_queued_per_user: 10,
            attempts_per_job: 10,
            harbor_timeout: Duration::from_secs(1800),
            agent_kind: AgentKind::Terminus2,
            model: None,
            work_dir: PathBuf::from("./work"),
            log_upload_interval: Duration::from_secs(30),
            cancel_poll_interval: Duration::from_secs(2),
            stagger_step: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let model = std::env::var("HARBOR_MODEL").ok().filter(|s| !s.is_empty());
        let attempts_per_job = env_usize("MAX_CONCURRENT_ATTEMPTS_PER_JOB")
            .unwrap_or_else(|| default_attempt_cap(model.as_deref(), defaults.attempts_per_job));
        Self {
            poll_interval: env_ms("WORKER_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval),
            max_concurrent_jobs: env_usize("MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            max_active_per_user: env_usize("MAX_ACTIVE_JOBS_PER_USER")
                .unwrap_or(defaults.max_active_per_user),
            max_queued_per_user: env_usize("MAX_QUEUED_JOBS_PER_USER")
                .unwrap_or(defaults.max_queued_per_user),
            attempts_per_job,
            harbor_timeout: env_ms("HARBOR_TIMEOUT_MS").unwrap_or(defaults.harbor_timeout),
            agent_kind: std::env::var("HARBOR_AGENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.agent_kind),
            model,
            work_dir: std::env::var("SV_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            log_upload_interval: env_ms("SV_LOG_UPLOAD_INTERVAL_MS")
                .unwrap_or(defaults.log_upload_interval),
            cancel_poll_interval: env_ms("SV_CANCEL_POLL_MS")
                .unwrap_or(defaults.cancel_poll_interval),
            stagger_step: env_ms("SV_ATTEMPT_STAGGER_MS").unwrap_or(defaults.stagger_step),
            shutdown_grace: env_ms("SV_SHUTDOWN_GRACE_MS").unwrap_or(defaults.shutdown_grace),
        }
    }
}

/// The attempt cap implied by the configured model.
pub(crate) fn default_attempt_cap(model: Option<&str>, default: usize) -> usize {
    match model {
        Some(m) if THROTTLED_MODEL_MARKERS.iter().any(|marker| m.contains(marker)) => {
            THROTTLED_ATTEMPT_CAP
        }
        _ => default,
    }
}

fn env_ms(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.parse::<usize>().ok())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
