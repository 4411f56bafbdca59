// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation oracle: the unified "is this job cancelled?" answer.
//!
//! Cancellation has two sources: the in-memory flag set by this worker's own
//! [`cancel_job`](CancelOracle::cancel_job), and the job row written by an
//! out-of-process canceller (failed status with a "cancelled" message). The
//! oracle merges both; every attempt checkpoint consults it.

use crate::registry::{ProcessRegistry, RunningJob};
use std::sync::Arc;
use std::time::Duration;
use sv_adapters::Containers;
use sv_core::{AttemptStatus, JobId};
use sv_storage::{AttemptUpdate, Store};

/// Grace between SIGTERM and SIGKILL when tearing down a job's processes.
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct CancelOracle {
    store: Arc<dyn Store>,
    registry: Arc<ProcessRegistry>,
    containers: Arc<dyn Containers>,
    kill_grace: Duration,
}

impl CancelOracle {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ProcessRegistry>,
        containers: Arc<dyn Containers>,
    ) -> Self {
        Self { store, registry, containers, kill_grace: KILL_GRACE }
    }

    /// Shrink the SIGTERM→SIGKILL grace, for tests.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Whether the job is cancelled, from either source.
    ///
    /// Store errors answer `false`: cancellation is re-observed on the next
    /// poll, and continuing beats failing attempts on a flaky connection.
    pub async fn is_cancelled(&self, job_id: &JobId) -> bool {
        if self.registry.is_cancelled(job_id) {
            return true;
        }
        match self.store.get_job(job_id).await {
            // A vanished row means nobody wants these results anymore.
            Ok(None) => true,
            Ok(Some(job)) if job.cancellation_requested() => {
                self.observe_external_cancel(job_id).await;
                true
            }
            Ok(Some(_)) => false,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "cancellation check failed");
                false
            }
        }
    }

    /// An out-of-process canceller wrote the job row: converge local state.
    /// Sets the flag, signals live process groups, and schedules the
    /// kill-and-cleanup pass in the background.
    async fn observe_external_cancel(&self, job_id: &JobId) {
        let Some(snapshot) = self.registry.mark_cancelled(job_id) else {
            return;
        };
        tracing::info!(job_id = %job_id, "external cancellation observed");
        for killer in &snapshot.processes {
            killer.terminate();
        }
        let oracle = self.clone();
        tokio::spawn(async move {
            oracle.kill_survivors_and_cleanup(&snapshot).await;
        });
    }

    /// In-process cancellation entry point. Terminates process groups (with
    /// a grace period before SIGKILL), removes the job's containers, and
    /// fails every attempt still registered.
    pub async fn cancel_job(&self, job_id: &JobId) {
        let Some(snapshot) = self.registry.mark_cancelled(job_id) else {
            tracing::debug!(job_id = %job_id, "cancel requested for unsupervised job");
            return;
        };
        tracing::info!(
            job_id = %job_id,
            processes = snapshot.processes.len(),
            attempts = snapshot.attempt_ids.len(),
            "cancelling job"
        );
        for killer in &snapshot.processes {
            killer.terminate();
        }
        self.kill_survivors_and_cleanup(&snapshot).await;

        for attempt_id in &snapshot.attempt_ids {
            let update = AttemptUpdate::terminal(AttemptStatus::Failed);
            if let Err(e) = self.store.update_attempt(attempt_id, update).await {
                tracing::warn!(attempt_id = %attempt_id, error = %e, "failed to fail attempt on cancel");
            }
        }
    }

    async fn kill_survivors_and_cleanup(&self, snapshot: &RunningJob) {
        tokio::time::sleep(self.kill_grace).await;
        for killer in &snapshot.processes {
            if killer.is_alive() {
                killer.kill();
            }
        }
        self.cleanup_containers(&snapshot.job_id, &snapshot.task_name).await;
    }

    /// Remove containers named `<taskName>__*`, but only while the registry
    /// still holds process handles for this job. The double-check keeps this
    /// worker from killing containers that belong to another worker running
    /// the same task.
    pub async fn cleanup_containers(&self, job_id: &JobId, task_name: &str) {
        if !self.registry.has_processes(job_id) {
            tracing::debug!(job_id = %job_id, "no registered processes, skipping container cleanup");
            return;
        }
        let prefix = format!("{task_name}__");
        let containers = match self.containers.list_by_prefix(&prefix).await {
            Ok(list) => list,
            Err(e) => {
                // Missing runtime is non-fatal for cleanup.
                tracing::debug!(error = %e, "container listing failed, skipping cleanup");
                return;
            }
        };
        for container in containers {
            match self.containers.force_remove(&container.id).await {
                Ok(()) => {
                    tracing::info!(container = %container.name, "removed trial container")
                }
                Err(e) => {
                    tracing::warn!(container = %container.name, error = %e, "container removal failed")
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
