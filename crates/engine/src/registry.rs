// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process registry: which jobs this worker is actively supervising.
//!
//! The registry is the single point that permits cancellation to act on live
//! subprocesses: only jobs visible here can have their process groups
//! signaled, so one worker never disturbs another worker's children. An
//! entry's presence means "this worker is responsible"; its absence means it
//! is not.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use sv_adapters::GroupKiller;
use sv_core::{AttemptId, JobId};
use tokio_util::sync::CancellationToken;

struct Entry {
    task_name: String,
    processes: Vec<GroupKiller>,
    attempt_ids: HashSet<AttemptId>,
    cancelled: bool,
    cancel_token: CancellationToken,
}

/// Snapshot of a supervised job, cloned out of the registry.
#[derive(Debug, Clone)]
pub struct RunningJob {
    pub job_id: JobId,
    pub task_name: String,
    pub processes: Vec<GroupKiller>,
    pub attempt_ids: HashSet<AttemptId>,
    pub cancelled: bool,
}

/// Process-wide map from job ID to its running state.
#[derive(Default)]
pub struct ProcessRegistry {
    jobs: Mutex<HashMap<JobId, Entry>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin supervising a job. Returns the job's cancellation token; agent
    /// runs under this job observe cancellation through it.
    pub fn register(&self, job_id: &JobId, task_name: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.jobs.lock().insert(
            job_id.clone(),
            Entry {
                task_name: task_name.to_string(),
                processes: Vec::new(),
                attempt_ids: HashSet::new(),
                cancelled: false,
                cancel_token: token.clone(),
            },
        );
        token
    }

    /// Stop supervising a job. Live process handles are dropped, not
    /// signaled; callers kill first if that is what they mean.
    pub fn unregister(&self, job_id: &JobId) {
        self.jobs.lock().remove(job_id);
    }

    pub fn add_process(&self, job_id: &JobId, killer: GroupKiller) {
        if let Some(entry) = self.jobs.lock().get_mut(job_id) {
            entry.processes.push(killer);
        }
    }

    pub fn remove_process(&self, job_id: &JobId, killer: GroupKiller) {
        if let Some(entry) = self.jobs.lock().get_mut(job_id) {
            entry.processes.retain(|k| *k != killer);
        }
    }

    pub fn add_attempt(&self, job_id: &JobId, attempt_id: &AttemptId) {
        if let Some(entry) = self.jobs.lock().get_mut(job_id) {
            entry.attempt_ids.insert(attempt_id.clone());
        }
    }

    pub fn remove_attempt(&self, job_id: &JobId, attempt_id: &AttemptId) {
        if let Some(entry) = self.jobs.lock().get_mut(job_id) {
            entry.attempt_ids.remove(attempt_id);
        }
    }

    pub fn get(&self, job_id: &JobId) -> Option<RunningJob> {
        self.jobs.lock().get(job_id).map(|e| snapshot(job_id, e))
    }

    pub fn is_cancelled(&self, job_id: &JobId) -> bool {
        self.jobs
            .lock()
            .get(job_id)
            .is_some_and(|e| e.cancelled)
    }

    /// True while the registry holds process handles for this job. Container
    /// cleanup is gated on this to avoid touching another worker's trials.
    pub fn has_processes(&self, job_id: &JobId) -> bool {
        self.jobs
            .lock()
            .get(job_id)
            .is_some_and(|e| !e.processes.is_empty())
    }

    pub fn cancel_token(&self, job_id: &JobId) -> Option<CancellationToken> {
        self.jobs.lock().get(job_id).map(|e| e.cancel_token.clone())
    }

    /// Set the cancelled flag and fire the job's cancellation token.
    /// Returns the snapshot taken at flag time, so the caller can signal the
    /// processes that were live at that moment. `None` if the job is not
    /// supervised here.
    pub fn mark_cancelled(&self, job_id: &JobId) -> Option<RunningJob> {
        let mut jobs = self.jobs.lock();
        let entry = jobs.get_mut(job_id)?;
        entry.cancelled = true;
        entry.cancel_token.cancel();
        Some(snapshot(job_id, entry))
    }
}

fn snapshot(job_id: &JobId, entry: &Entry) -> RunningJob {
    RunningJob {
        job_id: job_id.clone(),
        task_name: entry.task_name.clone(),
        processes: entry.processes.clone(),
        attempt_ids: entry.attempt_ids.clone(),
        cancelled: entry.cancelled,
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
