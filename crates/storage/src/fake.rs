// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`Store`] for tests.

use crate::error::StoreError;
use crate::store::{AttemptUpdate, Store};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use sv_core::{Attempt, AttemptId, Episode, Job, JobId, JobStatus};

#[derive(Default)]
struct Inner {
    jobs: BTreeMap<JobId, Job>,
    attempts: BTreeMap<AttemptId, Attempt>,
    episodes: Vec<Episode>,
}

/// In-memory store. Mutators take the same lock, so `increment_job_progress`
/// is atomic exactly like the SQL `SET x = x + 1` it stands in for.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
    fail_reads: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a job row, as the upload API would.
    pub fn insert_job(&self, job: Job) {
        self.inner.lock().jobs.insert(job.id.clone(), job);
    }

    /// Overwrite a job row directly, simulating an out-of-process writer
    /// (e.g. the API cancelling a job).
    pub fn set_job(&self, job: Job) {
        self.insert_job(job);
    }

    /// Remove a job row entirely (cascade-deletes its attempts and episodes).
    pub fn delete_job(&self, id: &JobId) {
        let mut inner = self.inner.lock();
        inner.jobs.remove(id);
        inner.attempts.retain(|_, a| a.job_id != *id);
        let attempt_ids: Vec<AttemptId> =
            inner.attempts.values().map(|a| a.id.clone()).collect();
        inner
            .episodes
            .retain(|e| attempt_ids.contains(&e.attempt_id));
    }

    /// When set, read operations fail with a transient-looking error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.inner.lock().jobs.get(id).cloned()
    }

    pub fn attempt(&self, id: &AttemptId) -> Option<Attempt> {
        self.inner.lock().attempts.get(id).cloned()
    }

    pub fn attempts_for(&self, job_id: &JobId) -> Vec<Attempt> {
        let mut attempts: Vec<Attempt> = self
            .inner
            .lock()
            .attempts
            .values()
            .filter(|a| a.job_id == *job_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.index);
        attempts
    }

    pub fn episodes_for(&self, attempt_id: &AttemptId) -> Vec<Episode> {
        let mut episodes: Vec<Episode> = self
            .inner
            .lock()
            .episodes
            .iter()
            .filter(|e| e.attempt_id == *attempt_id)
            .cloned()
            .collect();
        episodes.sort_by_key(|e| e.index);
        episodes
    }

    fn read_guard(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        self.read_guard()?;
        Ok(self.inner.lock().jobs.get(id).cloned())
    }

    async fn list_queued_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.read_guard()?;
        let mut jobs: Vec<Job> = self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn update_job_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "job",
            id: id.to_string(),
        })?;
        job.status = status;
        job.error_message = error_message.map(str::to_string);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_job_progress(&self, id: &JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "job",
            id: id.to_string(),
        })?;
        job.runs_completed += 1;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        self.inner
            .lock()
            .attempts
            .insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn update_attempt(
        &self,
        id: &AttemptId,
        update: AttemptUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let attempt = inner
            .attempts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "attempt",
                id: id.to_string(),
            })?;
        attempt.status = update.status;
        attempt.tests_passed = update.tests_passed;
        attempt.tests_total = update.tests_total;
        attempt.reward_summary = update.reward_summary;
        if update.log_path.is_some() {
            attempt.log_path = update.log_path;
        }
        attempt.finished_at = Some(update.finished_at);
        if let Some(metadata) = update.metadata {
            attempt.metadata = metadata;
        }
        Ok(())
    }

    async fn list_attempts_by_job(&self, job_id: &JobId) -> Result<Vec<Attempt>, StoreError> {
        self.read_guard()?;
        Ok(self.attempts_for(job_id))
    }

    async fn create_episode(&self, episode: &Episode) -> Result<(), StoreError> {
        self.inner.lock().episodes.push(episode.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
