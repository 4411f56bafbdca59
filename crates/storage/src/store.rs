// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`Store`] trait: every operation the worker performs against the
//! relational store. Implementations must be safe to call concurrently from
//! multiple attempt drivers.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use sv_core::{Attempt, AttemptId, AttemptStatus, Episode, Job, JobId, JobStatus};

/// Terminal update applied to an attempt exactly once, when its driver exits.
#[derive(Debug, Clone)]
pub struct AttemptUpdate {
    pub status: AttemptStatus,
    pub tests_passed: i32,
    pub tests_total: i32,
    pub reward_summary: BTreeMap<String, i32>,
    pub log_path: Option<String>,
    pub finished_at: DateTime<Utc>,
    /// When present, replaces the attempt's metadata column.
    pub metadata: Option<serde_json::Value>,
}

impl AttemptUpdate {
    /// A bare terminal update with the given status and no test results.
    pub fn terminal(status: AttemptStatus) -> Self {
        Self {
            status,
            tests_passed: 0,
            tests_total: 0,
            reward_summary: BTreeMap::new(),
            log_path: None,
            finished_at: Utc::now(),
            metadata: None,
        }
    }
}

/// Typed operations over jobs, attempts, and episodes.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// All jobs in `queued` status, oldest first.
    async fn list_queued_jobs(&self) -> Result<Vec<Job>, StoreError>;

    async fn update_job_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Atomic `runs_completed += 1`, protected by the database. Never a
    /// fetch-then-write.
    async fn increment_job_progress(&self, id: &JobId) -> Result<(), StoreError>;

    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;

    async fn update_attempt(
        &self,
        id: &AttemptId,
        update: AttemptUpdate,
    ) -> Result<(), StoreError>;

    async fn list_attempts_by_job(&self, job_id: &JobId) -> Result<Vec<Attempt>, StoreError>;

    async fn create_episode(&self, episode: &Episode) -> Result<(), StoreError>;
}
