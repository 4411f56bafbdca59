// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and status machine.

use crate::id::{JobId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Substring in `error_message` that marks a failed job as cancelled.
///
/// This is the cross-process cancellation contract: the API process cancels a
/// job by writing `status = failed` with a message containing this marker,
/// and the worker converges within one cancellation-poll cycle. Matching is
/// case-insensitive so "Cancelled" from older writers still counts.
pub const CANCELLED_MARKER: &str = "cancelled";

/// Canonical error message written when a user cancels a job.
pub const CANCELLED_BY_USER: &str = "Job cancelled by user";

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created by the upload API, waiting for a worker to admit it.
    Queued,
    /// Admitted; attempts are running.
    Running,
    /// All requested attempts finished.
    Completed,
    /// Errored or cancelled.
    Failed,
}

impl JobStatus {
    /// Terminal states are sticky within a single worker's supervision.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

crate::simple_display! {
    JobStatus {
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

crate::status_from_str! {
    JobStatus {
        "queued" => Queued,
        "running" => Running,
        "completed" => Completed,
        "failed" => Failed,
    }
}

/// One benchmark job: N independent attempts of a single uploaded task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub task_name: String,
    pub status: JobStatus,
    /// How many attempts the user asked for.
    pub runs_requested: i32,
    /// How many attempts have reached a terminal state that counts as done.
    /// Invariant: `runs_completed <= runs_requested`.
    pub runs_completed: i32,
    /// Object-store URI (`scheme://bucket/key`) of the uploaded task zip.
    pub zip_location: String,
    pub owner_id: UserId,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// True when this row carries the out-of-process cancellation signal:
    /// failed with an error message containing [`CANCELLED_MARKER`].
    pub fn cancellation_requested(&self) -> bool {
        self.status == JobStatus::Failed
            && self
                .error_message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(CANCELLED_MARKER))
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Job {
    /// A queued job with sensible defaults for tests.
    pub fn queued(id: impl Into<JobId>, owner: impl Into<UserId>, runs: i32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            task_name: "demo-task".to_string(),
            status: JobStatus::Queued,
            runs_requested: runs,
            runs_completed: 0,
            zip_location: "s3://bucket/tasks/demo-task.zip".to_string(),
            owner_id: owner.into(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
