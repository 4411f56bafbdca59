// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attempt record, status machine, and the failure taxonomy.

use crate::id::{AttemptId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Queued,
    Running,
    Success,
    Failed,
}

crate::simple_display! {
    AttemptStatus {
        Queued => "queued",
        Running => "running",
        Success => "success",
        Failed => "failed",
    }
}

crate::status_from_str! {
    AttemptStatus {
        "queued" => Queued,
        "running" => Running,
        "success" => Success,
        "failed" => Failed,
    }
}

/// Classification of attempt failures.
///
/// Persisted into attempt metadata so the UI can distinguish a timeout from
/// a rate limit without string-matching error text. Cancellation is the one
/// class that suppresses the job progress increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Timeout,
    RateLimit,
    Cancelled,
    Execution,
}

crate::simple_display! {
    FailureClass {
        Timeout => "timeout",
        RateLimit => "rate_limit",
        Cancelled => "cancelled",
        Execution => "execution",
    }
}

/// Outcome of a single named test inside an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseStatus {
    Passed,
    Failed,
}

crate::simple_display! {
    TestCaseStatus {
        Passed => "passed",
        Failed => "failed",
    }
}

/// One named test result, surfaced in attempt metadata.
///
/// Synthetic entries (e.g. "Execution Timeout") use `message` to carry a
/// human-readable trace when no real test ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub status: TestCaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestCase {
    pub fn passed(name: impl Into<String>) -> Self {
        Self { name: name.into(), status: TestCaseStatus::Passed, message: None }
    }

    pub fn failed(name: impl Into<String>, message: Option<String>) -> Self {
        Self { name: name.into(), status: TestCaseStatus::Failed, message }
    }
}

/// One independent trial of the agent against the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub job_id: JobId,
    /// Position within the job, unique per job: `0 <= index < runs_requested`.
    pub index: i32,
    pub status: AttemptStatus,
    /// Invariant: `0 <= tests_passed <= tests_total`. `tests_total == 0` is a
    /// failure regardless of `tests_passed`: zero tests executed means the
    /// suite never ran.
    pub tests_passed: i32,
    pub tests_total: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Map of test name → 0|1 as reported by the verifier.
    pub reward_summary: BTreeMap<String, i32>,
    /// Object-store URI of the mirrored trial directory, when uploaded.
    pub log_path: Option<String>,
    pub metadata: serde_json::Value,
}

impl Attempt {
    /// The terminal status implied by a test tally: success only when the
    /// suite ran at all and every test passed.
    pub fn status_for_tally(tests_passed: i32, tests_total: i32) -> AttemptStatus {
        if tests_total > 0 && tests_passed == tests_total {
            AttemptStatus::Success
        } else {
            AttemptStatus::Failed
        }
    }

    /// A freshly started attempt: `running`, no results yet.
    pub fn running(job_id: impl Into<JobId>, index: i32) -> Self {
        Self {
            id: AttemptId::new(),
            job_id: job_id.into(),
            index,
            status: AttemptStatus::Running,
            tests_passed: 0,
            tests_total: 0,
            started_at: Utc::now(),
            finished_at: None,
            reward_summary: BTreeMap::new(),
            log_path: None,
            metadata: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
#[path = "attempt_tests.rs"]
mod tests;
