// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{harness, write_trial};
use std::time::Duration;
use sv_adapters::FakeLauncher;
use sv_core::{JobStatus, CANCELLED_BY_USER};

fn running_job(runs: i32) -> Job {
    let mut job = Job::queued("job-1", "usr-1", runs);
    job.status = JobStatus::Running;
    job
}

async fn run_single_attempt(h: &crate::test_support::Harness, job: &Job) {
    let task_root = tempfile::tempdir().unwrap();
    let work_dir = h.worker.config.work_dir.join(job.id.as_str());
    std::fs::create_dir_all(&work_dir).unwrap();
    let semaphore = tokio::sync::Semaphore::new(1);
    h.worker
        .run_attempt(job, 0, task_root.path(), &work_dir, &semaphore)
        .await;
}

#[tokio::test]
async fn happy_path_success_with_episodes_and_logs() {
    let launcher = Arc::new(FakeLauncher::new(|req| {
        write_trial(&req.jobs_dir, 8, 8, 2);
        Ok(AgentOutput::default())
    }));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempts = h.store.attempts_for(&job.id);
    assert_eq!(attempts.len(), 1);
    let attempt = &attempts[0];
    assert_eq!(attempt.status, AttemptStatus::Success);
    assert_eq!((attempt.tests_passed, attempt.tests_total), (8, 8));
    assert!(attempt.finished_at.is_some());
    assert!(attempt.started_at <= attempt.finished_at.unwrap());
    assert_eq!(
        attempt.log_path.as_deref(),
        Some("s3://test-bucket/results/job-1/attempt-0")
    );
    assert_eq!(attempt.reward_summary["test-0"], 1);

    let episodes = h.store.episodes_for(&attempt.id);
    assert_eq!(episodes.len(), 2);
    assert_eq!(episodes[0].index, 0);
    assert_eq!(episodes[1].index, 1);
    assert_eq!(episodes[0].commands[0].command, "echo step-0\n");
    assert_eq!(episodes[0].commands[0].output, "step-0");

    // The trial directory was mirrored to the object store.
    assert!(!h
        .objstore
        .keys_with_prefix("results/job-1/attempt-0/")
        .is_empty());

    assert_eq!(h.store.job(&job.id).unwrap().runs_completed, 1);
    // Finalized attempts leave the registry.
    assert!(h.worker.registry.get(&job.id).unwrap().attempt_ids.is_empty());
}

#[tokio::test]
async fn partial_pass_is_failure_with_progress() {
    let launcher = Arc::new(FakeLauncher::new(|req| {
        write_trial(&req.jobs_dir, 3, 8, 1);
        Ok(AgentOutput::default())
    }));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempt = &h.store.attempts_for(&job.id)[0];
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!((attempt.tests_passed, attempt.tests_total), (3, 8));
    assert_eq!(h.store.job(&job.id).unwrap().runs_completed, 1);
}

#[tokio::test]
async fn zero_tests_is_failure_not_success() {
    let launcher = Arc::new(FakeLauncher::new(|req| {
        write_trial(&req.jobs_dir, 0, 0, 1);
        Ok(AgentOutput::default())
    }));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempt = &h.store.attempts_for(&job.id)[0];
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!((attempt.tests_passed, attempt.tests_total), (0, 0));
    // Episodes still persisted; timeout/rate-limit synthesis does not apply.
    assert_eq!(h.store.episodes_for(&attempt.id).len(), 1);
    assert_eq!(h.store.job(&job.id).unwrap().runs_completed, 1);
}

#[tokio::test]
async fn rate_limit_in_clean_exit_output_does_not_count_progress() {
    let launcher = Arc::new(FakeLauncher::new(|req| {
        write_trial(&req.jobs_dir, 8, 8, 1);
        Ok(AgentOutput {
            stdout: "warning: RateLimitError from provider\n".to_string(),
            stderr: String::new(),
        })
    }));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempt = &h.store.attempts_for(&job.id)[0];
    assert_eq!(attempt.status, AttemptStatus::Failed);
    // 0/1 so the UI never shows 0/0, despite the parseable trial on disk.
    assert_eq!((attempt.tests_passed, attempt.tests_total), (0, 1));
    assert_eq!(attempt.metadata["failure_class"], "rate_limit");
    assert_eq!(
        attempt.metadata["test_cases"][0]["name"],
        "API Rate Limit Exceeded"
    );
    // The clean-exit rate-limit path does NOT advance the progress counter.
    assert_eq!(h.store.job(&job.id).unwrap().runs_completed, 0);
}

#[tokio::test]
async fn rate_limit_from_nonzero_exit_counts_progress() {
    let launcher = Arc::new(FakeLauncher::new(|_req| {
        Err(LaunchError::NonZero {
            code: 1,
            stdout: String::new(),
            stderr: "RateLimitError: 429 Too Many Requests".to_string(),
        })
    }));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempt = &h.store.attempts_for(&job.id)[0];
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!((attempt.tests_passed, attempt.tests_total), (0, 1));
    assert_eq!(attempt.metadata["failure_class"], "rate_limit");
    assert_eq!(
        attempt.metadata["test_cases"][0]["name"],
        "API Rate Limit Exceeded"
    );
    // Thrown-error rate limits follow the general non-cancel rule: counted.
    assert_eq!(h.store.job(&job.id).unwrap().runs_completed, 1);
}

#[tokio::test]
async fn timeout_synthesizes_a_named_test_case() {
    let launcher = Arc::new(FakeLauncher::new(|_req| {
        Err(LaunchError::Timeout(Duration::from_secs(1800)))
    }));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempt = &h.store.attempts_for(&job.id)[0];
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!((attempt.tests_passed, attempt.tests_total), (0, 1));
    assert_eq!(attempt.metadata["failure_class"], "timeout");
    let case = &attempt.metadata["test_cases"][0];
    assert_eq!(case["name"], "Execution Timeout");
    assert!(case["message"].as_str().unwrap().contains("1800"));
    // A fallback diagnostic episode exists even though nothing was produced.
    assert_eq!(h.store.episodes_for(&attempt.id).len(), 1);
    // Timeout is a normal failure: progress advances.
    assert_eq!(h.store.job(&job.id).unwrap().runs_completed, 1);
}

#[tokio::test]
async fn timeout_with_recovered_tests_keeps_the_real_tally() {
    let launcher = Arc::new(FakeLauncher::new(|req| {
        // The agent got far enough to write artifacts before hanging.
        write_trial(&req.jobs_dir, 2, 5, 1);
        Err(LaunchError::Timeout(Duration::from_secs(1)))
    }));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempt = &h.store.attempts_for(&job.id)[0];
    assert_eq!((attempt.tests_passed, attempt.tests_total), (2, 5));
    // Recovery mirrored the partial trial for inspection.
    assert_eq!(
        attempt.log_path.as_deref(),
        Some("s3://test-bucket/results/job-1/attempt-0")
    );
    assert!(!h
        .objstore
        .keys_with_prefix("results/job-1/attempt-0/")
        .is_empty());
}

#[tokio::test]
async fn cancelled_launch_does_not_count_progress() {
    let launcher = Arc::new(FakeLauncher::new(|_req| Err(LaunchError::Cancelled)));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempt = &h.store.attempts_for(&job.id)[0];
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!(attempt.metadata["failure_class"], "cancelled");
    assert_eq!(h.store.job(&job.id).unwrap().runs_completed, 0);
}

#[tokio::test]
async fn pre_cancelled_job_creates_no_attempt_row() {
    let launcher = Arc::new(FakeLauncher::succeeding());
    let h = harness(Arc::clone(&launcher) as Arc<dyn sv_adapters::AgentLauncher>);
    let mut job = running_job(1);
    job.status = JobStatus::Failed;
    job.error_message = Some(CANCELLED_BY_USER.to_string());
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    assert!(h.store.attempts_for(&job.id).is_empty());
    assert!(launcher.launches().is_empty());
}

#[tokio::test]
async fn execution_error_recovers_partial_episodes() {
    let launcher = Arc::new(FakeLauncher::new(|req| {
        // Artifacts exist but the agent died with a plain error.
        write_trial(&req.jobs_dir, 1, 4, 2);
        Err(LaunchError::NonZero {
            code: 137,
            stdout: String::new(),
            stderr: "killed".to_string(),
        })
    }));
    let h = harness(launcher);
    let job = running_job(1);
    h.store.insert_job(job.clone());
    h.worker.registry.register(&job.id, &job.task_name);

    run_single_attempt(&h, &job).await;

    let attempt = &h.store.attempts_for(&job.id)[0];
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!(attempt.metadata["failure_class"], "execution");
    // Real recovered tallies are kept; no synthetic test case injected.
    assert_eq!((attempt.tests_passed, attempt.tests_total), (1, 4));
    assert_eq!(h.store.episodes_for(&attempt.id).len(), 2);
    assert_eq!(h.store.job(&job.id).unwrap().runs_completed, 1);
}
