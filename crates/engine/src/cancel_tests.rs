// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sv_adapters::FakeContainers;
use sv_core::{Job, JobStatus, CANCELLED_BY_USER};
use sv_storage::FakeStore;

struct Fixture {
    store: Arc<FakeStore>,
    registry: Arc<ProcessRegistry>,
    containers: Arc<FakeContainers>,
    oracle: CancelOracle,
}

fn fixture() -> Fixture {
    let store = Arc::new(FakeStore::new());
    let registry = Arc::new(ProcessRegistry::new());
    let containers = Arc::new(FakeContainers::new());
    let oracle = CancelOracle::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&registry),
        Arc::clone(&containers) as Arc<dyn Containers>,
    )
    .with_kill_grace(Duration::from_millis(10));
    Fixture { store, registry, containers, oracle }
}

fn cancelled_row(job: &Job) -> Job {
    let mut row = job.clone();
    row.status = JobStatus::Failed;
    row.error_message = Some(CANCELLED_BY_USER.to_string());
    row
}

#[tokio::test]
async fn healthy_job_is_not_cancelled() {
    let f = fixture();
    let job = Job::queued("job-1", "usr-1", 1);
    f.store.insert_job(job.clone());
    f.registry.register(&job.id, &job.task_name);

    assert!(!f.oracle.is_cancelled(&job.id).await);
}

#[tokio::test]
async fn missing_row_counts_as_cancelled() {
    let f = fixture();
    let job = Job::queued("job-1", "usr-1", 1);
    f.registry.register(&job.id, &job.task_name);

    assert!(f.oracle.is_cancelled(&job.id).await);
}

#[tokio::test]
async fn store_error_answers_not_cancelled() {
    let f = fixture();
    let job = Job::queued("job-1", "usr-1", 1);
    f.store.insert_job(job.clone());
    f.registry.register(&job.id, &job.task_name);

    f.store.set_fail_reads(true);
    assert!(!f.oracle.is_cancelled(&job.id).await);

    // Cancellation is re-observed once the store recovers.
    f.store.set_fail_reads(false);
    f.store.set_job(cancelled_row(&job));
    assert!(f.oracle.is_cancelled(&job.id).await);
}

#[tokio::test]
async fn external_cancel_sets_the_in_memory_flag() {
    let f = fixture();
    let job = Job::queued("job-1", "usr-1", 1);
    f.store.insert_job(cancelled_row(&job));
    let token = f.registry.register(&job.id, &job.task_name);

    assert!(f.oracle.is_cancelled(&job.id).await);
    // Flag converged: subsequent answers need no store round-trip.
    assert!(f.registry.is_cancelled(&job.id));
    assert!(token.is_cancelled());
    f.store.set_fail_reads(true);
    assert!(f.oracle.is_cancelled(&job.id).await);
}

#[tokio::test]
async fn failed_without_marker_is_not_cancellation() {
    let f = fixture();
    let mut job = Job::queued("job-1", "usr-1", 1);
    job.status = JobStatus::Failed;
    job.error_message = Some("agent exploded".to_string());
    f.store.insert_job(job.clone());
    f.registry.register(&job.id, &job.task_name);

    assert!(!f.oracle.is_cancelled(&job.id).await);
}

#[tokio::test]
async fn cancel_job_fails_registered_attempts() {
    let f = fixture();
    let job = Job::queued("job-1", "usr-1", 2);
    f.store.insert_job(job.clone());
    f.registry.register(&job.id, &job.task_name);

    let attempt = sv_core::Attempt::running("job-1", 0);
    f.store.create_attempt(&attempt).await.unwrap();
    f.registry.add_attempt(&job.id, &attempt.id);

    f.oracle.cancel_job(&job.id).await;

    let stored = f.store.attempt(&attempt.id).unwrap();
    assert_eq!(stored.status, AttemptStatus::Failed);
    assert!(stored.finished_at.is_some());
}

#[tokio::test]
async fn container_cleanup_requires_registered_processes() {
    let f = fixture();
    let job = Job::queued("job-1", "usr-1", 1);
    f.registry.register(&job.id, &job.task_name);
    f.containers.add_running("c1", "demo-task__trial-0");
    f.containers.add_running("c2", "other-task__trial-0");

    // No registered processes: cleanup must not touch anything.
    f.oracle.cleanup_containers(&job.id, "demo-task").await;
    assert!(f.containers.removed().is_empty());

    // With a registered process, only this task's containers go away.
    f.registry
        .add_process(&job.id, sv_adapters::GroupKiller::for_pgid(1_000_005));
    f.oracle.cleanup_containers(&job.id, "demo-task").await;
    assert_eq!(f.containers.removed(), vec!["c1".to_string()]);
}

#[tokio::test]
async fn cancel_of_unsupervised_job_is_a_no_op() {
    let f = fixture();
    let job = Job::queued("job-1", "usr-1", 1);
    f.store.insert_job(job.clone());

    f.oracle.cancel_job(&job.id).await;
    // Row untouched: this worker does not own the job.
    assert_eq!(f.store.job(&job.id).unwrap().status, JobStatus::Queued);
}
