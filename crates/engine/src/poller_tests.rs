// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::scheduler::{JobRunner, SchedulerLimits};
use async_trait::async_trait;
use parking_lot::Mutex;
use sv_core::{Job, JobId};
use sv_storage::FakeStore;
use tokio::sync::Notify;

/// Runner that parks jobs until released.
#[derive(Default)]
struct ParkedRunner {
    started: Mutex<Vec<JobId>>,
    release: Notify,
}

#[async_trait]
impl JobRunner for ParkedRunner {
    async fn run(&self, job: Job) {
        self.started.lock().push(job.id.clone());
        self.release.notified().await;
    }
}

fn fixture(
    max_queued_per_user: usize,
) -> (Arc<FakeStore>, Arc<ParkedRunner>, Arc<Scheduler>, Poller) {
    let store = Arc::new(FakeStore::new());
    let runner = Arc::new(ParkedRunner::default());
    let scheduler = Scheduler::new(
        SchedulerLimits { max_concurrent: 1, max_active_per_user: 1, max_queued_per_user },
        Arc::clone(&runner) as Arc<dyn JobRunner>,
    );
    let poller = Poller::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&scheduler),
        Duration::from_millis(10),
    );
    (store, runner, scheduler, poller)
}

#[tokio::test]
async fn polling_is_idempotent_across_iterations() {
    let (store, runner, scheduler, poller) = fixture(10);
    store.insert_job(Job::queued("job-1", "u1", 1));

    poller.poll_once().await;
    // The job stays `queued` in the store until the driver flips it; a
    // second poll must not enqueue it twice.
    poller.poll_once().await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(runner.started.lock().len(), 1);
    assert!(scheduler.contains(&JobId::from_string("job-1")));
    runner.release.notify_waiters();
}

#[tokio::test]
async fn owners_at_queue_capacity_are_skipped() {
    let (store, runner, _scheduler, poller) = fixture(1);
    store.insert_job(Job::queued("job-1", "u1", 1));
    store.insert_job(Job::queued("job-2", "u1", 1));
    store.insert_job(Job::queued("job-3", "u1", 1));

    poller.poll_once().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // One started, one queued, the third left in the store for later.
    assert_eq!(runner.started.lock().len(), 1);
    let status = _scheduler.user_status(&"u1".into());
    assert_eq!(status.queued, 1);
    runner.release.notify_waiters();
}

#[tokio::test]
async fn store_errors_do_not_kill_the_poller() {
    let (store, runner, _scheduler, poller) = fixture(10);
    store.insert_job(Job::queued("job-1", "u1", 1));

    store.set_fail_reads(true);
    poller.poll_once().await;
    assert!(runner.started.lock().is_empty());

    store.set_fail_reads(false);
    poller.poll_once().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(runner.started.lock().len(), 1);
    runner.release.notify_waiters();
}
