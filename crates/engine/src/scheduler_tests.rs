// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use tokio::sync::Notify;

/// Runner that blocks each job until the test releases it, recording the
/// order in which jobs actually started.
#[derive(Default)]
struct BlockingRunner {
    started: Mutex<Vec<JobId>>,
    gates: Mutex<HashMap<JobId, Arc<Notify>>>,
}

impl BlockingRunner {
    fn gate(&self, job_id: &JobId) -> Arc<Notify> {
        Arc::clone(
            self.gates
                .lock()
                .entry(job_id.clone())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    fn started(&self) -> Vec<JobId> {
        self.started.lock().clone()
    }

    fn finish(&self, job_id: &str) {
        self.gate(&JobId::from_string(job_id)).notify_one();
    }
}

#[async_trait]
impl JobRunner for BlockingRunner {
    async fn run(&self, job: Job) {
        let gate = self.gate(&job.id);
        self.started.lock().push(job.id.clone());
        gate.notified().await;
    }
}

fn limits(max_concurrent: usize, max_active_per_user: usize) -> SchedulerLimits {
    SchedulerLimits { max_concurrent, max_active_per_user, max_queued_per_user: 10 }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 1s");
}

#[tokio::test]
async fn fairness_no_user_monopolizes_slots() {
    let runner = Arc::new(BlockingRunner::default());
    let scheduler = Scheduler::new(limits(2, 1), Arc::clone(&runner) as Arc<dyn JobRunner>);

    // Arrival order: U1,U1,U1,U2,U2,U3.
    for (job, user) in [
        ("job-a1", "u1"),
        ("job-a2", "u1"),
        ("job-a3", "u1"),
        ("job-b1", "u2"),
        ("job-b2", "u2"),
        ("job-c1", "u3"),
    ] {
        scheduler.enqueue(Job::queued(job, user, 1));
    }

    // Initial admission: first job of U1 and first of U2.
    wait_until(|| runner.started().len() == 2).await;
    assert_eq!(
        runner.started(),
        vec![JobId::from_string("job-a1"), JobId::from_string("job-b1")]
    );

    // First completion frees a slot: U3 has never been served and wins it,
    // even though U1's next job arrived earlier.
    runner.finish("job-a1");
    wait_until(|| runner.started().len() == 3).await;
    assert_eq!(runner.started()[2], "job-c1");

    // Next completion: U1 is now the least recently served with room.
    runner.finish("job-b1");
    wait_until(|| runner.started().len() == 4).await;
    assert_eq!(runner.started()[3], "job-a2");

    // Then U2's second job, then U1's third.
    runner.finish("job-c1");
    wait_until(|| runner.started().len() == 5).await;
    assert_eq!(runner.started()[4], "job-b2");

    runner.finish("job-a2");
    wait_until(|| runner.started().len() == 6).await;
    assert_eq!(runner.started()[5], "job-a3");

    // No user ever held two active slots.
    runner.finish("job-b2");
    runner.finish("job-a3");
    wait_until(|| scheduler.running_count() == 0).await;
}

#[tokio::test]
async fn per_user_active_cap_holds_even_with_free_slots() {
    let runner = Arc::new(BlockingRunner::default());
    let scheduler = Scheduler::new(limits(4, 1), Arc::clone(&runner) as Arc<dyn JobRunner>);

    assert_eq!(scheduler.enqueue(Job::queued("job-1", "u1", 1)), Admission::Started);
    // Free system slots exist, but u1 is at its per-user cap.
    assert_eq!(scheduler.enqueue(Job::queued("job-2", "u1", 1)), Admission::Queued);

    let status = scheduler.user_status(&UserId::from_string("u1"));
    assert_eq!(status.active, 1);
    assert_eq!(status.queued, 1);

    runner.finish("job-1");
    wait_until(|| runner.started().len() == 2).await;
    runner.finish("job-2");
}

#[tokio::test]
async fn queue_limit_rejects_overflow() {
    let runner = Arc::new(BlockingRunner::default());
    let scheduler = Scheduler::new(
        SchedulerLimits { max_concurrent: 1, max_active_per_user: 1, max_queued_per_user: 1 },
        Arc::clone(&runner) as Arc<dyn JobRunner>,
    );

    assert_eq!(scheduler.enqueue(Job::queued("job-1", "u1", 1)), Admission::Started);
    assert_eq!(scheduler.enqueue(Job::queued("job-2", "u1", 1)), Admission::Queued);
    assert_eq!(
        scheduler.enqueue(Job::queued("job-3", "u1", 1)),
        Admission::Rejected(RejectReason::QueueFull)
    );

    let status = scheduler.user_status(&UserId::from_string("u1"));
    assert!(!status.can_accept());

    runner.finish("job-1");
    wait_until(|| runner.started().len() == 2).await;
    runner.finish("job-2");
}

#[tokio::test]
async fn duplicate_job_ids_are_rejected() {
    let runner = Arc::new(BlockingRunner::default());
    let scheduler = Scheduler::new(limits(2, 2), Arc::clone(&runner) as Arc<dyn JobRunner>);

    assert_eq!(scheduler.enqueue(Job::queued("job-1", "u1", 1)), Admission::Started);
    assert!(scheduler.contains(&JobId::from_string("job-1")));
    assert_eq!(
        scheduler.enqueue(Job::queued("job-1", "u1", 1)),
        Admission::Rejected(RejectReason::Duplicate)
    );

    // Completion forgets the id; a retry is a fresh admission.
    runner.finish("job-1");
    wait_until(|| !scheduler.contains(&JobId::from_string("job-1"))).await;
    assert_eq!(scheduler.enqueue(Job::queued("job-1", "u1", 1)), Admission::Started);
    runner.finish("job-1");
}

#[tokio::test]
async fn system_status_reports_per_user_breakdown() {
    let runner = Arc::new(BlockingRunner::default());
    let scheduler = Scheduler::new(limits(2, 1), Arc::clone(&runner) as Arc<dyn JobRunner>);

    scheduler.enqueue(Job::queued("job-1", "u1", 1));
    scheduler.enqueue(Job::queued("job-2", "u1", 1));
    scheduler.enqueue(Job::queued("job-3", "u2", 1));
    wait_until(|| runner.started().len() == 2).await;

    let status = scheduler.system_status();
    assert_eq!(status.running, 2);
    assert_eq!(status.queued, 1);
    assert_eq!(status.max_concurrent, 2);
    assert_eq!(status.per_user_active[&UserId::from_string("u1")], 1);
    assert_eq!(status.per_user_queued[&UserId::from_string("u1")], 1);

    runner.finish("job-1");
    runner.finish("job-3");
    wait_until(|| runner.started().len() == 3).await;
    runner.finish("job-2");
}
