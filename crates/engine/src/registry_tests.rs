// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn job_id(s: &str) -> JobId {
    JobId::from_string(s)
}

#[test]
fn register_and_snapshot() {
    let registry = ProcessRegistry::new();
    registry.register(&job_id("job-1"), "demo-task");

    let running = registry.get(&job_id("job-1")).unwrap();
    assert_eq!(running.task_name, "demo-task");
    assert!(running.processes.is_empty());
    assert!(!running.cancelled);

    registry.unregister(&job_id("job-1"));
    assert!(registry.get(&job_id("job-1")).is_none());
}

#[test]
fn processes_are_added_and_removed_by_value() {
    let registry = ProcessRegistry::new();
    registry.register(&job_id("job-1"), "demo-task");

    let a = GroupKiller::for_pgid(1_000_001);
    let b = GroupKiller::for_pgid(1_000_002);
    registry.add_process(&job_id("job-1"), a);
    registry.add_process(&job_id("job-1"), b);
    assert!(registry.has_processes(&job_id("job-1")));

    registry.remove_process(&job_id("job-1"), a);
    let running = registry.get(&job_id("job-1")).unwrap();
    assert_eq!(running.processes, vec![b]);
}

#[test]
fn mark_cancelled_fires_the_token_and_snapshots() {
    let registry = ProcessRegistry::new();
    let token = registry.register(&job_id("job-1"), "demo-task");
    registry.add_process(&job_id("job-1"), GroupKiller::for_pgid(1_000_003));

    assert!(!registry.is_cancelled(&job_id("job-1")));
    let snapshot = registry.mark_cancelled(&job_id("job-1")).unwrap();
    assert!(snapshot.cancelled);
    assert_eq!(snapshot.processes.len(), 1);
    assert!(token.is_cancelled());
    assert!(registry.is_cancelled(&job_id("job-1")));
}

#[test]
fn unsupervised_jobs_are_untouchable() {
    let registry = ProcessRegistry::new();
    assert!(registry.mark_cancelled(&job_id("job-ghost")).is_none());
    assert!(!registry.is_cancelled(&job_id("job-ghost")));
    // Adding to an unknown job is a no-op, not an implicit registration.
    registry.add_process(&job_id("job-ghost"), GroupKiller::for_pgid(1_000_004));
    assert!(!registry.has_processes(&job_id("job-ghost")));
}

#[test]
fn attempt_ids_track_unfinalized_attempts() {
    let registry = ProcessRegistry::new();
    registry.register(&job_id("job-1"), "demo-task");
    let attempt = AttemptId::from_string("att-1");
    registry.add_attempt(&job_id("job-1"), &attempt);
    assert!(registry
        .get(&job_id("job-1"))
        .unwrap()
        .attempt_ids
        .contains(&attempt));

    registry.remove_attempt(&job_id("job-1"), &attempt);
    assert!(registry.get(&job_id("job-1")).unwrap().attempt_ids.is_empty());
}
