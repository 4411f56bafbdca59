// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fair scheduler: multi-tenant job admission.
//!
//! Three limits bound the system: total running jobs, running jobs per user,
//! and queued jobs per user. Jobs start immediately when both concurrency
//! limits have room; otherwise they wait in their owner's FIFO. When a job
//! completes, the freed slot goes to the least-recently-served user with
//! queued work, so a user with a deep queue cannot starve one waiting on a
//! single job.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use sv_core::{Job, JobId, UserId};

/// Executes an admitted job to completion.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: Job);
}

/// Admission limits.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerLimits {
    pub max_concurrent: usize,
    pub max_active_per_user: usize,
    pub max_queued_per_user: usize,
}

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free; the job is running.
    Started,
    /// Waiting in the owner's queue.
    Queued,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The owner's queue is full.
    QueueFull,
    /// The job is already active or queued here.
    Duplicate,
}

/// One user's view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserQueueStatus {
    pub active: usize,
    pub queued: usize,
    pub max_active: usize,
    pub max_queued: usize,
}

impl UserQueueStatus {
    /// Whether an enqueue for this user could be accepted right now.
    pub fn can_accept(&self) -> bool {
        self.queued < self.max_queued
    }
}

/// Snapshot of the whole scheduler.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub running: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub per_user_active: BTreeMap<UserId, usize>,
    pub per_user_queued: BTreeMap<UserId, usize>,
}

#[derive(Default)]
struct SchedState {
    /// Running jobs and their owners.
    active: HashMap<JobId, UserId>,
    /// Waiting jobs, FIFO per owner.
    queues: HashMap<UserId, VecDeque<Job>>,
    /// Everything active or queued, for duplicate suppression.
    known: HashSet<JobId>,
    /// Admission counter per user; lowest wins promotion.
    last_served: HashMap<UserId, u64>,
    serve_seq: u64,
    /// First time a user queued work; breaks promotion ties by arrival.
    arrivals: HashMap<UserId, u64>,
    arrival_seq: u64,
}

impl SchedState {
    fn active_for(&self, user: &UserId) -> usize {
        self.active.values().filter(|u| *u == user).count()
    }

    fn queued_for(&self, user: &UserId) -> usize {
        self.queues.get(user).map_or(0, VecDeque::len)
    }

    fn mark_served(&mut self, user: &UserId) {
        self.serve_seq += 1;
        self.last_served.insert(user.clone(), self.serve_seq);
    }

    fn note_arrival(&mut self, user: &UserId) {
        if !self.arrivals.contains_key(user) {
            self.arrival_seq += 1;
            self.arrivals.insert(user.clone(), self.arrival_seq);
        }
    }
}

pub struct Scheduler {
    limits: SchedulerLimits,
    runner: Arc<dyn JobRunner>,
    state: Mutex<SchedState>,
}

impl Scheduler {
    pub fn new(limits: SchedulerLimits, runner: Arc<dyn JobRunner>) -> Arc<Self> {
        Arc::new(Self { limits, runner, state: Mutex::new(SchedState::default()) })
    }

    /// Admit a job: start it now, queue it, or reject it.
    pub fn enqueue(self: &Arc<Self>, job: Job) -> Admission {
        let decision = {
            let mut state = self.state.lock();
            if state.known.contains(&job.id) {
                return Admission::Rejected(RejectReason::Duplicate);
            }
            let user = job.owner_id.clone();
            if state.active.len() < self.limits.max_concurrent
                && state.active_for(&user) < self.limits.max_active_per_user
            {
                state.known.insert(job.id.clone());
                state.active.insert(job.id.clone(), user.clone());
                state.mark_served(&user);
                Admission::Started
            } else if state.queued_for(&user) < self.limits.max_queued_per_user {
                state.known.insert(job.id.clone());
                state.note_arrival(&user);
                state.queues.entry(user).or_default().push_back(job.clone());
                Admission::Queued
            } else {
                Admission::Rejected(RejectReason::QueueFull)
            }
        };
        match decision {
            Admission::Started => {
                tracing::info!(job_id = %job.id, owner = %job.owner_id, "job admitted");
                self.spawn_job(job);
            }
            Admission::Queued => {
                tracing::info!(job_id = %job.id, owner = %job.owner_id, "job queued");
            }
            Admission::Rejected(reason) => {
                tracing::warn!(job_id = %job.id, owner = %job.owner_id, ?reason, "job rejected");
            }
        }
        decision
    }

    /// True when the scheduler already tracks this job (active or queued).
    pub fn contains(&self, job_id: &JobId) -> bool {
        self.state.lock().known.contains(job_id)
    }

    pub fn user_status(&self, user: &UserId) -> UserQueueStatus {
        let state = self.state.lock();
        UserQueueStatus {
            active: state.active_for(user),
            queued: state.queued_for(user),
            max_active: self.limits.max_active_per_user,
            max_queued: self.limits.max_queued_per_user,
        }
    }

    pub fn system_status(&self) -> SystemStatus {
        let state = self.state.lock();
        let mut per_user_active: BTreeMap<UserId, usize> = BTreeMap::new();
        for user in state.active.values() {
            *per_user_active.entry(user.clone()).or_default() += 1;
        }
        let per_user_queued: BTreeMap<UserId, usize> = state
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(user, q)| (user.clone(), q.len()))
            .collect();
        SystemStatus {
            running: state.active.len(),
            queued: per_user_queued.values().sum(),
            max_concurrent: self.limits.max_concurrent,
            per_user_active,
            per_user_queued,
        }
    }

    /// Number of running jobs, for shutdown draining.
    pub fn running_count(&self) -> usize {
        self.state.lock().active.len()
    }

    fn spawn_job(self: &Arc<Self>, job: Job) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let job_id = job.id.clone();
            scheduler.runner.run(job).await;
            scheduler.on_complete(&job_id);
        });
    }

    /// A job finished: free its slot and promote queued work.
    fn on_complete(self: &Arc<Self>, job_id: &JobId) {
        let promoted = {
            let mut state = self.state.lock();
            state.active.remove(job_id);
            state.known.remove(job_id);

            let mut promoted = Vec::new();
            while state.active.len() < self.limits.max_concurrent {
                let Some(user) = self.next_user_to_serve(&state) else {
                    break;
                };
                let Some(job) = state.queues.get_mut(&user).and_then(VecDeque::pop_front)
                else {
                    break;
                };
                state.active.insert(job.id.clone(), user.clone());
                state.mark_served(&user);
                promoted.push(job);
            }
            promoted
        };
        for job in promoted {
            tracing::info!(job_id = %job.id, owner = %job.owner_id, "job promoted from queue");
            self.spawn_job(job);
        }
    }

    /// The least-recently-served user with queued work and per-user room.
    /// Users never served rank first (counter 0), then FIFO by admission age.
    fn next_user_to_serve(&self, state: &SchedState) -> Option<UserId> {
        state
            .queues
            .iter()
            .filter(|(user, queue)| {
                !queue.is_empty() && state.active_for(user) < self.limits.max_active_per_user
            })
            .map(|(user, _)| user)
            .min_by_key(|user| {
                (
                    state.last_served.get(*user).copied().unwrap_or(0),
                    state.arrivals.get(*user).copied().unwrap_or(u64::MAX),
                )
            })
            .cloned()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
