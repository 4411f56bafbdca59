// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poller: feeds queued jobs from the store into the scheduler.

use crate::scheduler::Scheduler;
use std::sync::Arc;
use std::time::Duration;
use sv_storage::Store;
use tokio_util::sync::CancellationToken;

/// Heartbeat cadence, in poll iterations.
const HEARTBEAT_EVERY: u64 = 10;

pub struct Poller {
    store: Arc<dyn Store>,
    scheduler: Arc<Scheduler>,
    interval: Duration,
}

impl Poller {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<Scheduler>, interval: Duration) -> Self {
        Self { store, scheduler, interval }
    }

    /// Poll until shutdown. Per-iteration failures are logged and survived;
    /// a dead store connection heals on a later tick.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(interval = ?self.interval, "poller started");
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            ticks += 1;
            if ticks % HEARTBEAT_EVERY == 0 {
                let status = self.scheduler.system_status();
                tracing::info!(
                    ticks,
                    running = status.running,
                    queued = status.queued,
                    "poller heartbeat"
                );
            }
            self.poll_once().await;
        }
        tracing::info!("poller stopped");
    }

    /// One scan of the queued-jobs table.
    pub async fn poll_once(&self) {
        let jobs = match self.store.list_queued_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(error = %e, "queued-job scan failed");
                return;
            }
        };
        for job in jobs {
            if self.scheduler.contains(&job.id) {
                continue;
            }
            let status = self.scheduler.user_status(&job.owner_id);
            if !status.can_accept() {
                tracing::debug!(
                    job_id = %job.id,
                    owner = %job.owner_id,
                    queued = status.queued,
                    "owner at capacity, leaving job for a later poll"
                );
                continue;
            }
            self.scheduler.enqueue(job);
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
