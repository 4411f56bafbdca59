// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attempt driver: the per-attempt lifecycle.
//!
//! Create row → acquire permit → run agent → parse artifacts → persist
//! episodes → upload trial → finalize → count progress. Cancellation is
//! checked before the row is created, after the permit, after parsing, and
//! around the upload; between checkpoints the agent process is signaled
//! pre-emptively and the driver reacts at its next checkpoint.

use crate::artifacts::{self, recover_partial, EpisodeDraft, ParseError};
use crate::worker::Worker;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use sv_adapters::{AgentOutput, GroupKiller, LaunchError, LaunchRequest};
use sv_core::{
    Attempt, AttemptStatus, Episode, EpisodeId, FailureClass, Job, TestCase,
};
use sv_storage::AttemptUpdate;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Substrings in agent output that identify a model rate limit.
const RATE_LIMIT_MARKERS: &[&str] =
    &["RateLimitError", "429", "rate limit", "Rate limit reached"];

/// Synthetic test-case names shown when no real test ran.
const TIMEOUT_CASE: &str = "Execution Timeout";
const RATE_LIMIT_CASE: &str = "API Rate Limit Exceeded";

#[derive(Debug, Error)]
pub(crate) enum AttemptFailure {
    #[error("{0}")]
    Launch(#[from] LaunchError),
    #[error("{0}")]
    Parse(#[from] ParseError),
}

impl AttemptFailure {
    pub(crate) fn class(&self) -> FailureClass {
        match self {
            AttemptFailure::Launch(LaunchError::Cancelled) => FailureClass::Cancelled,
            AttemptFailure::Launch(LaunchError::Timeout(_)) => FailureClass::Timeout,
            AttemptFailure::Launch(LaunchError::NonZero { stdout, stderr, .. })
                if contains_rate_limit(stdout) || contains_rate_limit(stderr) =>
            {
                FailureClass::RateLimit
            }
            _ => FailureClass::Execution,
        }
    }
}

fn contains_rate_limit(text: &str) -> bool {
    RATE_LIMIT_MARKERS.iter().any(|marker| text.contains(marker))
}

fn synthetic_case(class: FailureClass, failure: &AttemptFailure) -> TestCase {
    match class {
        FailureClass::Timeout => TestCase::failed(
            TIMEOUT_CASE,
            Some(format!(
                "The agent was terminated after exceeding its configured timeout: {failure}. \
                 Partial logs and artifacts, where produced, are attached to this attempt."
            )),
        ),
        FailureClass::RateLimit => TestCase::failed(
            RATE_LIMIT_CASE,
            Some(
                "The model API rejected requests with a rate limit. Re-run the job once \
                 the limit clears, or lower the per-job attempt concurrency."
                    .to_string(),
            ),
        ),
        _ => TestCase::failed("Execution Error", Some(failure.to_string())),
    }
}

fn failure_metadata(
    class: FailureClass,
    error: &str,
    cases: &[TestCase],
) -> serde_json::Value {
    json!({
        "failure_class": class,
        "error": error,
        "test_cases": cases,
    })
}

impl Worker {
    /// Drive one attempt to a terminal state. Never propagates errors:
    /// a failed attempt must not disturb its siblings.
    pub(crate) async fn run_attempt(
        &self,
        job: &Job,
        index: i32,
        task_root: &Path,
        work_dir: &Path,
        semaphore: &Semaphore,
    ) {
        if self.oracle.is_cancelled(&job.id).await {
            tracing::debug!(job_id = %job.id, index, "skipping attempt: job cancelled");
            return;
        }

        // Spread attempt starts so N agents don't hit the model API at once.
        if index > 0 {
            tokio::time::sleep(self.config.stagger_step * index as u32).await;
        }

        let Ok(_permit) = semaphore.acquire().await else {
            return;
        };

        let attempt = Attempt::running(job.id.clone(), index);
        if let Err(e) = self.store.create_attempt(&attempt).await {
            tracing::error!(job_id = %job.id, index, error = %e, "failed to create attempt row");
            return;
        }
        self.registry.add_attempt(&job.id, &attempt.id);
        tracing::info!(job_id = %job.id, attempt_id = %attempt.id, index, "attempt started");

        if self.oracle.is_cancelled(&job.id).await {
            self.finalize_cancelled(job, &attempt).await;
            return;
        }

        let output_dir = work_dir.join(format!("attempt-{index}"));
        let log_prefix = format!("results/{}/attempt-{}", job.id, index);

        // The runner observes cancellation through this token; a watcher
        // converges store-side cancellation onto it between checkpoints.
        let cancel = self
            .registry
            .cancel_token(&job.id)
            .unwrap_or_default();
        let watcher_stop = CancellationToken::new();
        let watcher = {
            let oracle = self.oracle.clone();
            let job_id = job.id.clone();
            let cancel = cancel.clone();
            let stop = watcher_stop.clone();
            let interval = self.config.cancel_poll_interval;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {
                            if oracle.is_cancelled(&job_id).await {
                                cancel.cancel();
                                break;
                            }
                        }
                    }
                }
            })
        };

        let killer_slot: Arc<Mutex<Option<GroupKiller>>> = Arc::new(Mutex::new(None));
        let request = LaunchRequest {
            task_root: task_root.to_path_buf(),
            agent: self.config.agent_kind,
            model: self.config.model.clone(),
            jobs_dir: output_dir.clone(),
            timeout: self.config.harbor_timeout,
            log_prefix: log_prefix.clone(),
            cancel: cancel.clone(),
            on_spawn: Some(Box::new({
                let registry = Arc::clone(&self.registry);
                let job_id = job.id.clone();
                let slot = Arc::clone(&killer_slot);
                move |killer| {
                    registry.add_process(&job_id, killer);
                    slot.lock().replace(killer);
                }
            })),
        };

        let launch_result = self.launcher.run(request).await;

        watcher_stop.cancel();
        let _ = watcher.await;
        if let Some(killer) = killer_slot.lock().take() {
            self.registry.remove_process(&job.id, killer);
        }

        let result = match launch_result {
            Ok(output) => {
                self.conclude_attempt(job, &attempt, &output, &output_dir, &log_prefix)
                    .await
            }
            Err(e) => Err(AttemptFailure::from(e)),
        };
        if let Err(failure) = result {
            self.recover_attempt(job, &attempt, &failure, &output_dir, &log_prefix)
                .await;
        }
    }

    /// The post-run half of the happy path: rate-limit scan, parse,
    /// persist episodes, upload the trial, finalize, count progress.
    async fn conclude_attempt(
        &self,
        job: &Job,
        attempt: &Attempt,
        output: &AgentOutput,
        output_dir: &Path,
        log_prefix: &str,
    ) -> Result<(), AttemptFailure> {
        // A zero exit with rate-limit noise in the output means the run was
        // hollow; record 0/1 so the UI never renders "0/0".
        if contains_rate_limit(&output.stdout) || contains_rate_limit(&output.stderr) {
            tracing::warn!(
                job_id = %job.id,
                attempt_id = %attempt.id,
                "rate limit detected in agent output"
            );
            let case = TestCase::failed(
                RATE_LIMIT_CASE,
                Some(
                    "The agent finished but its output shows the model API was rate \
                     limited; results are not trustworthy."
                        .to_string(),
                ),
            );
            let update = AttemptUpdate {
                status: AttemptStatus::Failed,
                tests_passed: 0,
                tests_total: 1,
                reward_summary: Default::default(),
                log_path: None,
                finished_at: Utc::now(),
                metadata: Some(failure_metadata(
                    FailureClass::RateLimit,
                    "rate limit detected in agent output",
                    std::slice::from_ref(&case),
                )),
            };
            if let Err(e) = self.store.update_attempt(&attempt.id, update).await {
                tracing::error!(attempt_id = %attempt.id, error = %e, "failed to finalize attempt");
            }
            self.registry.remove_attempt(&job.id, &attempt.id);
            // Deliberately no progress increment: the run consumed no quota
            // worth counting and upstream retries are expected.
            return Ok(());
        }

        let parsed = artifacts::parse_trial(output_dir)?;
        let status = Attempt::status_for_tally(parsed.tests.passed, parsed.tests.total);

        self.persist_episodes(&attempt.id, &parsed.episodes).await;

        if self.oracle.is_cancelled(&job.id).await {
            self.finalize_cancelled(job, attempt).await;
            return Ok(());
        }

        let log_path = match self
            .objstore
            .put_directory(&parsed.trial_dir, log_prefix)
            .await
        {
            Ok(_) => Some(self.objstore.url_for(log_prefix)),
            Err(e) => {
                tracing::warn!(attempt_id = %attempt.id, error = %e, "trial upload failed");
                None
            }
        };

        if self.oracle.is_cancelled(&job.id).await {
            self.finalize_cancelled(job, attempt).await;
            return Ok(());
        }

        let metadata = (!parsed.tests.cases.is_empty())
            .then(|| json!({ "test_cases": parsed.tests.cases }));
        let update = AttemptUpdate {
            status,
            tests_passed: parsed.tests.passed,
            tests_total: parsed.tests.total,
            reward_summary: parsed.tests.rewards,
            log_path,
            finished_at: Utc::now(),
            metadata,
        };
        if let Err(e) = self.store.update_attempt(&attempt.id, update).await {
            tracing::error!(attempt_id = %attempt.id, error = %e, "failed to finalize attempt");
            self.registry.remove_attempt(&job.id, &attempt.id);
            return Ok(());
        }

        if let Err(e) = self.store.increment_job_progress(&job.id).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to increment job progress");
        }
        self.registry.remove_attempt(&job.id, &attempt.id);
        tracing::info!(
            job_id = %job.id,
            attempt_id = %attempt.id,
            status = %status,
            passed = parsed.tests.passed,
            total = parsed.tests.total,
            "attempt finished"
        );
        Ok(())
    }

    /// Cancellation observed at a checkpoint: terminal failed, no progress.
    async fn finalize_cancelled(&self, job: &Job, attempt: &Attempt) {
        let mut update = AttemptUpdate::terminal(AttemptStatus::Failed);
        update.metadata = Some(failure_metadata(
            FailureClass::Cancelled,
            "Job cancelled",
            &[],
        ));
        if let Err(e) = self.store.update_attempt(&attempt.id, update).await {
            tracing::warn!(attempt_id = %attempt.id, error = %e, "failed to finalize cancelled attempt");
        }
        self.registry.remove_attempt(&job.id, &attempt.id);
        tracing::info!(job_id = %job.id, attempt_id = %attempt.id, "attempt cancelled");
    }

    /// The attempt errored: salvage what exists, classify, finalize.
    async fn recover_attempt(
        &self,
        job: &Job,
        attempt: &Attempt,
        failure: &AttemptFailure,
        output_dir: &Path,
        log_prefix: &str,
    ) {
        let class = failure.class();
        tracing::warn!(
            job_id = %job.id,
            attempt_id = %attempt.id,
            class = %class,
            error = %failure,
            "attempt failed, recovering partial data"
        );

        let recovered = recover_partial(output_dir, &self.objstore, log_prefix).await;
        let mut tests = recovered.tests;
        if tests.total == 0
            && matches!(class, FailureClass::Timeout | FailureClass::RateLimit)
        {
            // Give the UI a named row instead of a bare "0/0".
            tests.passed = 0;
            tests.total = 1;
            tests.cases = vec![synthetic_case(class, failure)];
        }

        let mut episodes = recovered.episodes;
        if episodes.is_empty() {
            episodes.push(EpisodeDraft {
                state_analysis: "attempt aborted".to_string(),
                explanation: format!("{class} failure: {failure}"),
                commands: Vec::new(),
                duration_ms: None,
            });
        }
        self.persist_episodes(&attempt.id, &episodes).await;

        let update = AttemptUpdate {
            status: AttemptStatus::Failed,
            tests_passed: tests.passed,
            tests_total: tests.total,
            reward_summary: tests.rewards,
            log_path: recovered.log_path,
            finished_at: Utc::now(),
            metadata: Some(failure_metadata(class, &failure.to_string(), &tests.cases)),
        };
        if let Err(e) = self.store.update_attempt(&attempt.id, update).await {
            tracing::error!(attempt_id = %attempt.id, error = %e, "failed to finalize attempt");
        }

        if class != FailureClass::Cancelled {
            if let Err(e) = self.store.increment_job_progress(&job.id).await {
                tracing::error!(job_id = %job.id, error = %e, "failed to increment job progress");
            }
        }
        self.registry.remove_attempt(&job.id, &attempt.id);
    }

    /// Persist episode drafts with contiguous indices from 0. A failed
    /// insert stops the sequence so indices never have holes.
    async fn persist_episodes(&self, attempt_id: &sv_core::AttemptId, drafts: &[EpisodeDraft]) {
        for (index, draft) in drafts.iter().enumerate() {
            let episode = Episode {
                id: EpisodeId::new(),
                attempt_id: attempt_id.clone(),
                index: index as i32,
                state_analysis: draft.state_analysis.clone(),
                explanation: draft.explanation.clone(),
                commands: draft.commands.clone(),
                duration_ms: draft.duration_ms,
                metadata: serde_json::Value::Null,
            };
            if let Err(e) = self.store.create_episode(&episode).await {
                tracing::error!(attempt_id = %attempt_id, index, error = %e, "failed to persist episode");
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "attempt_tests.rs"]
mod tests;
