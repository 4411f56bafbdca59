// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job driver: the per-job lifecycle.
//!
//! Download and extract the task archive, prebuild the container image,
//! fan N attempts out under the per-job semaphore, then settle the job's
//! terminal status. The scratch directory and registry entry are cleaned up
//! unconditionally.

use crate::error::EngineError;
use crate::worker::Worker;
use chrono::Utc;
use std::path::{Path, PathBuf};
use sv_core::{
    object_key, AttemptStatus, Job, JobId, JobStatus, CANCELLED_BY_USER,
};
use sv_storage::AttemptUpdate;
use tokio::sync::Semaphore;

impl Worker {
    /// Supervise one job from admission to terminal status.
    pub async fn run_job(&self, job: &Job) {
        self.registry.register(&job.id, &job.task_name);
        let work_dir = self.config.work_dir.join(job.id.as_str());

        match self.drive_job(job, &work_dir).await {
            Ok(()) => {
                tracing::info!(job_id = %job.id, "job completed");
            }
            Err(EngineError::Cancelled) => {
                tracing::info!(job_id = %job.id, "job cancelled");
                self.settle_failed(&job.id, CANCELLED_BY_USER).await;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "job failed");
                // Cancellation observed while erroring wins the message.
                if self.registry.is_cancelled(&job.id) {
                    self.settle_failed(&job.id, CANCELLED_BY_USER).await;
                } else {
                    self.settle_failed(&job.id, &e.to_string()).await;
                }
            }
        }

        self.registry.unregister(&job.id);
        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(job_id = %job.id, error = %e, "failed to remove work directory");
            }
        }
    }

    async fn settle_failed(&self, job_id: &JobId, message: &str) {
        if let Err(e) = self
            .store
            .update_job_status(job_id, JobStatus::Failed, Some(message))
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "failed to record job failure");
        }
    }

    async fn drive_job(&self, job: &Job, work_dir: &Path) -> Result<(), EngineError> {
        self.store
            .update_job_status(&job.id, JobStatus::Running, None)
            .await?;

        if self.oracle.is_cancelled(&job.id).await {
            return Err(EngineError::Cancelled);
        }

        // Stale scratch from a previous worker's crash is useless; start clean.
        if work_dir.exists() {
            tokio::fs::remove_dir_all(work_dir).await?;
        }
        tokio::fs::create_dir_all(work_dir).await?;

        let key = object_key(&job.zip_location)?;
        let bytes = self.objstore.get(&key).await?;
        let zip_path = work_dir.join("task.zip");
        tokio::fs::write(&zip_path, &bytes).await?;
        let extract_dir = work_dir.join("task");
        extract_zip(zip_path.clone(), extract_dir.clone()).await?;
        tokio::fs::remove_file(&zip_path).await?;

        let task_root = locate_task_root(&extract_dir)?;
        tracing::info!(
            job_id = %job.id,
            task_root = %task_root.display(),
            runs = job.runs_requested,
            "task extracted"
        );

        self.prebuild_image(&job.task_name, &task_root).await;

        let semaphore = Semaphore::new(self.config.attempts_per_job);
        let attempts = (0..job.runs_requested)
            .map(|index| self.run_attempt(job, index, &task_root, work_dir, &semaphore));
        // One attempt's failure must not abort its siblings.
        futures_util::future::join_all(attempts).await;

        if self.registry.is_cancelled(&job.id) || self.oracle.is_cancelled(&job.id).await {
            self.demote_after_cancel(&job.id).await;
            return Err(EngineError::Cancelled);
        }

        self.store
            .update_job_status(&job.id, JobStatus::Completed, None)
            .await?;
        Ok(())
    }

    /// Post-cancellation sweep: fail any attempt still `running`, and demote
    /// any `success` written in the race window between the last checkpoint
    /// and finalization.
    async fn demote_after_cancel(&self, job_id: &JobId) {
        let attempts = match self.store.list_attempts_by_job(job_id).await {
            Ok(attempts) => attempts,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "cancel sweep could not list attempts");
                return;
            }
        };
        for attempt in attempts {
            if !matches!(attempt.status, AttemptStatus::Running | AttemptStatus::Success) {
                continue;
            }
            if attempt.status == AttemptStatus::Success {
                tracing::info!(
                    attempt_id = %attempt.id,
                    "demoting raced success to failed after cancellation"
                );
            }
            let update = AttemptUpdate {
                status: AttemptStatus::Failed,
                tests_passed: attempt.tests_passed,
                tests_total: attempt.tests_total,
                reward_summary: attempt.reward_summary.clone(),
                log_path: None,
                finished_at: attempt.finished_at.unwrap_or_else(Utc::now),
                metadata: None,
            };
            if let Err(e) = self.store.update_attempt(&attempt.id, update).await {
                tracing::warn!(attempt_id = %attempt.id, error = %e, "cancel sweep update failed");
            }
        }
    }

    /// Best-effort image prebuild so N attempts share one build instead of
    /// racing `docker build` inside the agent.
    async fn prebuild_image(&self, task_name: &str, task_root: &Path) {
        let env_dockerfile = task_root.join("environment/Dockerfile");
        let dockerfile = if env_dockerfile.is_file() {
            env_dockerfile
        } else {
            let flat = task_root.join("Dockerfile");
            if !flat.is_file() {
                tracing::debug!(task = task_name, "no Dockerfile, skipping image prebuild");
                return;
            }
            flat
        };

        let tag = format!("hb__{}:latest", sanitize_task_name(task_name));
        match self.containers.build_image(&dockerfile, &tag, task_root).await {
            Ok(()) => {
                tracing::info!(tag, "task image prebuilt");
                if let Err(e) = rewrite_task_toml(task_root, &tag) {
                    tracing::warn!(error = %e, "failed to record prebuilt image in task.toml");
                }
            }
            Err(e) => {
                tracing::warn!(tag, error = %e, "image prebuild failed, agent will build on demand");
            }
        }
    }
}

/// Unpack the task archive off the async runtime.
async fn extract_zip(zip_path: PathBuf, dest: PathBuf) -> Result<(), EngineError> {
    tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
        let file = std::fs::File::open(&zip_path)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| EngineError::Archive(e.to_string()))?;
        archive
            .extract(&dest)
            .map_err(|e| EngineError::Archive(e.to_string()))?;
        Ok(())
    })
    .await
    .map_err(|e| EngineError::Archive(format!("extract task failed: {e}")))?
}

/// The task root is wherever `task.toml` lives: the extract root itself, or
/// the first direct subdirectory carrying one (zips often wrap a folder).
fn locate_task_root(extract_dir: &Path) -> Result<PathBuf, EngineError> {
    if extract_dir.join("task.toml").is_file() {
        return Ok(extract_dir.to_path_buf());
    }
    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(extract_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();
    subdirs
        .into_iter()
        .find(|dir| dir.join("task.toml").is_file())
        .ok_or_else(|| {
            EngineError::TaskLayout(format!(
                "no task.toml found under {}",
                extract_dir.display()
            ))
        })
}

/// Container tags allow a narrower alphabet than task names.
fn sanitize_task_name(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    sanitized.trim_matches('-').to_string()
}

/// Point the task at the prebuilt image so every attempt reuses it.
fn rewrite_task_toml(task_root: &Path, image: &str) -> Result<(), EngineError> {
    let path = task_root.join("task.toml");
    let text = std::fs::read_to_string(&path)?;
    let mut table: toml::Table = text
        .parse()
        .map_err(|e| EngineError::TaskLayout(format!("task.toml: {e}")))?;
    let environment = table
        .entry("environment".to_string())
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    if let toml::Value::Table(environment) = environment {
        environment.insert(
            "docker_image".to_string(),
            toml::Value::String(image.to_string()),
        );
    }
    let rendered = toml::to_string(&table)
        .map_err(|e| EngineError::TaskLayout(format!("task.toml: {e}")))?;
    std::fs::write(&path, rendered)?;
    Ok(())
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
