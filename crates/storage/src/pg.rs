// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PostgreSQL-backed [`Store`].
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::{with_retry, StoreError};
use crate::store::{AttemptUpdate, Store};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;
use sv_core::{Attempt, AttemptId, Episode, Job, JobId, JobStatus, UserId};

/// Store gateway over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and verify the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure all tables exist. Cascade deletes run jobs → attempts → episodes.
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                task_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                runs_requested INTEGER NOT NULL,
                runs_completed INTEGER NOT NULL DEFAULT 0,
                zip_location TEXT NOT NULL,
                owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS attempts (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                attempt_index INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                tests_passed INTEGER NOT NULL DEFAULT 0,
                tests_total INTEGER NOT NULL DEFAULT 0,
                started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                finished_at TIMESTAMPTZ,
                reward_summary JSONB NOT NULL DEFAULT '{}'::jsonb,
                log_path TEXT,
                metadata JSONB NOT NULL DEFAULT 'null'::jsonb,
                UNIQUE (job_id, attempt_index)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                attempt_id TEXT NOT NULL REFERENCES attempts(id) ON DELETE CASCADE,
                episode_index INTEGER NOT NULL,
                state_analysis TEXT NOT NULL DEFAULT '',
                explanation TEXT NOT NULL DEFAULT '',
                commands JSONB NOT NULL DEFAULT '[]'::jsonb,
                duration_ms BIGINT,
                metadata JSONB NOT NULL DEFAULT 'null'::jsonb,
                UNIQUE (attempt_id, episode_index)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("database schema verified");
        Ok(())
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Job {
        id: JobId::from_string(row.try_get::<String, _>("id")?),
        task_name: row.try_get("task_name")?,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::InvalidRow(e.to_string()))?,
        runs_requested: row.try_get("runs_requested")?,
        runs_completed: row.try_get("runs_completed")?,
        zip_location: row.try_get("zip_location")?,
        owner_id: UserId::from_string(row.try_get::<String, _>("owner_id")?),
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn attempt_from_row(row: &PgRow) -> Result<Attempt, StoreError> {
    let status: String = row.try_get("status")?;
    let rewards: serde_json::Value = row.try_get("reward_summary")?;
    let reward_summary: BTreeMap<String, i32> = serde_json::from_value(rewards)
        .map_err(|e| StoreError::InvalidRow(format!("reward_summary: {e}")))?;
    Ok(Attempt {
        id: AttemptId::from_string(row.try_get::<String, _>("id")?),
        job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
        index: row.try_get("attempt_index")?,
        status: status
            .parse()
            .map_err(|e: sv_core::macros::UnknownVariant| StoreError::InvalidRow(e.to_string()))?,
        tests_passed: row.try_get("tests_passed")?,
        tests_total: row.try_get("tests_total")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        reward_summary,
        log_path: row.try_get("log_path")?,
        metadata: row.try_get("metadata")?,
    })
}

const JOB_COLUMNS: &str = "id, task_name, status, runs_requested, runs_completed, \
     zip_location, owner_id, error_message, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, job_id, attempt_index, status, tests_passed, tests_total, \
     started_at, finished_at, reward_summary, log_path, metadata";

#[async_trait]
impl Store for PgStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let row = with_retry("get_job", || {
            let pool = self.pool.clone();
            let id = id.as_str().to_string();
            async move {
                sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&pool)
                    .await
            }
        })
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_queued_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let rows = with_retry("list_queued_jobs", || {
            let pool = self.pool.clone();
            async move {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'queued' ORDER BY created_at"
                ))
                .fetch_all(&pool)
                .await
            }
        })
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn update_job_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        with_retry("update_job_status", || {
            let pool = self.pool.clone();
            let id = id.as_str().to_string();
            let message = error_message.map(str::to_string);
            async move {
                sqlx::query(
                    "UPDATE jobs SET status = $2, error_message = $3, updated_at = now() \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(status.as_str())
                .bind(message)
                .execute(&pool)
                .await
            }
        })
        .await?;
        Ok(())
    }

    async fn increment_job_progress(&self, id: &JobId) -> Result<(), StoreError> {
        with_retry("increment_job_progress", || {
            let pool = self.pool.clone();
            let id = id.as_str().to_string();
            async move {
                sqlx::query(
                    "UPDATE jobs SET runs_completed = runs_completed + 1, updated_at = now() \
                     WHERE id = $1",
                )
                .bind(id)
                .execute(&pool)
                .await
            }
        })
        .await?;
        Ok(())
    }

    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        with_retry("create_attempt", || {
            let pool = self.pool.clone();
            let attempt = attempt.clone();
            async move {
                sqlx::query(
                    "INSERT INTO attempts \
                     (id, job_id, attempt_index, status, tests_passed, tests_total, \
                      started_at, reward_summary, log_path, metadata) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(attempt.id.as_str())
                .bind(attempt.job_id.as_str())
                .bind(attempt.index)
                .bind(attempt.status.as_str())
                .bind(attempt.tests_passed)
                .bind(attempt.tests_total)
                .bind(attempt.started_at)
                .bind(serde_json::json!(attempt.reward_summary))
                .bind(attempt.log_path.clone())
                .bind(attempt.metadata.clone())
                .execute(&pool)
                .await
            }
        })
        .await?;
        Ok(())
    }

    async fn update_attempt(
        &self,
        id: &AttemptId,
        update: AttemptUpdate,
    ) -> Result<(), StoreError> {
        with_retry("update_attempt", || {
            let pool = self.pool.clone();
            let id = id.as_str().to_string();
            let update = update.clone();
            async move {
                sqlx::query(
                    "UPDATE attempts SET status = $2, tests_passed = $3, tests_total = $4, \
                     reward_summary = $5, log_path = COALESCE($6, log_path), \
                     finished_at = $7, metadata = COALESCE($8, metadata) \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(update.status.as_str())
                .bind(update.tests_passed)
                .bind(update.tests_total)
                .bind(serde_json::json!(update.reward_summary))
                .bind(update.log_path)
                .bind(update.finished_at)
                .bind(update.metadata)
                .execute(&pool)
                .await
            }
        })
        .await?;
        Ok(())
    }

    async fn list_attempts_by_job(&self, job_id: &JobId) -> Result<Vec<Attempt>, StoreError> {
        let rows = with_retry("list_attempts_by_job", || {
            let pool = self.pool.clone();
            let job_id = job_id.as_str().to_string();
            async move {
                sqlx::query(&format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE job_id = $1 \
                     ORDER BY attempt_index"
                ))
                .bind(job_id)
                .fetch_all(&pool)
                .await
            }
        })
        .await?;
        rows.iter().map(attempt_from_row).collect()
    }

    async fn create_episode(&self, episode: &Episode) -> Result<(), StoreError> {
        with_retry("create_episode", || {
            let pool = self.pool.clone();
            let episode = episode.clone();
            async move {
                sqlx::query(
                    "INSERT INTO episodes \
                     (id, attempt_id, episode_index, state_analysis, explanation, \
                      commands, duration_ms, metadata) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .bind(episode.id.as_str())
                .bind(episode.attempt_id.as_str())
                .bind(episode.index)
                .bind(episode.state_analysis.clone())
                .bind(episode.explanation.clone())
                .bind(serde_json::json!(episode.commands))
                .bind(episode.duration_ms)
                .bind(episode.metadata.clone())
                .execute(&pool)
                .await
            }
        })
        .await?;
        Ok(())
    }
}
