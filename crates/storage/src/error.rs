// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store errors and transient-failure retry.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("malformed row: {0}")]
    InvalidRow(String),
}

/// Retry ceiling for transient failures.
const MAX_ATTEMPTS: u32 = 4;

/// Initial backoff; doubles per retry (100ms, 200ms, 400ms).
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// True for failures worth retrying: connection drops and pool exhaustion.
/// Constraint violations and query errors are not transient.
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
    )
}

/// Run `f`, retrying transient failures with exponential backoff.
///
/// Unrecoverable errors and exhausted retries surface as [`StoreError`].
pub(crate) async fn with_retry<T, F, Fut>(op: &'static str, f: F) -> Result<T, StoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < MAX_ATTEMPTS && is_transient(&e) => {
                tracing::warn!(op, attempt, error = %e, "transient store error, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(StoreError::Database(e)),
        }
    }
}
