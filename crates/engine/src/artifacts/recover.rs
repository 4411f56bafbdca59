// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partial-data recovery: the defensive parser used when an attempt errors.
//!
//! Runs the same location and parsing steps as [`super::parse_trial`] but
//! tolerates every failure, and mirrors whatever trial directory exists to
//! the object store so the UI can still inspect it. Never returns an error.

use super::{ctrf, locate_trial_dir, trajectory, EpisodeDraft, TestResults};
use std::path::Path;
use std::sync::Arc;
use sv_adapters::ObjectStore;

/// Whatever could be salvaged from a failed attempt.
#[derive(Debug, Clone, Default)]
pub struct RecoveredTrial {
    pub episodes: Vec<EpisodeDraft>,
    pub tests: TestResults,
    /// URI of the mirrored trial directory, when the upload succeeded.
    pub log_path: Option<String>,
}

pub async fn recover_partial(
    attempt_output: &Path,
    objstore: &Arc<dyn ObjectStore>,
    upload_prefix: &str,
) -> RecoveredTrial {
    let mut recovered = RecoveredTrial::default();

    let trial_dir = match locate_trial_dir(attempt_output) {
        Ok(dir) => dir,
        Err(e) => {
            tracing::debug!(output = %attempt_output.display(), error = %e, "nothing to recover");
            return recovered;
        }
    };

    match ctrf::parse_test_results(&trial_dir) {
        Ok(tests) => recovered.tests = tests,
        Err(e) => tracing::debug!(error = %e, "test results unrecoverable"),
    }
    match trajectory::parse_episodes(&trial_dir) {
        Ok(episodes) => recovered.episodes = episodes,
        Err(e) => tracing::debug!(error = %e, "trajectory unrecoverable"),
    }

    let prefix = upload_prefix.trim_end_matches('/');
    match objstore.put_directory(&trial_dir, prefix).await {
        Ok(urls) => {
            tracing::info!(prefix, files = urls.len(), "recovered trial directory uploaded");
            recovered.log_path = Some(objstore.url_for(prefix));
        }
        Err(e) => tracing::warn!(prefix, error = %e, "recovered trial upload failed"),
    }

    recovered
}
