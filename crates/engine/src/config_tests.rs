// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn throttled_models_get_reduced_attempt_cap() {
    assert_eq!(default_attempt_cap(Some("claude-opus-4"), 10), 5);
    assert_eq!(default_attempt_cap(Some("sonnet-4"), 10), 10);
    assert_eq!(default_attempt_cap(None, 10), 10);
}

#[test]
fn defaults_match_documented_values() {
    let config = WorkerConfig::default();
    assert_eq!(config.poll_interval, Duration::from_secs(5));
    assert_eq!(config.attempts_per_job, 10);
    assert_eq!(config.harbor_timeout, Duration::from_secs(1800));
    assert_eq!(config.cancel_poll_interval, Duration::from_secs(2));
    assert_eq!(config.log_upload_interval, Duration::from_secs(30));
    assert_eq!(config.stagger_step, Duration::from_millis(500));
}
