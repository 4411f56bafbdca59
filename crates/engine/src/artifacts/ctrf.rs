// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test-result parsing: CTRF preferred, `result.json` rewards fallback.

use super::{read_json, ParseError, TestResults};
use std::path::Path;
use sv_core::TestCase;

/// Parse the trial's test results.
///
/// Neither file existing is not an error; the tally is 0/0, which the
/// attempt driver maps to failure (zero tests executed means the suite
/// never ran).
pub(crate) fn parse_test_results(trial_dir: &Path) -> Result<TestResults, ParseError> {
    let ctrf_path = trial_dir.join("verifier/ctrf.json");
    if ctrf_path.is_file() {
        return parse_ctrf(&ctrf_path);
    }
    let result_path = trial_dir.join("result.json");
    if result_path.is_file() {
        return parse_rewards(&result_path);
    }
    Ok(TestResults::default())
}

/// CTRF: `results.summary.{passed, tests}` plus `results.tests[]`.
fn parse_ctrf(path: &Path) -> Result<TestResults, ParseError> {
    let value = read_json(path)?;
    let results = value.get("results").ok_or_else(|| ParseError::Malformed {
        path: path.to_path_buf(),
        message: "missing results".to_string(),
    })?;
    let summary = results.get("summary");
    let passed = summary
        .and_then(|s| s.get("passed"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0) as i32;
    let total = summary
        .and_then(|s| s.get("tests"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0) as i32;

    let mut tests = TestResults { passed, total, ..TestResults::default() };
    if let Some(entries) = results.get("tests").and_then(serde_json::Value::as_array) {
        for entry in entries {
            let name = entry
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unnamed test");
            let passed = entry.get("status").and_then(serde_json::Value::as_str)
                == Some("passed");
            tests.rewards.insert(name.to_string(), i32::from(passed));
            tests.cases.push(if passed {
                TestCase::passed(name)
            } else {
                let message = entry
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string);
                TestCase::failed(name, message)
            });
        }
    }
    Ok(tests)
}

/// Fallback: `result.json.verifier_result.rewards`, a map of test → 0|1.
fn parse_rewards(path: &Path) -> Result<TestResults, ParseError> {
    let value = read_json(path)?;
    let rewards = value
        .get("verifier_result")
        .and_then(|v| v.get("rewards"))
        .and_then(serde_json::Value::as_object);
    let Some(rewards) = rewards else {
        return Ok(TestResults::default());
    };

    let mut tests = TestResults::default();
    for (name, reward) in rewards {
        let passed = reward.as_i64() == Some(1) || reward.as_f64() == Some(1.0);
        tests.total += 1;
        if passed {
            tests.passed += 1;
            tests.cases.push(TestCase::passed(name));
        } else {
            tests.cases.push(TestCase::failed(name, None));
        }
        tests.rewards.insert(name.clone(), i32::from(passed));
    }
    Ok(tests)
}
