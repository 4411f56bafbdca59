// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact parser: turns a Harbor trial directory into a normalized
//! episode sequence and a pass/fail tally.
//!
//! Layout under an attempt's output directory:
//!
//! ```text
//! <attemptOutput>/<timestamped-run>/<trial>/
//!   result.json                 (summary; agent info, rewards, timestamps)
//!   agent/trajectory.json       (structured trace, preferred)
//!   agent/oracle.txt            (oracle-agent fallback)
//!   verifier/ctrf.json          (structured test results, preferred)
//!   verifier/test-stdout.txt
//! ```

mod ctrf;
mod recover;
mod trajectory;

pub use recover::{recover_partial, RecoveredTrial};
pub use trajectory::ORACLE_MARKER;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use sv_core::{CommandRun, TestCase};
use thiserror::Error;

/// Errors from artifact parsing. In the normal path these surface to the
/// attempt driver's recovery handler; the recovery parser itself never
/// returns them.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no output directory under {0}")]
    NoRunDir(PathBuf),
    #[error("no trial directory under {0}")]
    NoTrialDir(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// One parsed trajectory step, before it becomes an [`sv_core::Episode`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeDraft {
    pub state_analysis: String,
    pub explanation: String,
    pub commands: Vec<CommandRun>,
    pub duration_ms: Option<i64>,
}

/// Test tally and per-test outcomes for one trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestResults {
    pub passed: i32,
    pub total: i32,
    pub cases: Vec<TestCase>,
    pub rewards: BTreeMap<String, i32>,
}

/// Everything the attempt driver needs from a finished trial.
#[derive(Debug, Clone)]
pub struct ParsedTrial {
    pub trial_dir: PathBuf,
    pub episodes: Vec<EpisodeDraft>,
    pub tests: TestResults,
}

/// Parse a completed attempt's artifacts.
pub fn parse_trial(attempt_output: &Path) -> Result<ParsedTrial, ParseError> {
    let trial_dir = locate_trial_dir(attempt_output)?;
    let tests = ctrf::parse_test_results(&trial_dir)?;
    let episodes = trajectory::parse_episodes(&trial_dir)?;
    Ok(ParsedTrial { trial_dir, episodes, tests })
}

/// Locate the trial directory beneath an attempt's output root.
///
/// Harbor writes one timestamped run directory per invocation; the largest
/// name is the newest run. Within it sits the trial directory.
pub fn locate_trial_dir(attempt_output: &Path) -> Result<PathBuf, ParseError> {
    let run_dir = child_dirs(attempt_output)
        .map_err(|source| ParseError::Io { path: attempt_output.to_path_buf(), source })?
        .into_iter()
        .max()
        .ok_or_else(|| ParseError::NoRunDir(attempt_output.to_path_buf()))?;
    let trial_dir = child_dirs(&run_dir)
        .map_err(|source| ParseError::Io { path: run_dir.clone(), source })?
        .into_iter()
        .min()
        .ok_or_else(|| ParseError::NoTrialDir(run_dir.clone()))?;
    Ok(trial_dir)
}

fn child_dirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

pub(crate) fn read_json(path: &Path) -> Result<serde_json::Value, ParseError> {
    let bytes = std::fs::read(path)
        .map_err(|source| ParseError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_slice(&bytes).map_err(|e| ParseError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
