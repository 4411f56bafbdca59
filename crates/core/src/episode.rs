// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Episode record: one observable step within an attempt's trajectory.

use crate::id::{AttemptId, EpisodeId};
use serde::{Deserialize, Serialize};

/// One command the agent ran, with the terminal output it observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRun {
    pub command: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl CommandRun {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), output: String::new(), exit_code: None }
    }
}

/// One step of an attempt's trajectory.
///
/// Episode indices are contiguous from 0 within an attempt; rows are created
/// only after the attempt row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub attempt_id: AttemptId,
    pub index: i32,
    /// The agent's analysis of the terminal state before acting.
    pub state_analysis: String,
    /// The agent's stated plan or rationale for this step.
    pub explanation: String,
    pub commands: Vec<CommandRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
