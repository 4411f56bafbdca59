// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trajectory parsing.
//!
//! Harbor agents produce one of several trace formats; each is modeled as a
//! [`TrajectoryFormat`] variant with its own parser:
//!
//! - ATIF: `schema_version` plus `steps[]` tagged with `source`
//! - legacy steps: `steps[]` with top-level `command`/`observation`/`thought`
//! - legacy actions: `actions[]`
//! - oracle: a bare `agent/oracle.txt` transcript
//! - empty: nothing usable; yields one diagnostic episode

use super::{read_json, EpisodeDraft, ParseError};
use serde_json::Value;
use std::path::Path;
use sv_core::CommandRun;

/// `state_analysis` marker on the synthetic oracle episode.
pub const ORACLE_MARKER: &str = "oracle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EmptyReason {
    AgentDirMissing,
    AgentDirEmpty,
    NoTrajectory,
}

impl EmptyReason {
    fn message(&self) -> &'static str {
        match self {
            EmptyReason::AgentDirMissing => "agent directory missing from trial output",
            EmptyReason::AgentDirEmpty => "agent directory is empty",
            EmptyReason::NoTrajectory => {
                "agent directory present but contains no trajectory"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TrajectoryFormat {
    Atif(Vec<Value>),
    LegacySteps(Vec<Value>),
    LegacyActions(Vec<Value>),
    Oracle(String),
    Empty(EmptyReason),
}

/// Parse the trial's trajectory into episode drafts.
pub(crate) fn parse_episodes(trial_dir: &Path) -> Result<Vec<EpisodeDraft>, ParseError> {
    Ok(episodes_for(detect(trial_dir)?))
}

/// Identify which trajectory format the trial produced.
pub(crate) fn detect(trial_dir: &Path) -> Result<TrajectoryFormat, ParseError> {
    let agent_dir = trial_dir.join("agent");
    if !agent_dir.is_dir() {
        return Ok(TrajectoryFormat::Empty(EmptyReason::AgentDirMissing));
    }

    let trajectory_path = agent_dir.join("trajectory.json");
    if trajectory_path.is_file() {
        let value = read_json(&trajectory_path)?;
        let steps = value.get("steps").and_then(Value::as_array);
        if value.get("schema_version").is_some()
            && steps.is_some_and(|s| s.iter().all(|step| step.get("source").is_some()))
        {
            return Ok(TrajectoryFormat::Atif(steps.cloned().unwrap_or_default()));
        }
        if let Some(steps) = steps {
            return Ok(TrajectoryFormat::LegacySteps(steps.clone()));
        }
        if let Some(actions) = value.get("actions").and_then(Value::as_array) {
            return Ok(TrajectoryFormat::LegacyActions(actions.clone()));
        }
        return Err(ParseError::Malformed {
            path: trajectory_path,
            message: "neither steps[] nor actions[] present".to_string(),
        });
    }

    let oracle_path = agent_dir.join("oracle.txt");
    if oracle_path.is_file() {
        let contents = std::fs::read_to_string(&oracle_path)
            .map_err(|source| ParseError::Io { path: oracle_path.clone(), source })?;
        if !contents.trim().is_empty() {
            return Ok(TrajectoryFormat::Oracle(contents));
        }
    }

    let empty = std::fs::read_dir(&agent_dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true);
    if empty {
        Ok(TrajectoryFormat::Empty(EmptyReason::AgentDirEmpty))
    } else {
        Ok(TrajectoryFormat::Empty(EmptyReason::NoTrajectory))
    }
}

/// Produce episode drafts for a detected format.
pub(crate) fn episodes_for(format: TrajectoryFormat) -> Vec<EpisodeDraft> {
    match format {
        TrajectoryFormat::Atif(steps) => parse_atif(&steps),
        TrajectoryFormat::LegacySteps(steps) => parse_legacy_steps(&steps),
        TrajectoryFormat::LegacyActions(actions) => parse_legacy_actions(&actions),
        TrajectoryFormat::Oracle(contents) => vec![EpisodeDraft {
            state_analysis: ORACLE_MARKER.to_string(),
            explanation: String::new(),
            commands: vec![CommandRun {
                command: "oracle".to_string(),
                output: contents,
                exit_code: Some(0),
            }],
            duration_ms: None,
        }],
        TrajectoryFormat::Empty(reason) => vec![EpisodeDraft {
            state_analysis: "no trajectory recorded".to_string(),
            explanation: reason.message().to_string(),
            commands: Vec::new(),
            duration_ms: None,
        }],
    }
}

/// ATIF: each agent step with a message opens an episode; bash tool calls
/// become its commands; following system steps append terminal output to the
/// most recent command.
fn parse_atif(steps: &[Value]) -> Vec<EpisodeDraft> {
    let mut episodes: Vec<EpisodeDraft> = Vec::new();
    for step in steps {
        match step.get("source").and_then(Value::as_str) {
            Some("agent") => {
                if let Some(message) = step.get("message").and_then(Value::as_str) {
                    let analysis = extract_section(message, "Analysis:");
                    let plan = extract_section(message, "Plan:");
                    let explanation = match (&analysis, plan) {
                        (_, Some(plan)) => plan,
                        // No recognizable headings: keep the raw message.
                        (None, None) => message.to_string(),
                        (Some(_), None) => String::new(),
                    };
                    episodes.push(EpisodeDraft {
                        state_analysis: analysis.unwrap_or_default(),
                        explanation,
                        commands: Vec::new(),
                        duration_ms: None,
                    });
                }
                if let Some(calls) = step.get("tool_calls").and_then(Value::as_array) {
                    if episodes.is_empty() {
                        episodes.push(EpisodeDraft::default());
                    }
                    // Just pushed or pre-existing; never empty here.
                    if let Some(current) = episodes.last_mut() {
                        for call in calls {
                            let is_bash = call.get("function_name").and_then(Value::as_str)
                                == Some("bash_command");
                            if !is_bash {
                                continue;
                            }
                            if let Some(keystrokes) = tool_call_keystrokes(call) {
                                current.commands.push(CommandRun::new(keystrokes));
                            }
                        }
                    }
                }
            }
            Some("system") => {
                let text = step
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| step.get("observation").and_then(Value::as_str));
                let command = episodes
                    .last_mut()
                    .and_then(|episode| episode.commands.last_mut());
                if let (Some(text), Some(command)) = (text, command) {
                    if command.output.is_empty() {
                        command.output = text.to_string();
                    } else {
                        command.output.push('\n');
                        command.output.push_str(text);
                    }
                }
            }
            _ => {}
        }
    }
    episodes
}

/// `arguments` is either an object or a JSON-encoded string of one.
fn tool_call_keystrokes(call: &Value) -> Option<String> {
    let arguments = call.get("arguments")?;
    let keystrokes = match arguments {
        Value::String(encoded) => serde_json::from_str::<Value>(encoded)
            .ok()?
            .get("keystrokes")?
            .as_str()
            .map(str::to_string),
        _ => arguments.get("keystrokes")?.as_str().map(str::to_string),
    };
    keystrokes
}

/// Legacy steps: one episode per step, one command per episode.
fn parse_legacy_steps(steps: &[Value]) -> Vec<EpisodeDraft> {
    steps
        .iter()
        .map(|step| {
            let mut commands = Vec::new();
            if let Some(command) = step.get("command").and_then(Value::as_str) {
                commands.push(CommandRun {
                    command: command.to_string(),
                    output: step
                        .get("observation")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    exit_code: step
                        .get("exit_code")
                        .and_then(Value::as_i64)
                        .map(|c| c as i32),
                });
            }
            EpisodeDraft {
                state_analysis: step
                    .get("thought")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                explanation: String::new(),
                commands,
                duration_ms: step.get("duration_ms").and_then(Value::as_i64),
            }
        })
        .collect()
}

/// Legacy actions: one episode per action.
fn parse_legacy_actions(actions: &[Value]) -> Vec<EpisodeDraft> {
    actions
        .iter()
        .map(|action| {
            let (command, output) = match action {
                Value::String(command) => (command.clone(), String::new()),
                _ => (
                    action
                        .get("command")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    action
                        .get("output")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                ),
            };
            EpisodeDraft {
                state_analysis: String::new(),
                explanation: String::new(),
                commands: vec![CommandRun { command, output, exit_code: None }],
                duration_ms: None,
            }
        })
        .collect()
}

/// Pull the text under a `Heading:` line (or inline after it), stopping at
/// the next heading-looking line.
fn extract_section(message: &str, heading: &str) -> Option<String> {
    let mut collected: Vec<&str> = Vec::new();
    let mut found = false;
    for line in message.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(heading) {
            found = true;
            let rest = rest.trim_start();
            if !rest.is_empty() {
                collected.push(rest);
            }
            continue;
        }
        if found {
            if is_heading(trimmed) {
                break;
            }
            collected.push(trimmed);
        }
    }
    if !found {
        return None;
    }
    Some(collected.join("\n").trim().to_string())
}

/// A short capitalized line ending in a colon reads as a section heading.
fn is_heading(line: &str) -> bool {
    line.len() <= 40
        && line.ends_with(':')
        && line.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && !line[..line.len() - 1].contains(':')
}

#[cfg(test)]
#[path = "trajectory_tests.rs"]
mod tests;
