// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn atif_step(source: &str, message: Option<&str>) -> Value {
    let mut step = json!({ "source": source });
    if let Some(m) = message {
        step["message"] = json!(m);
    }
    step
}

fn bash_call(keystrokes: &str) -> Value {
    json!({
        "function_name": "bash_command",
        "arguments": { "keystrokes": keystrokes }
    })
}

#[test]
fn atif_round_trip_preserves_agent_steps() {
    // Two agent steps with messages → exactly two episodes.
    let mut first = atif_step("agent", Some("Analysis: prompt is empty\nPlan: list files"));
    first["tool_calls"] = json!([bash_call("ls -la\n")]);
    let mut second = atif_step("agent", Some("Analysis: saw files\nPlan: read config"));
    second["tool_calls"] = json!([bash_call("cat config.toml\n")]);

    let steps = vec![
        first,
        atif_step("system", Some("total 4\ndrwxr-xr-x .")),
        atif_step("system", Some("-rw-r--r-- config.toml")),
        second,
        atif_step("system", Some("[server]\nport = 8080")),
    ];

    let episodes = parse_atif(&steps);
    assert_eq!(episodes.len(), 2);

    assert_eq!(episodes[0].state_analysis, "prompt is empty");
    assert_eq!(episodes[0].explanation, "list files");
    assert_eq!(episodes[0].commands.len(), 1);
    assert_eq!(episodes[0].commands[0].command, "ls -la\n");
    // Two observations concatenate with a newline.
    assert_eq!(
        episodes[0].commands[0].output,
        "total 4\ndrwxr-xr-x .\n-rw-r--r-- config.toml"
    );

    assert_eq!(episodes[1].commands[0].command, "cat config.toml\n");
    assert_eq!(episodes[1].commands[0].output, "[server]\nport = 8080");
}

#[test]
fn atif_message_without_headings_is_kept_raw() {
    let steps = vec![atif_step("agent", Some("just thinking out loud"))];
    let episodes = parse_atif(&steps);
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].state_analysis, "");
    assert_eq!(episodes[0].explanation, "just thinking out loud");
}

#[test]
fn atif_agent_step_without_message_attaches_calls_to_previous_episode() {
    let mut opener = atif_step("agent", Some("Plan: two commands"));
    opener["tool_calls"] = json!([bash_call("echo one\n")]);
    let mut follow_up = atif_step("agent", None);
    follow_up["tool_calls"] = json!([bash_call("echo two\n")]);

    let episodes = parse_atif(&[opener, follow_up]);
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].commands.len(), 2);
}

#[test]
fn atif_string_encoded_arguments_parse() {
    let call = json!({
        "function_name": "bash_command",
        "arguments": "{\"keystrokes\": \"pwd\\n\"}"
    });
    assert_eq!(tool_call_keystrokes(&call).as_deref(), Some("pwd\n"));
}

#[test]
fn atif_ignores_non_bash_tool_calls() {
    let mut step = atif_step("agent", Some("Plan: think"));
    step["tool_calls"] = json!([
        { "function_name": "submit", "arguments": {} },
        bash_call("true\n"),
    ]);
    let episodes = parse_atif(&[step]);
    assert_eq!(episodes[0].commands.len(), 1);
    assert_eq!(episodes[0].commands[0].command, "true\n");
}

#[test]
fn legacy_steps_map_one_to_one() {
    let steps = vec![
        json!({ "thought": "check cwd", "command": "pwd", "observation": "/app" }),
        json!({ "thought": "list", "command": "ls", "observation": "src" }),
        json!({ "thought": "done" }),
    ];
    let episodes = parse_legacy_steps(&steps);
    assert_eq!(episodes.len(), 3);
    assert_eq!(episodes[0].state_analysis, "check cwd");
    assert_eq!(episodes[0].commands[0].command, "pwd");
    assert_eq!(episodes[0].commands[0].output, "/app");
    assert!(episodes[2].commands.is_empty());
}

#[test]
fn legacy_actions_map_one_to_one() {
    let actions = vec![
        json!({ "command": "make test", "output": "ok" }),
        json!("git status"),
    ];
    let episodes = parse_legacy_actions(&actions);
    assert_eq!(episodes.len(), 2);
    assert_eq!(episodes[0].commands[0].command, "make test");
    assert_eq!(episodes[1].commands[0].command, "git status");
    assert_eq!(episodes[1].commands[0].output, "");
}

#[test]
fn oracle_fallback_yields_one_episode() {
    let episodes = episodes_for(TrajectoryFormat::Oracle("transcript body".to_string()));
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].state_analysis, ORACLE_MARKER);
    assert_eq!(episodes[0].commands.len(), 1);
    assert_eq!(episodes[0].commands[0].command, "oracle");
    assert_eq!(episodes[0].commands[0].output, "transcript body");
    assert_eq!(episodes[0].commands[0].exit_code, Some(0));
}

#[test]
fn empty_variants_name_the_failure_mode() {
    let episodes = episodes_for(TrajectoryFormat::Empty(EmptyReason::AgentDirMissing));
    assert_eq!(episodes.len(), 1);
    assert!(episodes[0].explanation.contains("missing"));

    let episodes = episodes_for(TrajectoryFormat::Empty(EmptyReason::NoTrajectory));
    assert!(episodes[0].explanation.contains("no trajectory"));
}

#[test]
fn detect_prefers_trajectory_over_oracle() {
    let dir = tempfile::tempdir().unwrap();
    let agent = dir.path().join("agent");
    std::fs::create_dir_all(&agent).unwrap();
    std::fs::write(
        agent.join("trajectory.json"),
        serde_json::to_vec(&json!({
            "schema_version": "1.1",
            "steps": [ { "source": "agent", "message": "Plan: go" } ]
        }))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(agent.join("oracle.txt"), "ignored").unwrap();

    let format = detect(dir.path()).unwrap();
    assert!(matches!(format, TrajectoryFormat::Atif(_)));
}

#[test]
fn detect_legacy_steps_without_schema_version() {
    let dir = tempfile::tempdir().unwrap();
    let agent = dir.path().join("agent");
    std::fs::create_dir_all(&agent).unwrap();
    std::fs::write(
        agent.join("trajectory.json"),
        serde_json::to_vec(&json!({
            "steps": [ { "command": "ls", "observation": "src" } ]
        }))
        .unwrap(),
    )
    .unwrap();

    assert!(matches!(
        detect(dir.path()).unwrap(),
        TrajectoryFormat::LegacySteps(_)
    ));
}

#[test]
fn detect_oracle_and_empty_states() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
        detect(dir.path()).unwrap(),
        TrajectoryFormat::Empty(EmptyReason::AgentDirMissing)
    );

    let agent = dir.path().join("agent");
    std::fs::create_dir_all(&agent).unwrap();
    assert_eq!(
        detect(dir.path()).unwrap(),
        TrajectoryFormat::Empty(EmptyReason::AgentDirEmpty)
    );

    std::fs::write(agent.join("oracle.txt"), "  \n").unwrap();
    assert_eq!(
        detect(dir.path()).unwrap(),
        TrajectoryFormat::Empty(EmptyReason::NoTrajectory)
    );

    std::fs::write(agent.join("oracle.txt"), "solved it").unwrap();
    assert_eq!(
        detect(dir.path()).unwrap(),
        TrajectoryFormat::Oracle("solved it".to_string())
    );
}

#[test]
fn malformed_trajectory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let agent = dir.path().join("agent");
    std::fs::create_dir_all(&agent).unwrap();
    std::fs::write(agent.join("trajectory.json"), b"{not json").unwrap();
    assert!(matches!(
        detect(dir.path()),
        Err(ParseError::Malformed { .. })
    ));
}

#[test]
fn extract_section_handles_inline_and_block_forms() {
    let msg = "Analysis: the build fails\nbecause of a typo\nPlan:\nfix the typo\nthen rerun";
    assert_eq!(
        extract_section(msg, "Analysis:").as_deref(),
        Some("the build fails\nbecause of a typo")
    );
    assert_eq!(
        extract_section(msg, "Plan:").as_deref(),
        Some("fix the typo\nthen rerun")
    );
    assert_eq!(extract_section(msg, "Commands:"), None);
}
