// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sv_core::AgentKind;

fn request(agent: AgentKind, model: Option<&str>) -> LaunchRequest {
    LaunchRequest {
        task_root: PathBuf::from("/work/job-1/task"),
        agent,
        model: model.map(str::to_string),
        jobs_dir: PathBuf::from("/work/job-1/attempt-0"),
        timeout: Duration::from_secs(60),
        log_prefix: "results/job-1/attempt-0".to_string(),
        cancel: CancellationToken::new(),
        on_spawn: None,
    }
}

#[test]
fn args_for_terminus_with_model() {
    let args = build_args(&request(AgentKind::Terminus2, Some("sonnet-4")));
    assert_eq!(
        args,
        vec![
            "run",
            "--path",
            "/work/job-1/task",
            "--agent",
            "terminus-2",
            "--model",
            "sonnet-4",
            "--ak",
            "reasoning_effort=medium",
            "--env",
            "docker",
            "--jobs-dir",
            "/work/job-1/attempt-0",
            "--n-concurrent",
            "1",
        ]
    );
}

#[test]
fn oracle_ignores_model() {
    let args = build_args(&request(AgentKind::Oracle, Some("sonnet-4")));
    assert!(!args.contains(&"--model".to_string()));
    assert!(args.contains(&"oracle".to_string()));
}

#[test]
fn terminus_without_model_omits_model_flags() {
    let args = build_args(&request(AgentKind::Terminus2, None));
    assert!(!args.contains(&"--model".to_string()));
    assert!(!args.contains(&"--ak".to_string()));
}

#[test]
fn non_zero_error_previews_stderr_tail() {
    let err = LaunchError::NonZero {
        code: 2,
        stdout: String::new(),
        stderr: format!("{}FATAL: boom", "x".repeat(1000)),
    };
    let msg = err.to_string();
    assert!(msg.contains("code 2"));
    assert!(msg.contains("FATAL: boom"));
    assert!(msg.len() < 600);
}

#[tokio::test]
async fn fake_launcher_records_and_delegates() {
    let launcher = FakeLauncher::new(|req| {
        Ok(AgentOutput {
            stdout: format!("ran {}", req.log_prefix),
            stderr: String::new(),
        })
    });

    let out = launcher
        .run(request(AgentKind::Terminus2, None))
        .await
        .unwrap();
    assert_eq!(out.stdout, "ran results/job-1/attempt-0");

    let launches = launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].agent, AgentKind::Terminus2);
    assert_eq!(launches[0].jobs_dir, PathBuf::from("/work/job-1/attempt-0"));
}
