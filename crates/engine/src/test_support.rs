// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for driver tests.

use crate::config::WorkerConfig;
use crate::worker::Worker;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sv_adapters::{AgentLauncher, FakeContainers, FakeObjectStore};
use sv_storage::FakeStore;

pub(crate) struct Harness {
    pub store: Arc<FakeStore>,
    pub objstore: Arc<FakeObjectStore>,
    pub containers: Arc<FakeContainers>,
    pub worker: Arc<Worker>,
    // Held for its Drop: the worker's scratch space lives inside.
    #[allow(dead_code)]
    pub work_root: tempfile::TempDir,
}

pub(crate) fn test_config(work_dir: &Path) -> WorkerConfig {
    WorkerConfig {
        work_dir: work_dir.to_path_buf(),
        attempts_per_job: 1,
        stagger_step: Duration::ZERO,
        cancel_poll_interval: Duration::from_millis(10),
        log_upload_interval: Duration::from_millis(50),
        ..WorkerConfig::default()
    }
}

pub(crate) fn harness(launcher: Arc<dyn AgentLauncher>) -> Harness {
    let work_root = tempfile::tempdir().unwrap();
    harness_with_config(launcher, test_config(work_root.path()), work_root)
}

pub(crate) fn harness_with_config(
    launcher: Arc<dyn AgentLauncher>,
    config: WorkerConfig,
    work_root: tempfile::TempDir,
) -> Harness {
    let store = Arc::new(FakeStore::new());
    let objstore = Arc::new(FakeObjectStore::default());
    let containers = Arc::new(FakeContainers::new());
    let worker = Worker::new(
        Arc::clone(&store) as Arc<dyn sv_storage::Store>,
        Arc::clone(&objstore) as Arc<dyn sv_adapters::ObjectStore>,
        Arc::clone(&containers) as Arc<dyn sv_adapters::Containers>,
        launcher,
        config,
    );
    Harness { store, objstore, containers, worker, work_root }
}

/// Write a complete trial tree under an attempt's output directory:
/// `episodes` ATIF agent steps and a CTRF file tallying `passed`/`total`.
pub(crate) fn write_trial(jobs_dir: &Path, passed: i64, total: i64, episodes: usize) {
    let trial = jobs_dir.join("2026-01-01T00-00-00").join("trial-0");
    std::fs::create_dir_all(trial.join("agent")).unwrap();
    std::fs::create_dir_all(trial.join("verifier")).unwrap();

    let steps: Vec<serde_json::Value> = (0..episodes)
        .flat_map(|i| {
            [
                json!({
                    "source": "agent",
                    "message": format!("Analysis: step {i}\nPlan: run command {i}"),
                    "tool_calls": [{
                        "function_name": "bash_command",
                        "arguments": { "keystrokes": format!("echo step-{i}\n") }
                    }]
                }),
                json!({ "source": "system", "message": format!("step-{i}") }),
            ]
        })
        .collect();
    std::fs::write(
        trial.join("agent/trajectory.json"),
        serde_json::to_vec(&json!({ "schema_version": "1.1", "steps": steps })).unwrap(),
    )
    .unwrap();

    let tests: Vec<serde_json::Value> = (0..total)
        .map(|i| {
            json!({
                "name": format!("test-{i}"),
                "status": if i < passed { "passed" } else { "failed" },
            })
        })
        .collect();
    std::fs::write(
        trial.join("verifier/ctrf.json"),
        serde_json::to_vec(&json!({
            "results": {
                "summary": { "passed": passed, "tests": total },
                "tests": tests,
            }
        }))
        .unwrap(),
    )
    .unwrap();

    std::fs::write(
        trial.join("result.json"),
        serde_json::to_vec(&json!({ "agent": "terminus-2" })).unwrap(),
    )
    .unwrap();
}

/// A task archive: `demo/task.toml` plus `demo/environment/Dockerfile`.
pub(crate) fn task_zip_bytes() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("demo/task.toml", options).unwrap();
    writer
        .write_all(b"name = \"demo-task\"\n\n[verifier]\ntimeout_sec = 600\n")
        .unwrap();
    writer.start_file("demo/environment/Dockerfile", options).unwrap();
    writer.write_all(b"FROM debian:stable-slim\n").unwrap();
    writer.finish().unwrap().into_inner()
}
