// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime adapter.
//!
//! Harbor names trial containers `<taskName>__<suffix>`; cleanup removes
//! containers by that prefix. The runtime is driven through the `docker` CLI
//! and isolated behind [`Containers`] so tests can inject a fake.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

/// Errors from container runtime operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// One running container, as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
}

/// The container runtime operations the worker needs.
#[async_trait]
pub trait Containers: Send + Sync {
    /// Running containers whose name starts with `prefix`.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ContainerInfo>, ContainerError>;

    /// Remove a container, killing it if needed.
    async fn force_remove(&self, id: &str) -> Result<(), ContainerError>;

    /// Build an image from a Dockerfile.
    async fn build_image(
        &self,
        dockerfile: &Path,
        tag: &str,
        context: &Path,
    ) -> Result<(), ContainerError>;
}

/// `docker`-CLI-backed implementation.
#[derive(Debug, Default, Clone)]
pub struct DockerContainers;

impl DockerContainers {
    async fn docker(args: &[&str]) -> Result<std::process::Output, ContainerError> {
        Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| ContainerError::RuntimeUnavailable(e.to_string()))
    }
}

/// Parse `docker ps --format '{{.ID}} {{.Names}}'` output.
fn parse_ps_lines(stdout: &str) -> Vec<ContainerInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let (id, name) = line.trim().split_once(' ')?;
            Some(ContainerInfo { id: id.to_string(), name: name.to_string() })
        })
        .collect()
}

#[async_trait]
impl Containers for DockerContainers {
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ContainerInfo>, ContainerError> {
        let output = Self::docker(&["ps", "--format", "{{.ID}} {{.Names}}"]).await?;
        if !output.status.success() {
            return Err(ContainerError::CommandFailed {
                command: "docker ps".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ps_lines(&stdout)
            .into_iter()
            .filter(|c| c.name.starts_with(prefix))
            .collect())
    }

    async fn force_remove(&self, id: &str) -> Result<(), ContainerError> {
        let output = Self::docker(&["rm", "-f", id]).await?;
        if output.status.success() {
            return Ok(());
        }
        // Older runtimes reject rm -f on a running container; kill then rm.
        tracing::debug!(container = id, "docker rm -f failed, trying kill + rm");
        let _ = Self::docker(&["kill", id]).await?;
        let output = Self::docker(&["rm", id]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ContainerError::CommandFailed {
                command: format!("docker rm {id}"),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    async fn build_image(
        &self,
        dockerfile: &Path,
        tag: &str,
        context: &Path,
    ) -> Result<(), ContainerError> {
        let output = Self::docker(&[
            "build",
            "-f",
            &dockerfile.to_string_lossy(),
            "-t",
            tag,
            &context.to_string_lossy(),
        ])
        .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ContainerError::CommandFailed {
                command: format!("docker build -t {tag}"),
                stderr: last_chars(&String::from_utf8_lossy(&output.stderr), 2000),
            })
        }
    }
}

/// Last `n` characters of `s`, on a char boundary.
pub(crate) fn last_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        s.to_string()
    } else {
        s.chars().skip(count - n).collect()
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Scriptable in-memory [`Containers`].
    #[derive(Default)]
    pub struct FakeContainers {
        running: Mutex<Vec<ContainerInfo>>,
        removed: Mutex<Vec<String>>,
        built: Mutex<Vec<String>>,
        fail_builds: std::sync::atomic::AtomicBool,
    }

    impl FakeContainers {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_running(&self, id: impl Into<String>, name: impl Into<String>) {
            self.running
                .lock()
                .push(ContainerInfo { id: id.into(), name: name.into() });
        }

        pub fn removed(&self) -> Vec<String> {
            self.removed.lock().clone()
        }

        pub fn built_tags(&self) -> Vec<String> {
            self.built.lock().clone()
        }

        pub fn set_fail_builds(&self, fail: bool) {
            self.fail_builds
                .store(fail, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Containers for FakeContainers {
        async fn list_by_prefix(
            &self,
            prefix: &str,
        ) -> Result<Vec<ContainerInfo>, ContainerError> {
            Ok(self
                .running
                .lock()
                .iter()
                .filter(|c| c.name.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn force_remove(&self, id: &str) -> Result<(), ContainerError> {
            self.running.lock().retain(|c| c.id != id);
            self.removed.lock().push(id.to_string());
            Ok(())
        }

        async fn build_image(
            &self,
            _dockerfile: &Path,
            tag: &str,
            _context: &Path,
        ) -> Result<(), ContainerError> {
            if self.fail_builds.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ContainerError::CommandFailed {
                    command: format!("docker build -t {tag}"),
                    stderr: "no daemon".to_string(),
                });
            }
            self.built.lock().push(tag.to_string());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeContainers;

#[cfg(test)]
#[path = "containers_tests.rs"]
mod tests;
