// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-group control.
//!
//! The agent spawns helper processes of its own (container clients, shells).
//! Putting the child in its own process group lets one signal reach the whole
//! tree. This is the only module that knows how that works.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::process::{Child, Command};

/// A child process running as the leader of its own process group.
pub struct ProcessGroup {
    child: Child,
    pgid: Pid,
}

impl ProcessGroup {
    /// Spawn `cmd` as a new process-group leader.
    pub fn spawn(cmd: &mut Command) -> std::io::Result<Self> {
        cmd.process_group(0);
        cmd.kill_on_drop(true);
        let child = cmd.spawn()?;
        // With process_group(0) the child's pid is also its pgid.
        let pid = child.id().ok_or_else(|| {
            std::io::Error::other("child exited before its pid could be read")
        })?;
        Ok(Self { child, pgid: Pid::from_raw(pid as i32) })
    }

    /// A detached handle that can signal the group after the child handle
    /// has been consumed by `wait`.
    pub fn killer(&self) -> GroupKiller {
        GroupKiller { pgid: self.pgid }
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }
}

/// Signals a process group without owning the child.
///
/// Held by the process registry so cancellation can reach live subprocesses
/// while the runner still owns the `Child` for reaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupKiller {
    pgid: Pid,
}

impl GroupKiller {
    /// Send SIGTERM to the whole group. Best-effort: a dead group is fine.
    pub fn terminate(&self) {
        if let Err(e) = killpg(self.pgid, Signal::SIGTERM) {
            tracing::debug!(pgid = self.pgid.as_raw(), error = %e, "SIGTERM to group failed");
        }
    }

    /// Send SIGKILL to the whole group.
    pub fn kill(&self) {
        if let Err(e) = killpg(self.pgid, Signal::SIGKILL) {
            tracing::debug!(pgid = self.pgid.as_raw(), error = %e, "SIGKILL to group failed");
        }
    }

    /// True while any process in the group is still alive.
    pub fn is_alive(&self) -> bool {
        killpg(self.pgid, None).is_ok()
    }

    /// SIGTERM, then SIGKILL after `grace` if the group is still alive.
    pub async fn terminate_then_kill(&self, grace: Duration) {
        self.terminate();
        tokio::time::sleep(grace).await;
        if self.is_alive() {
            tracing::warn!(pgid = self.pgid.as_raw(), "group survived SIGTERM, sending SIGKILL");
            self.kill();
        }
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
impl GroupKiller {
    /// A killer for an arbitrary pgid. Tests use ids that cannot exist so
    /// stray signals go nowhere.
    pub fn for_pgid(pgid: i32) -> Self {
        Self { pgid: Pid::from_raw(pgid) }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
