// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent selection for a job's attempts.

use serde::{Deserialize, Serialize};

/// Which Harbor agent drives the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// LLM-backed agent producing structured ATIF trajectories.
    Terminus2,
    /// Deterministic reference agent; emits a single `oracle.txt` transcript.
    Oracle,
}

impl AgentKind {
    /// The `--agent` value Harbor's CLI expects.
    pub fn cli_name(&self) -> &'static str {
        match self {
            AgentKind::Terminus2 => "terminus-2",
            AgentKind::Oracle => "oracle",
        }
    }

    /// Oracle runs are deterministic and never call a model API.
    pub fn uses_model(&self) -> bool {
        matches!(self, AgentKind::Terminus2)
    }
}

crate::simple_display! {
    AgentKind {
        Terminus2 => "terminus-2",
        Oracle => "oracle",
    }
}

crate::status_from_str! {
    AgentKind {
        "terminus-2" => Terminus2,
        "oracle" => Oracle,
    }
}
