// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain types shared across the Stevedore worker.
//!
//! Pure data: identifiers, job/attempt/episode records, status machines,
//! the failure taxonomy, and object-URI helpers. No I/O lives here.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod agent;
pub mod attempt;
pub mod episode;
pub mod id;
pub mod job;
pub mod macros;
pub mod uri;

pub use agent::AgentKind;
pub use attempt::{Attempt, AttemptStatus, FailureClass, TestCase, TestCaseStatus};
pub use episode::{CommandRun, Episode};
pub use id::{AttemptId, EpisodeId, JobId, UserId};
pub use job::{Job, JobStatus, CANCELLED_BY_USER, CANCELLED_MARKER};
pub use uri::{object_key, object_key_join, UriError};
