// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-world adapters for the Stevedore worker.
//!
//! Everything that touches a process boundary lives here: the object store
//! gateway, the container runtime, process-group control, and the Harbor
//! agent runner. The engine depends on the traits; `main` picks the
//! implementations.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod containers;
pub mod harbor;
pub mod objstore;
pub mod process;

pub use containers::{ContainerError, ContainerInfo, Containers, DockerContainers};
pub use harbor::{AgentLauncher, AgentOutput, HarborLauncher, LaunchError, LaunchRequest};
pub use objstore::{ObjectStore, ObjectStoreError, S3ObjectStore};
pub use process::{GroupKiller, ProcessGroup};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use containers::FakeContainers;
#[cfg(any(test, feature = "test-support"))]
pub use harbor::FakeLauncher;
#[cfg(any(test, feature = "test-support"))]
pub use objstore::FakeObjectStore;
