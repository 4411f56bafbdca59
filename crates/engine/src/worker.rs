// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker bundle: injected gateways plus the drivers that use them.
//!
//! Built once by `main` and shared via `Arc`; the scheduler runs jobs
//! through it, the attempt and job drivers live in sibling files as
//! `impl Worker` blocks.

use crate::cancel::CancelOracle;
use crate::config::WorkerConfig;
use crate::registry::ProcessRegistry;
use crate::scheduler::JobRunner;
use async_trait::async_trait;
use std::sync::Arc;
use sv_adapters::{AgentLauncher, Containers, ObjectStore};
use sv_core::Job;
use sv_storage::Store;

pub struct Worker {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) objstore: Arc<dyn ObjectStore>,
    pub(crate) containers: Arc<dyn Containers>,
    pub(crate) launcher: Arc<dyn AgentLauncher>,
    pub(crate) registry: Arc<ProcessRegistry>,
    pub(crate) oracle: CancelOracle,
    pub(crate) config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn Store>,
        objstore: Arc<dyn ObjectStore>,
        containers: Arc<dyn Containers>,
        launcher: Arc<dyn AgentLauncher>,
        config: WorkerConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(ProcessRegistry::new());
        let oracle = CancelOracle::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&containers),
        );
        Arc::new(Self { store, objstore, containers, launcher, registry, oracle, config })
    }

    /// The registry, for surfaces that inspect supervision state.
    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// The oracle, for surfaces that cancel jobs in-process.
    pub fn oracle(&self) -> &CancelOracle {
        &self.oracle
    }
}

#[async_trait]
impl JobRunner for Worker {
    async fn run(&self, job: Job) {
        self.run_job(&job).await;
    }
}
