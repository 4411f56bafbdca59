// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stevedore worker daemon (svd)
//!
//! Long-lived process that polls the store for queued benchmark jobs,
//! admits them under fairness limits, and drives Harbor attempts.
//!
//! Architecture:
//! - Poller task: scans the store and feeds the scheduler
//! - Scheduler: spawns one supervising task per admitted job
//! - Main task: waits for SIGTERM/SIGINT and drains on shutdown

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;
use std::time::Duration;

use sv_adapters::{DockerContainers, HarborLauncher, S3ObjectStore};
use sv_engine::{Poller, Scheduler, SchedulerLimits, Worker, WorkerConfig};
use sv_storage::PgStore;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Error)]
enum StartupError {
    #[error("{0} is not set")]
    MissingEnv(&'static str),
    #[error("store connection failed: {0}")]
    Store(#[from] sv_storage::StoreError),
    #[error("signal handler setup failed: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any connection attempt
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("svd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("svd {}", env!("CARGO_PKG_VERSION"));
                println!("Stevedore worker daemon - runs queued Harbor benchmark jobs");
                println!();
                println!("USAGE:");
                println!("    svd");
                println!();
                println!("Configuration comes from the environment:");
                println!("    DATABASE_URL                     (required)");
                println!("    SV_BUCKET                        (required)");
                println!("    WORKER_POLL_INTERVAL_MS          default 5000");
                println!("    MAX_CONCURRENT_JOBS              default 3");
                println!("    MAX_ACTIVE_JOBS_PER_USER         default 2");
                println!("    MAX_QUEUED_JOBS_PER_USER         default 10");
                println!("    MAX_CONCURRENT_ATTEMPTS_PER_JOB  default 10");
                println!("    HARBOR_TIMEOUT_MS                default 1800000");
                println!("    HARBOR_MODEL, HARBOR_AGENT, HARBOR_API_KEY");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: svd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    setup_logging();

    match run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("failed to start worker: {e}");
            Err(e.into())
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| StartupError::MissingEnv("DATABASE_URL"))?;
    let bucket = std::env::var("SV_BUCKET").map_err(|_| StartupError::MissingEnv("SV_BUCKET"))?;
    let config = WorkerConfig::from_env();

    info!("starting stevedore worker");

    let store = Arc::new(PgStore::connect(&database_url).await?);
    let objstore = Arc::new(S3ObjectStore::from_env(bucket).await);
    let launcher = Arc::new(HarborLauncher::new(
        objstore.clone(),
        config.log_upload_interval,
    ));

    let limits = SchedulerLimits {
        max_concurrent: config.max_concurrent_jobs,
        max_active_per_user: config.max_active_per_user,
        max_queued_per_user: config.max_queued_per_user,
    };
    let shutdown_grace = config.shutdown_grace;
    let poll_interval = config.poll_interval;

    let worker = Worker::new(
        store.clone(),
        objstore,
        Arc::new(DockerContainers),
        launcher,
        config,
    );
    let scheduler = Scheduler::new(limits, worker);
    let poller = Poller::new(store, Arc::clone(&scheduler), poll_interval);

    let shutdown = CancellationToken::new();
    let poller_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { poller.run(shutdown).await })
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        max_concurrent = limits.max_concurrent,
        max_active_per_user = limits.max_active_per_user,
        "worker ready"
    );

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    // Stop admitting work, then give in-flight jobs a window to finish.
    // Whatever cannot complete stays `running` in the store for the next
    // worker to pick up.
    shutdown.cancel();
    let _ = poller_task.await;
    drain(&scheduler, shutdown_grace).await;

    info!("worker stopped");
    Ok(())
}

/// Wait up to `grace` for running jobs to finish.
async fn drain(scheduler: &Scheduler, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        let running = scheduler.running_count();
        if running == 0 {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            info!(running, "drain window elapsed, leaving jobs for the next worker");
            return;
        }
        info!(running, "waiting for in-flight jobs");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
