// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level errors.

use sv_adapters::ObjectStoreError;
use sv_core::UriError;
use sv_storage::StoreError;
use thiserror::Error;

/// Job-level failures. Attempt-level failures never surface here; they are
/// absorbed by the attempt driver so siblings keep running.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error("{0}")]
    Uri(#[from] UriError),
    #[error("task archive error: {0}")]
    Archive(String),
    #[error("task layout error: {0}")]
    TaskLayout(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Job cancelled by user")]
    Cancelled,
}
