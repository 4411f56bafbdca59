// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object store gateway: put/get/head/presign plus recursive directory
//! upload with content-type inference.

mod s3;

pub use s3::S3ObjectStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeObjectStore;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from object store operations.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object store backend error: {0}")]
    Backend(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Infer a content type from a file extension.
///
/// Unknown extensions upload with no content type set.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Some("application/json"),
        Some("txt") | Some("log") => Some("text/plain"),
        Some("md") => Some("text/markdown"),
        _ => None,
    }
}

/// Object store operations the worker needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// The URI an object at `key` would have (`scheme://bucket/key`).
    fn url_for(&self, key: &str) -> String;

    /// Upload bytes; returns the object URI (`scheme://bucket/key`).
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn head(&self, key: &str) -> Result<bool, ObjectStoreError>;

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;

    /// Upload a directory tree under `key_prefix`, preserving relative paths
    /// and inferring content types. Returns the uploaded object URIs.
    async fn put_directory(
        &self,
        local_dir: &Path,
        key_prefix: &str,
    ) -> Result<Vec<String>, ObjectStoreError> {
        let prefix = key_prefix.trim_end_matches('/');
        let mut urls = Vec::new();
        for file in collect_files(local_dir)? {
            let relative = file
                .strip_prefix(local_dir)
                .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
            let key = format!("{}/{}", prefix, to_key_path(relative));
            let bytes = tokio::fs::read(&file).await?;
            let content_type = content_type_for(&file);
            urls.push(self.put(&key, bytes, content_type).await?);
        }
        Ok(urls)
    }
}

/// Relative path → key path with forward slashes.
fn to_key_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// All regular files under `dir`, depth-first, in a stable order.
fn collect_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&current)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        entries.sort();
        for path in entries {
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
