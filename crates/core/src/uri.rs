// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-store URI helpers.
//!
//! `zip_location` and `log_path` are stored as `scheme://bucket/key/...`
//! URIs. Extracting the key is a pure string operation: strip the scheme and
//! the first path segment (the bucket).

use thiserror::Error;

/// Errors from object-URI parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("object URI has no scheme: {0:?}")]
    MissingScheme(String),
    #[error("object URI has no bucket: {0:?}")]
    MissingBucket(String),
    #[error("object URI has no key: {0:?}")]
    MissingKey(String),
}

/// Extract the object key from a `scheme://bucket/key` URI.
///
/// ```
/// # use sv_core::uri::object_key;
/// assert_eq!(object_key("s3://bucket/a/b/c").unwrap(), "a/b/c");
/// ```
pub fn object_key(uri: &str) -> Result<String, UriError> {
    let (_, rest) = uri
        .split_once("://")
        .ok_or_else(|| UriError::MissingScheme(uri.to_string()))?;
    let (bucket, key) = rest
        .split_once('/')
        .ok_or_else(|| UriError::MissingKey(uri.to_string()))?;
    if bucket.is_empty() {
        return Err(UriError::MissingBucket(uri.to_string()));
    }
    if key.is_empty() {
        return Err(UriError::MissingKey(uri.to_string()));
    }
    Ok(key.to_string())
}

/// Extract the key and append `rest` beneath it, normalizing slashes.
///
/// `object_key_join("s3://bucket/a/b/", "x/y")` yields `"a/b/x/y"`.
pub fn object_key_join(uri: &str, rest: &str) -> Result<String, UriError> {
    let key = object_key(uri)?;
    let base = key.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        return Ok(base.to_string());
    }
    Ok(format!("{base}/{rest}"))
}

#[cfg(test)]
#[path = "uri_tests.rs"]
mod tests;
