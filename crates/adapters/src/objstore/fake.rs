// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory object store for tests.

use super::{ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// In-memory object store keyed like the real bucket.
pub struct FakeObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl Default for FakeObjectStore {
    fn default() -> Self {
        Self::new("test-bucket")
    }
}

impl FakeObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), objects: Mutex::new(BTreeMap::new()) }
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.objects
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    fn url_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, ObjectStoreError> {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject { bytes, content_type: content_type.map(str::to_string) },
        );
        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .lock()
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.objects.lock().contains_key(key))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        if !self.objects.lock().contains_key(key) {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        Ok(format!(
            "https://{}.example.test/{}?expires={}",
            self.bucket,
            key,
            ttl.as_secs()
        ))
    }
}
