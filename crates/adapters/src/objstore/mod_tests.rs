// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    json = { "result.json", Some("application/json") },
    txt = { "notes.txt", Some("text/plain") },
    log = { "harbor-stdout.log", Some("text/plain") },
    md = { "README.md", Some("text/markdown") },
    binary = { "image.png", None },
    bare = { "Dockerfile", None },
)]
fn content_type_inference(name: &str, expected: Option<&'static str>) {
    assert_eq!(content_type_for(Path::new(name)), expected);
}

#[tokio::test]
async fn put_directory_mirrors_tree_and_infers_types() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("agent")).unwrap();
    std::fs::write(dir.path().join("result.json"), b"{}").unwrap();
    std::fs::write(dir.path().join("agent/oracle.txt"), b"transcript").unwrap();

    let store = FakeObjectStore::default();
    let urls = store
        .put_directory(dir.path(), "results/job-1/attempt-0/")
        .await
        .unwrap();

    assert_eq!(urls.len(), 2);
    let stored = store.object("results/job-1/attempt-0/result.json").unwrap();
    assert_eq!(stored.content_type.as_deref(), Some("application/json"));
    let stored = store
        .object("results/job-1/attempt-0/agent/oracle.txt")
        .unwrap();
    assert_eq!(stored.bytes, b"transcript");
    assert_eq!(stored.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn put_returns_object_uri() {
    let store = FakeObjectStore::new("artifacts");
    let url = store.put("a/b.txt", b"hi".to_vec(), None).await.unwrap();
    assert_eq!(url, "s3://artifacts/a/b.txt");
}

#[tokio::test]
async fn get_missing_key_is_not_found() {
    let store = FakeObjectStore::default();
    assert!(matches!(
        store.get("nope").await,
        Err(ObjectStoreError::NotFound(_))
    ));
    assert!(!store.head("nope").await.unwrap());
}
