mod common;

use common::TestContext;
use runvolume_storage::upload::{MultipartUploadEngine, UploadOptions};
use std::time::Duration;
use tempfile::NamedTempFile;

fn skip_without_minio() -> bool {
    if !common::minio_available() {
        eprintln!("skipping: MINIO_ENDPOINT not set");
        return true;
    }
    false
}

// ═══════════════════════════════════════════════════════════════════════════
// Object Store Client — core CRUD
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn list_objects_sees_nested_keys() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;

    ctx.client.put_object(&ctx.bucket, "file1.txt", b"hello".to_vec()).await.unwrap();
    ctx.client.put_object(&ctx.bucket, "file2.txt", b"world".to_vec()).await.unwrap();
    ctx.client
        .put_object(&ctx.bucket, "subdir/file3.txt", b"nested".to_vec())
        .await
        .unwrap();

    let listing = ctx.client.list_objects(&ctx.bucket, "").await.unwrap();
    let keys: Vec<&str> = listing.iter().map(|o| o.key.as_str()).collect();
    assert!(keys.contains(&"file1.txt"));
    assert!(keys.contains(&"file2.txt"));
    assert!(keys.contains(&"subdir/file3.txt"));

    ctx.cleanup().await;
}

#[tokio::test]
async fn delete_object_removes_key() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;
    ctx.client.put_object(&ctx.bucket, "a.txt", b"data".to_vec()).await.unwrap();
    ctx.client.delete_object(&ctx.bucket, "a.txt").await.unwrap();

    let listing = ctx.client.list_objects(&ctx.bucket, "").await.unwrap();
    assert!(listing.is_empty());

    ctx.cleanup().await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Multipart upload engine — round trip and verification
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn upload_then_download_round_trips_bytes() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;
    let engine = MultipartUploadEngine::new(ctx.client.clone(), store_config(&ctx));

    let mut file = NamedTempFile::new().unwrap();
    let content = vec![0x5Au8; 30 * 1024 * 1024];
    std::io::Write::write_all(&mut file, &content).unwrap();

    let options = UploadOptions {
        part_size: Some(10 * 1024 * 1024),
        ..Default::default()
    };
    let outcome = engine
        .upload_file(file.path(), &ctx.bucket, "roundtrip.bin", &options)
        .await
        .expect("upload failed");
    assert_eq!(outcome.size, content.len() as u64);
    assert_eq!(outcome.uploaded_parts, 3);

    let (size, _) = ctx.client.head_object(&ctx.bucket, "roundtrip.bin").await.unwrap();
    assert_eq!(size, content.len() as u64);

    let downloaded = ctx.client.get_object(&ctx.bucket, "roundtrip.bin").await.unwrap();
    assert_eq!(md5::compute(&downloaded).0, md5::compute(&content).0);

    ctx.cleanup().await;
}

#[tokio::test]
async fn small_file_uses_single_shot_put() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;
    let engine = MultipartUploadEngine::new(ctx.client.clone(), store_config(&ctx));

    let mut file = NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"tiny file contents").unwrap();

    let outcome = engine
        .upload_file(file.path(), &ctx.bucket, "small.txt", &UploadOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.size, 19);

    let downloaded = ctx.client.get_object(&ctx.bucket, "small.txt").await.unwrap();
    assert_eq!(downloaded, b"tiny file contents");

    ctx.cleanup().await;
}

#[tokio::test]
async fn cleanup_abandoned_aborts_only_old_sessions() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;
    let engine = MultipartUploadEngine::new(ctx.client.clone(), store_config(&ctx));

    let upload_id = ctx.client.create_multipart(&ctx.bucket, "abandoned.bin").await.unwrap();

    let aborted = engine
        .cleanup_abandoned(&ctx.bucket, Duration::from_secs(0))
        .await
        .unwrap();
    assert!(aborted >= 1);

    let remaining = ctx.client.list_multipart_uploads(&ctx.bucket).await.unwrap();
    assert!(!remaining.iter().any(|u| u.upload_id == upload_id));

    ctx.cleanup().await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Resume
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn resumes_a_session_with_compatible_parts() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;
    let part_size = 10 * 1024 * 1024;
    let content = vec![0x11u8; 3 * part_size as usize];

    let mut file = NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, &content).unwrap();

    // Simulate a prior run that uploaded only the first part before dying.
    let upload_id = ctx.client.create_multipart(&ctx.bucket, "resumed.bin").await.unwrap();
    let first_chunk = content[..part_size as usize].to_vec();
    ctx.client
        .upload_part(&ctx.bucket, "resumed.bin", &upload_id, 1, first_chunk)
        .await
        .unwrap();

    let engine = MultipartUploadEngine::new(ctx.client.clone(), store_config(&ctx));
    let options = UploadOptions {
        part_size: Some(part_size),
        ..Default::default()
    };
    let outcome = engine
        .upload_file(file.path(), &ctx.bucket, "resumed.bin", &options)
        .await
        .expect("resumed upload failed");

    assert_eq!(outcome.resumed_parts, 1);
    assert_eq!(outcome.uploaded_parts, 2);
    assert_eq!(outcome.size, content.len() as u64);

    ctx.cleanup().await;
}

#[tokio::test]
async fn incompatible_session_is_abandoned_for_a_fresh_one() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;
    let content = vec![0x22u8; 15 * 1024 * 1024];

    let mut file = NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, &content).unwrap();

    // A prior session was opened with 10 MiB parts...
    let stale_upload_id = ctx.client.create_multipart(&ctx.bucket, "mismatched.bin").await.unwrap();
    let stale_chunk = content[..10 * 1024 * 1024].to_vec();
    ctx.client
        .upload_part(&ctx.bucket, "mismatched.bin", &stale_upload_id, 1, stale_chunk)
        .await
        .unwrap();

    // ...but this run is configured with 5 MiB parts, so the stale session
    // isn't compatible and must be abandoned in favor of a new one.
    let engine = MultipartUploadEngine::new(ctx.client.clone(), store_config(&ctx));
    let options = UploadOptions {
        part_size: Some(5 * 1024 * 1024),
        ..Default::default()
    };
    let outcome = engine
        .upload_file(file.path(), &ctx.bucket, "mismatched.bin", &options)
        .await
        .expect("upload with incompatible stale session failed");

    assert_eq!(outcome.resumed_parts, 0);
    assert_eq!(outcome.uploaded_parts, 3);

    ctx.cleanup().await;
}

fn store_config(ctx: &TestContext) -> runvolume_storage::objectstore::ObjectStoreConfig {
    runvolume_storage::objectstore::ObjectStoreConfig {
        endpoint: ctx.config.endpoint.clone(),
        region: ctx.config.region.clone(),
        access_key: ctx.config.access_key.clone(),
        secret_key: ctx.config.secret_key.clone(),
        operation_timeout: None,
    }
}
