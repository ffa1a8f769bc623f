mod common;

use common::TestContext;
use runvolume_storage::objectstore::ObjectStoreConfig;
use runvolume_storage::sync::DirectorySyncCoordinator;
use runvolume_storage::upload::{MultipartUploadEngine, UploadOptions};
use tempfile::TempDir;

fn skip_without_minio() -> bool {
    if !common::minio_available() {
        eprintln!("skipping: MINIO_ENDPOINT not set");
        return true;
    }
    false
}

fn coordinator(ctx: &TestContext) -> DirectorySyncCoordinator {
    let store_config = ObjectStoreConfig {
        endpoint: ctx.config.endpoint.clone(),
        region: ctx.config.region.clone(),
        access_key: ctx.config.access_key.clone(),
        secret_key: ctx.config.secret_key.clone(),
        operation_timeout: None,
    };
    let engine = MultipartUploadEngine::new(ctx.client.clone(), store_config);
    DirectorySyncCoordinator::new(engine, ctx.client.clone(), 4, UploadOptions::default())
}

// Directory sync of {a.txt, sub/b.txt, .DS_Store} excluding "*.DS_Store" with
// delete=true against a remote that already holds {old.txt} leaves exactly
// {prefix/a.txt, prefix/sub/b.txt}.
#[tokio::test]
async fn sync_with_delete_leaves_exactly_the_local_tree() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;
    let coord = coordinator(&ctx);

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();
    std::fs::write(dir.path().join(".DS_Store"), b"junk").unwrap();

    ctx.client
        .put_object(&ctx.bucket, "prefix/old.txt", b"stale".to_vec())
        .await
        .unwrap();

    let outcome = coord
        .upload_directory(
            dir.path(),
            &ctx.bucket,
            "prefix",
            &["*.DS_Store".to_string()],
            true,
            None,
        )
        .await
        .expect("sync failed");

    assert_eq!(outcome.uploaded, 2);
    assert_eq!(outcome.skipped_excluded, 1);
    assert_eq!(outcome.deleted, 1);

    let remaining = ctx.client.list_objects(&ctx.bucket, "prefix").await.unwrap();
    let mut keys: Vec<&str> = remaining.iter().map(|o| o.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["prefix/a.txt", "prefix/sub/b.txt"]);

    ctx.cleanup().await;
}

#[tokio::test]
async fn download_directory_recreates_local_tree() {
    if skip_without_minio() {
        return;
    }
    let ctx = TestContext::new().await;
    let coord = coordinator(&ctx);

    ctx.client.put_object(&ctx.bucket, "files/x.txt", b"x".to_vec()).await.unwrap();
    ctx.client.put_object(&ctx.bucket, "files/nested/y.txt", b"y".to_vec()).await.unwrap();

    let dest = TempDir::new().unwrap();
    let outcome = coord
        .download_directory(&ctx.bucket, "files", dest.path(), None)
        .await
        .expect("download failed");

    assert_eq!(outcome.downloaded, 2);
    assert_eq!(std::fs::read(dest.path().join("x.txt")).unwrap(), b"x");
    assert_eq!(std::fs::read(dest.path().join("nested/y.txt")).unwrap(), b"y");

    ctx.cleanup().await;
}
