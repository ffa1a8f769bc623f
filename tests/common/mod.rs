use runvolume_storage::objectstore::{ObjectStoreClient, ObjectStoreConfig};
use uuid::Uuid;

/// Configuration for connecting to MinIO (or any S3-compatible endpoint).
pub struct MinioConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl MinioConfig {
    /// Read config from environment with sensible defaults for local MinIO.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            access_key: std::env::var("MINIO_ACCESS_KEY")
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: std::env::var("MINIO_SECRET_KEY")
                .unwrap_or_else(|_| "minioadmin".to_string()),
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        }
    }
}

/// Test context that owns a unique bucket and an [`ObjectStoreClient`] built
/// against a live MinIO endpoint. Each test gets its own context for
/// isolation; these tests are skipped unless `MINIO_ENDPOINT` (or the other
/// `MINIO_*` vars) is configured in the environment.
#[allow(dead_code)]
pub struct TestContext {
    pub client: ObjectStoreClient,
    pub bucket: String,
    pub config: MinioConfig,
    raw: aws_sdk_s3::Client,
    extra_buckets: Vec<String>,
}

impl TestContext {
    pub async fn new() -> Self {
        let config = MinioConfig::from_env();
        let store_config = ObjectStoreConfig {
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            operation_timeout: None,
        };
        let client = ObjectStoreClient::connect(&store_config)
            .await
            .expect("failed to build object store client for testing");

        let raw = build_raw_client(&config).await;

        let bucket = format!("test-{}", Uuid::new_v4());
        raw.create_bucket()
            .bucket(&bucket)
            .send()
            .await
            .expect("failed to create test bucket");

        Self {
            client,
            bucket,
            config,
            raw,
            extra_buckets: Vec::new(),
        }
    }

    pub async fn create_extra_bucket(&mut self) -> String {
        let bucket = format!("test-extra-{}", Uuid::new_v4());
        self.raw
            .create_bucket()
            .bucket(&bucket)
            .send()
            .await
            .expect("failed to create extra test bucket");
        self.extra_buckets.push(bucket.clone());
        bucket
    }

    pub async fn cleanup(self) {
        Self::delete_all_objects(&self.raw, &self.bucket).await;
        let _ = self.raw.delete_bucket().bucket(&self.bucket).send().await;

        for bucket in &self.extra_buckets {
            Self::delete_all_objects(&self.raw, bucket).await;
            let _ = self.raw.delete_bucket().bucket(bucket).send().await;
        }
    }

    async fn delete_all_objects(client: &aws_sdk_s3::Client, bucket: &str) {
        loop {
            let resp = match client.list_objects_v2().bucket(bucket).send().await {
                Ok(r) => r,
                Err(_) => break,
            };

            let objects: Vec<_> = resp
                .contents()
                .iter()
                .filter_map(|o| {
                    Some(
                        aws_sdk_s3::types::ObjectIdentifier::builder()
                            .key(o.key()?)
                            .build()
                            .unwrap(),
                    )
                })
                .collect();

            if objects.is_empty() {
                break;
            }

            let delete = aws_sdk_s3::types::Delete::builder()
                .set_objects(Some(objects))
                .build()
                .unwrap();
            let _ = client.delete_objects().bucket(bucket).delete(delete).send().await;
        }
    }
}

/// `ObjectStoreClient` intentionally exposes only the operations the engine
/// needs; bucket/version cleanup needs the full SDK surface, so tests build
/// one raw client alongside it.
async fn build_raw_client(config: &MinioConfig) -> aws_sdk_s3::Client {
    let creds = aws_credential_types::Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "runvolume-storage-tests",
    );
    let loaded = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .credentials_provider(creds)
        .endpoint_url(&config.endpoint)
        .load()
        .await;
    let s3_config = aws_sdk_s3::config::Builder::from(&loaded)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Tests in this harness require a live MinIO instance; skip instead of
/// failing when it isn't configured.
pub fn minio_available() -> bool {
    std::env::var("MINIO_ENDPOINT").is_ok()
}
