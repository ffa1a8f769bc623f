use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ChecksumAlgorithm, CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};

use crate::error::{ErrorContext, StorageError};

/// Everything needed to build an [`ObjectStoreClient`] for one datacenter.
/// Cloned and adjusted (a longer `operation_timeout`) for each fresh client
/// the completion-retry path constructs.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub operation_timeout: Option<Duration>,
}

impl ObjectStoreConfig {
    pub fn with_operation_timeout(&self, timeout: Duration) -> Self {
        let mut next = self.clone();
        next.operation_timeout = Some(timeout);
        next
    }
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PartInfo {
    pub part_number: i32,
    pub size: u64,
    pub etag: String,
}

#[derive(Debug, Clone)]
pub struct MultipartUploadInfo {
    pub key: String,
    pub upload_id: String,
    pub initiated: Option<DateTime<Utc>>,
}

/// A cheaply-cloneable handle to one datacenter's S3-compatible endpoint. The
/// underlying `aws_sdk_s3::Client` is internally pooled, so cloning this
/// struct never opens a new connection pool.
#[derive(Clone)]
pub struct ObjectStoreClient {
    client: S3Client,
}

impl ObjectStoreClient {
    pub async fn connect(config: &ObjectStoreConfig) -> Result<Self, StorageError> {
        let creds = aws_credential_types::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "runvolume-storage",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .credentials_provider(creds)
            .endpoint_url(&config.endpoint);

        if let Some(timeout) = config.operation_timeout {
            let timeout_config = aws_config::timeout::TimeoutConfig::builder()
                .operation_timeout(timeout)
                .operation_attempt_timeout(timeout)
                .build();
            loader = loader.timeout_config(timeout_config);
        }

        let loaded = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&loaded)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
        })
    }

    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut out = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| s3_error(e, ErrorContext::new().key(prefix)))?;

            for obj in resp.contents() {
                out.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0) as u64,
                    last_modified: obj
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), 0)),
                    etag: obj.e_tag().map(str::to_string),
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(out)
    }

    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<String, StorageError> {
        let resp = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| s3_error(e, ErrorContext::new().key(key)))?;

        Ok(resp.e_tag().unwrap_or_default().to_string())
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error(e, ErrorContext::new().key(key)))?;

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::TransientNetwork(ErrorContext::new().key(key), e.to_string()))?;

        Ok(bytes.into_bytes().to_vec())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error(e, ErrorContext::new().key(key)))?;
        Ok(())
    }

    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<(u64, Option<String>), StorageError> {
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error(e, ErrorContext::new().key(key)))?;

        Ok((resp.content_length().unwrap_or(0) as u64, resp.e_tag().map(str::to_string)))
    }

    pub async fn create_multipart(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error(e, ErrorContext::new().key(key)))?;

        resp.upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::ProtocolMismatch(
                ErrorContext::new().key(key),
                "CreateMultipartUpload returned no upload id".to_string(),
            ))
    }

    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, StorageError> {
        let resp = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .checksum_algorithm(ChecksumAlgorithm::Crc32C)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| s3_error(e, ErrorContext::new().key(key).part(part_number)))?;

        resp.e_tag()
            .map(str::to_string)
            .ok_or_else(|| StorageError::ProtocolMismatch(
                ErrorContext::new().key(key).part(part_number),
                "UploadPart returned no etag".to_string(),
            ))
    }

    pub async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<PartInfo>, StorageError> {
        let mut out = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_parts()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id);
            if let Some(m) = &marker {
                req = req.part_number_marker(m);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| s3_error(e, ErrorContext::new().key(key)))?;

            for part in resp.parts() {
                out.push(PartInfo {
                    part_number: part.part_number().unwrap_or_default(),
                    size: part.size().unwrap_or(0) as u64,
                    etag: part.e_tag().unwrap_or_default().to_string(),
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                marker = resp.next_part_number_marker().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(out)
    }

    pub async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<String, StorageError> {
        let completed_parts: Vec<CompletedPart> = parts
            .into_iter()
            .map(|(part_number, etag)| {
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build()
            })
            .collect();

        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| s3_error(e, ErrorContext::new().key(key)))?;

        Ok(resp.e_tag().unwrap_or_default().to_string())
    }

    pub async fn abort_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| s3_error(e, ErrorContext::new().key(key)))?;
        Ok(())
    }

    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
    ) -> Result<Vec<MultipartUploadInfo>, StorageError> {
        let mut out = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let mut req = self.client.list_multipart_uploads().bucket(bucket);
            if let Some(k) = &key_marker {
                req = req.key_marker(k);
            }
            if let Some(u) = &upload_id_marker {
                req = req.upload_id_marker(u);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| s3_error(e, ErrorContext::new()))?;

            for upload in resp.uploads() {
                out.push(MultipartUploadInfo {
                    key: upload.key().unwrap_or_default().to_string(),
                    upload_id: upload.upload_id().unwrap_or_default().to_string(),
                    initiated: upload
                        .initiated()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), 0)),
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                key_marker = resp.next_key_marker().map(str::to_string);
                upload_id_marker = resp.next_upload_id_marker().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(out)
    }
}

/// Classifies an AWS SDK error into the `StorageError` taxonomy, inspecting
/// HTTP status and error code exactly once at this boundary.
fn s3_error<E>(err: aws_sdk_s3::error::SdkError<E>, ctx: ErrorContext) -> StorageError
where
    E: std::error::Error + aws_sdk_s3::error::ProvideErrorMetadata + 'static,
{
    let is_timeout = matches!(err, aws_sdk_s3::error::SdkError::TimeoutError(_));
    let status = err
        .raw_response()
        .map(|r| r.status().as_u16());
    let ctx = if let Some(s) = status { ctx.status(s) } else { ctx };
    let code = err.code().unwrap_or_default().to_string();
    let message = err.message().map(str::to_string).unwrap_or_else(|| err.to_string());

    if status == Some(507) || code.eq_ignore_ascii_case("InsufficientStorage") {
        return StorageError::InsufficientStorage(ctx);
    }
    if code.eq_ignore_ascii_case("NoSuchUpload") {
        return StorageError::ProtocolMismatch(ctx, "NoSuchUpload".to_string());
    }
    if status == Some(524) || is_timeout {
        return StorageError::TransientNetwork(ctx, message);
    }
    match status {
        Some(401) | Some(403) => StorageError::AuthenticationFailed(ctx),
        Some(404) => StorageError::ObjectNotFound(ctx),
        Some(s) if s >= 500 => StorageError::TransientNetwork(ctx, message),
        _ => StorageError::Management(ctx, message),
    }
}
