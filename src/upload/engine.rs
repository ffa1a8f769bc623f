use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{ErrorContext, StorageError};
use crate::objectstore::{ObjectStoreClient, ObjectStoreConfig};

use super::planner::{adaptive_part_size, part_range, total_parts};
use super::session::{is_compatible, keys_match, UploadSession};

/// Snapshot of upload progress handed to the caller's callback outside the
/// progress mutex, so a slow callback can't stall other workers.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    pub speed_mb_s: f64,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

#[derive(Clone)]
pub struct UploadOptions {
    pub part_size: Option<u64>,
    pub max_retries: u32,
    pub enable_resume: bool,
    pub worker_pool_width: usize,
    pub progress_cb: Option<ProgressCallback>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            part_size: None,
            max_retries: 5,
            enable_resume: true,
            worker_pool_width: 4,
            progress_cb: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub etag: String,
    pub size: u64,
    pub resumed_parts: usize,
    pub uploaded_parts: usize,
}

struct ProgressState {
    bytes_uploaded: u64,
    total_bytes: u64,
    started_at: Instant,
}

/// Drives one file to a durable, verified object at `bucket/key`: resumable
/// sessions, bounded concurrency, layered retry, never silent failure.
pub struct MultipartUploadEngine {
    client: ObjectStoreClient,
    config: ObjectStoreConfig,
}

impl MultipartUploadEngine {
    pub fn new(client: ObjectStoreClient, config: ObjectStoreConfig) -> Self {
        Self { client, config }
    }

    pub async fn upload_file(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        options: &UploadOptions,
    ) -> Result<UploadOutcome, StorageError> {
        let metadata = tokio::fs::metadata(local_path).await?;
        let file_size = metadata.len();
        let part_size = options
            .part_size
            .unwrap_or_else(|| adaptive_part_size(file_size));
        let total = total_parts(file_size, part_size);

        if file_size < part_size {
            return self.upload_single_shot(local_path, bucket, key, file_size).await;
        }

        let discovered = if options.enable_resume {
            self.discover_session(bucket, key, part_size, file_size).await?
        } else {
            None
        };

        let (session, resumed_count) = match discovered {
            Some(s) => {
                let n = s.existing_parts.len();
                (s, n)
            }
            None => {
                let upload_id = self.client.create_multipart(bucket, key).await?;
                (UploadSession::fresh(upload_id), 0)
            }
        };

        if resumed_count > 0 {
            log::info!(
                "resumable upload for {key}: {resumed_count} parts already present (upload_id={})",
                session.upload_id
            );
        }

        let missing: Vec<u32> = (1..=total)
            .filter(|p| !session.existing_parts.contains_key(&(*p as i32)))
            .collect();

        let resumed_bytes: u64 = session
            .existing_parts
            .keys()
            .map(|p| part_range(*p as u32, part_size, file_size).1)
            .sum();

        let progress = Arc::new(Mutex::new(ProgressState {
            bytes_uploaded: resumed_bytes,
            total_bytes: file_size,
            started_at: Instant::now(),
        }));

        let semaphore = Arc::new(Semaphore::new(options.worker_pool_width.max(1)));
        let local_path = Arc::new(local_path.to_path_buf());
        let mut handles: Vec<JoinHandle<Result<(i32, String), StorageError>>> = Vec::new();

        for part_number in missing {
            let permit_sem = semaphore.clone();
            let client = self.client.clone();
            let bucket = bucket.to_string();
            let key_owned = key.to_string();
            let upload_id = session.upload_id.clone();
            let path = local_path.clone();
            let progress = progress.clone();
            let cb = options.progress_cb.clone();
            let max_retries = options.max_retries;

            let handle = tokio::spawn(async move {
                let _permit = permit_sem
                    .acquire_owned()
                    .await
                    .expect("upload worker semaphore should never be closed");
                let (offset, length) = part_range(part_number, part_size, file_size);
                let etag = upload_part_with_retry(
                    &client,
                    &bucket,
                    &key_owned,
                    &upload_id,
                    part_number as i32,
                    &path,
                    offset,
                    length,
                    max_retries,
                )
                .await?;

                let snapshot = {
                    let mut state = progress.lock().unwrap();
                    state.bytes_uploaded += length;
                    let elapsed = state.started_at.elapsed().as_secs_f64().max(0.001);
                    let speed_mb_s = (state.bytes_uploaded as f64 / (1024.0 * 1024.0)) / elapsed;
                    ProgressSnapshot {
                        bytes_uploaded: state.bytes_uploaded,
                        total_bytes: state.total_bytes,
                        speed_mb_s,
                    }
                };
                if let Some(cb) = &cb {
                    cb(snapshot);
                }

                Ok((part_number as i32, etag))
            });
            handles.push(handle);
        }

        let mut all_parts: HashMap<i32, String> = session.existing_parts.clone();
        let mut first_error: Option<StorageError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok((part_number, etag))) => {
                    all_parts.insert(part_number, etag);
                }
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(StorageError::other(join_err.to_string()));
                    }
                }
            }
        }

        if let Some(err) = first_error {
            log::error!(
                "upload of {key} interrupted: upload_id={} parts_uploaded={} of {total}",
                session.upload_id,
                all_parts.len()
            );
            return Err(err);
        }

        let mut ordered: Vec<(i32, String)> = all_parts.into_iter().collect();
        ordered.sort_by_key(|(n, _)| *n);

        let etag = self
            .complete_with_timeout_retry(bucket, key, &session.upload_id, ordered, file_size, options.max_retries)
            .await?;

        Ok(UploadOutcome {
            etag,
            size: file_size,
            resumed_parts: resumed_count,
            uploaded_parts: total as usize - resumed_count,
        })
    }

    async fn upload_single_shot(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        file_size: u64,
    ) -> Result<UploadOutcome, StorageError> {
        let mut buf = Vec::with_capacity(file_size as usize);
        File::open(local_path).await?.read_to_end(&mut buf).await?;
        let etag = self.client.put_object(bucket, key, buf).await?;
        Ok(UploadOutcome {
            etag,
            size: file_size,
            resumed_parts: 0,
            uploaded_parts: usize::from(file_size > 0),
        })
    }

    /// Finds a resumable session: lists multipart uploads on the bucket,
    /// filters by key (leading-slash normalized), and adopts the first one
    /// whose uploaded parts are compatible with `file_size`/`part_size`.
    async fn discover_session(
        &self,
        bucket: &str,
        key: &str,
        part_size: u64,
        file_size: u64,
    ) -> Result<Option<UploadSession>, StorageError> {
        let candidates = self.client.list_multipart_uploads(bucket).await?;
        for candidate in candidates.into_iter().filter(|u| keys_match(&u.key, key)) {
            let parts = self
                .client
                .list_parts(bucket, key, &candidate.upload_id)
                .await?;
            if is_compatible(&parts, part_size, file_size) {
                let map = parts.into_iter().map(|p| (p.part_number, p.etag)).collect();
                return Ok(Some(UploadSession::resumed(candidate.upload_id, map)));
            }
        }
        Ok(None)
    }

    /// Completes a multipart upload, doubling the timeout and rebuilding the
    /// client on every retry. A size mismatch after a successful completion
    /// is fatal and never retried.
    async fn complete_with_timeout_retry(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
        expected_size: u64,
        max_retries: u32,
    ) -> Result<String, StorageError> {
        let file_gib = expected_size as f64 / (1024.0 * 1024.0 * 1024.0);
        let mut timeout = Duration::from_secs(60u64.max((file_gib.ceil() as u64) * 5));
        let mut client = self.client.clone();
        let mut config = self.config.clone();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match client.complete_multipart(bucket, key, upload_id, parts.clone()).await {
                Ok(etag) => {
                    let (size, _) = client.head_object(bucket, key).await?;
                    if size != expected_size {
                        return Err(StorageError::ProtocolMismatch(
                            ErrorContext::new().key(key),
                            format!("completed object size {size} != expected {expected_size}"),
                        ));
                    }
                    return Ok(etag);
                }
                Err(e) => {
                    let no_such_upload =
                        matches!(&e, StorageError::ProtocolMismatch(_, msg) if msg == "NoSuchUpload");
                    if !no_such_upload && !e.is_transient() {
                        return Err(e);
                    }
                    if !no_such_upload {
                        log::warn!(
                            "complete_multipart attempt {attempt} for {key} failed: {e}; waiting {timeout:?} before probing"
                        );
                        tokio::time::sleep(timeout).await;
                    }

                    if let Ok((size, etag)) = client.head_object(bucket, key).await {
                        if size == expected_size {
                            return Ok(etag.unwrap_or_default());
                        }
                    }

                    if attempt >= max_retries {
                        return Err(e);
                    }
                    timeout *= 2;
                    config = config.with_operation_timeout(timeout);
                    client = ObjectStoreClient::connect(&config).await?;
                }
            }
        }
    }

    /// Aborts every multipart session on `bucket` initiated more than
    /// `max_age` ago. Safe to run concurrently with normal uploads: it never
    /// touches sessions younger than `max_age`.
    pub async fn cleanup_abandoned(&self, bucket: &str, max_age: Duration) -> Result<usize, StorageError> {
        let uploads = self.client.list_multipart_uploads(bucket).await?;
        let now = Utc::now();
        let mut aborted = 0usize;

        for upload in uploads {
            let Some(initiated) = upload.initiated else { continue };
            let age = now.signed_duration_since(initiated);
            let Ok(age) = age.to_std() else { continue };
            if age >= max_age {
                self.client
                    .abort_multipart(bucket, &upload.key, &upload.upload_id)
                    .await?;
                aborted += 1;
            }
        }

        Ok(aborted)
    }
}

/// Uploads one part with up to `max_retries` attempts and exponential
/// backoff. Each attempt reopens the file and re-seeks rather than sharing a
/// handle across attempts, mirroring the original's per-attempt file open.
#[allow(clippy::too_many_arguments)]
async fn upload_part_with_retry(
    client: &ObjectStoreClient,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: i32,
    path: &Path,
    offset: u64,
    length: u64,
    max_retries: u32,
) -> Result<String, StorageError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let mut file = File::open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).await?;

        match client.upload_part(bucket, key, upload_id, part_number, buf).await {
            Ok(etag) => return Ok(etag),
            Err(e @ StorageError::InsufficientStorage(_)) => return Err(e),
            Err(e) => {
                if attempt >= max_retries {
                    return Err(e);
                }
                let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                log::warn!(
                    "upload_part {part_number} for {key} failed (attempt {attempt}): {e}; retrying in {backoff:?}"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
