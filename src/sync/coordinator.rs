use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::error::{FailedItem, StorageError};
use crate::objectstore::ObjectStoreClient;
use crate::upload::{MultipartUploadEngine, ProgressCallback, ProgressSnapshot, UploadOptions};

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub uploaded: usize,
    pub downloaded: usize,
    pub skipped_excluded: usize,
    pub deleted: usize,
    pub failed: Vec<FailedItem>,
}

/// Walks a local tree, applies exclusion globs, and concurrently uploads or
/// downloads files via the per-file primitives, with optional deletion of
/// remote orphans after an upload run.
pub struct DirectorySyncCoordinator {
    engine: Arc<MultipartUploadEngine>,
    store: ObjectStoreClient,
    worker_pool_width: usize,
    upload_options: UploadOptions,
}

impl DirectorySyncCoordinator {
    /// `upload_options` carries the caller's configured `part_size`,
    /// `max_retries` and `enable_resume` through to every per-file
    /// `engine.upload_file` call; its `progress_cb` is ignored in favor of
    /// the one passed to `upload_directory` per call.
    pub fn new(
        engine: MultipartUploadEngine,
        store: ObjectStoreClient,
        worker_pool_width: usize,
        upload_options: UploadOptions,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            store,
            worker_pool_width: worker_pool_width.max(1),
            upload_options,
        }
    }

    pub async fn upload_directory(
        &self,
        local_dir: &Path,
        bucket: &str,
        remote_prefix: &str,
        exclude_patterns: &[String],
        delete: bool,
        progress_cb: Option<ProgressCallback>,
    ) -> Result<SyncOutcome, StorageError> {
        let files = collect_local_files(local_dir)?;
        let prefix = remote_prefix.trim_matches('/');

        let mut jobs = Vec::new();
        let mut skipped = 0usize;
        for path in files {
            let relative = relative_path(local_dir, &path)?;
            if exclude_patterns.iter().any(|pat| glob_match::glob_match(pat, &relative)) {
                skipped += 1;
                continue;
            }
            let remote_key = join_key(prefix, &relative);
            jobs.push((path, remote_key));
        }

        let existing_remote: HashSet<String> = if delete {
            self.store
                .list_objects(bucket, prefix)
                .await?
                .into_iter()
                .map(|o| o.key)
                .collect()
        } else {
            HashSet::new()
        };

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_width));
        let mut handles = Vec::new();
        for (local_path, remote_key) in jobs.iter().cloned() {
            let sem = semaphore.clone();
            let engine = self.engine.clone();
            let bucket = bucket.to_string();
            let cb = progress_cb.clone();
            let options = UploadOptions { progress_cb: cb, ..self.upload_options.clone() };
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("sync semaphore should never be closed");
                let result = engine.upload_file(&local_path, &bucket, &remote_key, &options).await;
                (remote_key, result)
            }));
        }

        let mut outcome = SyncOutcome { skipped_excluded: skipped, ..Default::default() };
        let mut uploaded_keys = HashSet::new();
        for handle in handles {
            let (remote_key, result) = handle.await.map_err(|e| StorageError::other(e.to_string()))?;
            match result {
                Ok(_) => {
                    outcome.uploaded += 1;
                    uploaded_keys.insert(remote_key);
                }
                Err(e) => outcome.failed.push(FailedItem { key: remote_key, error: e }),
            }
        }

        if delete {
            let orphans: Vec<&String> = existing_remote.difference(&uploaded_keys).collect();
            for orphan in orphans {
                self.store.delete_object(bucket, orphan).await?;
                outcome.deleted += 1;
            }
        }

        if outcome.failed.is_empty() {
            Ok(outcome)
        } else {
            Err(StorageError::Partial(
                std::mem::take(&mut outcome.failed),
                outcome.uploaded,
            ))
        }
    }

    pub async fn download_directory(
        &self,
        bucket: &str,
        remote_prefix: &str,
        local_dir: &Path,
        progress_cb: Option<ProgressCallback>,
    ) -> Result<SyncOutcome, StorageError> {
        let prefix = remote_prefix.trim_matches('/');
        let objects = self.store.list_objects(bucket, prefix).await?;

        let total_bytes: u64 = objects.iter().map(|o| o.size).sum();
        let bytes_downloaded = Arc::new(Mutex::new(0u64));
        let started_at = Instant::now();

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_width));
        let mut handles = Vec::new();
        for object in objects {
            let sem = semaphore.clone();
            let store = self.store.clone();
            let bucket = bucket.to_string();
            let local_dir = local_dir.to_path_buf();
            let prefix = prefix.to_string();
            let cb = progress_cb.clone();
            let bytes_downloaded = bytes_downloaded.clone();
            let size = object.size;
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("sync semaphore should never be closed");
                let relative = object.key.strip_prefix(&prefix).unwrap_or(&object.key).trim_start_matches('/');
                let dest = local_dir.join(relative);
                let result = async {
                    if let Some(parent) = dest.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    let bytes = store.get_object(&bucket, &object.key).await?;
                    tokio::fs::write(&dest, bytes).await?;
                    Ok::<(), StorageError>(())
                }
                .await;

                if result.is_ok() {
                    let snapshot = {
                        let mut downloaded = bytes_downloaded.lock().unwrap();
                        *downloaded += size;
                        let elapsed = started_at.elapsed().as_secs_f64().max(0.001);
                        ProgressSnapshot {
                            bytes_uploaded: *downloaded,
                            total_bytes,
                            speed_mb_s: (*downloaded as f64 / (1024.0 * 1024.0)) / elapsed,
                        }
                    };
                    if let Some(cb) = &cb {
                        cb(snapshot);
                    }
                }

                (object.key, result)
            }));
        }

        let mut outcome = SyncOutcome::default();
        for handle in handles {
            let (key, result) = handle.await.map_err(|e| StorageError::other(e.to_string()))?;
            match result {
                Ok(()) => outcome.downloaded += 1,
                Err(e) => outcome.failed.push(FailedItem { key, error: e }),
            }
        }

        if outcome.failed.is_empty() {
            Ok(outcome)
        } else {
            Err(StorageError::Partial(
                std::mem::take(&mut outcome.failed),
                outcome.downloaded,
            ))
        }
    }
}

/// Recursively walks `dir`, returning regular files only. Symlinked
/// directories are not followed.
fn collect_local_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                out.push(path);
            }
        }
    }

    Ok(out)
}

fn relative_path(base: &Path, path: &Path) -> Result<String, StorageError> {
    let rel = path
        .strip_prefix(base)
        .map_err(|_| StorageError::other(format!("{path:?} is not under {base:?}")))?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

fn join_key(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_prefix_and_relative() {
        assert_eq!(join_key("vol/prefix", "a.txt"), "vol/prefix/a.txt");
        assert_eq!(join_key("", "a.txt"), "a.txt");
    }

    #[test]
    fn excludes_match_glob() {
        assert!(glob_match::glob_match("*.DS_Store", ".DS_Store"));
        assert!(!glob_match::glob_match("*.DS_Store", "keep.txt"));
    }
}
