use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::objectstore::{ObjectInfo, ObjectStoreClient, ObjectStoreConfig};
use crate::registry::EndpointRegistry;
use crate::sync::{DirectorySyncCoordinator, SyncOutcome};
use crate::upload::{MultipartUploadEngine, ProgressCallback, UploadOptions, UploadOutcome};
use crate::volumes::{Volume, VolumeCatalogClient};

/// Single entry point consumers of this crate talk to. Resolves a volume's
/// datacenter once per call and caches one [`ObjectStoreClient`] per
/// datacenter across calls.
pub struct RunvolumeStorage {
    config: StorageConfig,
    volumes: VolumeCatalogClient,
    registry: EndpointRegistry,
    clients: Mutex<HashMap<String, ObjectStoreClient>>,
}

impl RunvolumeStorage {
    pub fn new(config: StorageConfig) -> Self {
        let volumes = VolumeCatalogClient::new(config.api_base_url.clone(), config.api_key.clone());
        Self {
            config,
            volumes,
            registry: EndpointRegistry::new(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Result<Self, StorageError> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    pub async fn list_volumes(&self) -> Result<Vec<Volume>, StorageError> {
        self.volumes.list().await
    }

    pub async fn get_volume(&self, volume_id: &str) -> Result<Volume, StorageError> {
        self.volumes.get(volume_id).await
    }

    pub async fn create_volume(
        &self,
        name: &str,
        size_gib: u32,
        datacenter_id: &str,
    ) -> Result<Volume, StorageError> {
        self.volumes.create(name, size_gib, datacenter_id).await
    }

    pub async fn update_volume(
        &self,
        volume_id: &str,
        name: Option<String>,
        size: Option<u32>,
    ) -> Result<Volume, StorageError> {
        self.volumes.update(volume_id, name, size).await
    }

    pub async fn delete_volume(&self, volume_id: &str) -> Result<bool, StorageError> {
        self.volumes.delete(volume_id).await
    }

    pub async fn list_files(&self, volume_id: &str, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let client = self.client_for(volume_id).await?;
        client.list_objects(volume_id, prefix).await
    }

    pub async fn delete_file(&self, volume_id: &str, key: &str) -> Result<(), StorageError> {
        let client = self.client_for(volume_id).await?;
        client.delete_object(volume_id, key).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upload_file(
        &self,
        local_path: &Path,
        volume_id: &str,
        key: &str,
        part_size: Option<u64>,
        enable_resume: Option<bool>,
        progress_cb: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, StorageError> {
        let (client, store_config) = self.client_and_config_for(volume_id).await?;
        let engine = MultipartUploadEngine::new(client, store_config);
        let options = UploadOptions {
            part_size: part_size.or(self.config.part_size),
            enable_resume: enable_resume.unwrap_or(self.config.enable_resume),
            progress_cb,
            ..self.default_upload_options()
        };
        engine.upload_file(local_path, volume_id, key, &options).await
    }

    pub async fn download_file(
        &self,
        volume_id: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StorageError> {
        let client = self.client_for(volume_id).await?;
        let bytes = client.get_object(volume_id, key).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    pub async fn upload_directory(
        &self,
        local_dir: &Path,
        volume_id: &str,
        remote_prefix: &str,
        exclude_patterns: &[String],
        delete: bool,
        progress_cb: Option<ProgressCallback>,
    ) -> Result<SyncOutcome, StorageError> {
        let (client, store_config) = self.client_and_config_for(volume_id).await?;
        let engine = MultipartUploadEngine::new(client.clone(), store_config);
        let coordinator = DirectorySyncCoordinator::new(
            engine,
            client,
            self.config.worker_pool_width,
            self.default_upload_options(),
        );
        coordinator
            .upload_directory(local_dir, volume_id, remote_prefix, exclude_patterns, delete, progress_cb)
            .await
    }

    pub async fn download_directory(
        &self,
        volume_id: &str,
        remote_prefix: &str,
        local_dir: &Path,
        progress_cb: Option<ProgressCallback>,
    ) -> Result<SyncOutcome, StorageError> {
        let (client, store_config) = self.client_and_config_for(volume_id).await?;
        let engine = MultipartUploadEngine::new(client.clone(), store_config);
        let coordinator = DirectorySyncCoordinator::new(
            engine,
            client,
            self.config.worker_pool_width,
            self.default_upload_options(),
        );
        coordinator
            .download_directory(volume_id, remote_prefix, local_dir, progress_cb)
            .await
    }

    pub async fn cleanup_abandoned_uploads(&self, volume_id: &str, max_age: Duration) -> Result<usize, StorageError> {
        let (client, store_config) = self.client_and_config_for(volume_id).await?;
        let engine = MultipartUploadEngine::new(client, store_config);
        engine.cleanup_abandoned(volume_id, max_age).await
    }

    async fn client_for(&self, volume_id: &str) -> Result<ObjectStoreClient, StorageError> {
        let (client, _) = self.client_and_config_for(volume_id).await?;
        Ok(client)
    }

    /// The engine options implied by this instance's `StorageConfig`, with
    /// no progress callback attached. Callers override `part_size`,
    /// `enable_resume` and `progress_cb` per call as needed.
    fn default_upload_options(&self) -> UploadOptions {
        UploadOptions {
            part_size: self.config.part_size,
            max_retries: self.config.max_retries,
            enable_resume: self.config.enable_resume,
            worker_pool_width: self.config.worker_pool_width,
            progress_cb: None,
        }
    }

    async fn client_and_config_for(
        &self,
        volume_id: &str,
    ) -> Result<(ObjectStoreClient, ObjectStoreConfig), StorageError> {
        let volume = self.volumes.get(volume_id).await?;
        let dc = self.registry.lookup(&volume.datacenter_id)?;

        let store_config = ObjectStoreConfig {
            endpoint: dc.endpoint.to_string(),
            region: dc.region.to_string(),
            access_key: self.config.s3_access_key.clone(),
            secret_key: self.config.s3_secret_key.clone(),
            operation_timeout: None,
        };

        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(dc.id) {
            return Ok((client.clone(), store_config));
        }

        let client = ObjectStoreClient::connect(&store_config).await?;
        clients.insert(dc.id.to_string(), client.clone());
        Ok((client, store_config))
    }
}
