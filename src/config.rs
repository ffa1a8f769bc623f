use std::env;

use crate::error::StorageError;

/// Library-level configuration. Construct with [`StorageConfig::from_env`] to
/// pick up the same environment variables the original CLI tooling used, or
/// build one by hand with [`StorageConfig::new`] for embedding in a larger
/// application.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    /// Retry ceiling for both the engine's own part/completion retries and
    /// the management-plane client's 5xx backoff.
    pub max_retries: u32,
    /// Fixed part size in bytes. `None` means adaptive sizing by file size.
    pub part_size: Option<u64>,
    pub enable_resume: bool,
    pub worker_pool_width: usize,
}

impl StorageConfig {
    pub const DEFAULT_API_BASE_URL: &'static str = "https://rest.runvolume.io/v1";
    const DEFAULT_MAX_RETRIES: u32 = 5;
    const DEFAULT_WORKER_POOL_WIDTH: usize = 4;

    /// Reads `RUNVOLUME_API_KEY`, `RUNVOLUME_S3_ACCESS_KEY` and
    /// `RUNVOLUME_S3_SECRET_KEY` from the environment. `RUNVOLUME_API_BASE_URL`,
    /// `RUNVOLUME_MAX_RETRIES` and `RUNVOLUME_WORKER_POOL_WIDTH` override the
    /// built-in defaults when present.
    pub fn from_env() -> Result<Self, StorageError> {
        let api_key = require_env("RUNVOLUME_API_KEY")?;
        let s3_access_key = require_env("RUNVOLUME_S3_ACCESS_KEY")?;
        let s3_secret_key = require_env("RUNVOLUME_S3_SECRET_KEY")?;

        let mut config = Self::new(api_key, s3_access_key, s3_secret_key);

        if let Ok(url) = env::var("RUNVOLUME_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(n) = env::var("RUNVOLUME_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_retries = n;
        }
        if let Some(n) = env::var("RUNVOLUME_WORKER_POOL_WIDTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &usize| *v > 0)
        {
            config.worker_pool_width = n;
        }

        Ok(config)
    }

    pub fn new(
        api_key: impl Into<String>,
        s3_access_key: impl Into<String>,
        s3_secret_key: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            s3_access_key: s3_access_key.into(),
            s3_secret_key: s3_secret_key.into(),
            max_retries: Self::DEFAULT_MAX_RETRIES,
            part_size: None,
            enable_resume: true,
            worker_pool_width: Self::DEFAULT_WORKER_POOL_WIDTH,
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_part_size(mut self, bytes: u64) -> Self {
        self.part_size = Some(bytes);
        self
    }

    pub fn with_enable_resume(mut self, enabled: bool) -> Self {
        self.enable_resume = enabled;
        self
    }

    pub fn with_worker_pool_width(mut self, n: usize) -> Self {
        self.worker_pool_width = n.max(1);
        self
    }
}

fn require_env(name: &str) -> Result<String, StorageError> {
    env::var(name).map_err(|_| StorageError::ValidationFailed(format!("{name} is not set")))
}
