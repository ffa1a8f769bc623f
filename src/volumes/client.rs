use reqwest::{Client, StatusCode};

use crate::error::{ErrorContext, StorageError};
use crate::registry::EndpointRegistry;

use super::model::{CreateVolumeBody, UpdateVolumeBody, Volume};

const PRIMARY_PATH: &str = "networkvolumes";
const FALLBACK_PATH: &str = "network-volumes";

/// REST client for network-volume lifecycle operations against the
/// management plane. Every call is a single bearer-token-authenticated HTTP
/// request; no local caching.
pub struct VolumeCatalogClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl VolumeCatalogClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn list(&self) -> Result<Vec<Volume>, StorageError> {
        let resp = self
            .http
            .get(self.url(PRIMARY_PATH))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            let resp = self
                .http
                .get(self.url(FALLBACK_PATH))
                .bearer_auth(&self.api_key)
                .send()
                .await?;
            return Self::parse_volume_list(resp).await;
        }

        Self::parse_volume_list(resp).await
    }

    async fn parse_volume_list(resp: reqwest::Response) -> Result<Vec<Volume>, StorageError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Management(
                ErrorContext::new().status(status.as_u16()),
                body,
            ));
        }
        resp.json::<Vec<Volume>>()
            .await
            .map_err(|e| StorageError::Management(ErrorContext::new(), e.to_string()))
    }

    pub async fn get(&self, volume_id: &str) -> Result<Volume, StorageError> {
        let resp = self
            .http
            .get(self.url(&format!("{PRIMARY_PATH}/{volume_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::VolumeNotFound(volume_id.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Management(
                ErrorContext::new().volume(volume_id).status(status.as_u16()),
                body,
            ));
        }
        resp.json::<Volume>()
            .await
            .map_err(|e| StorageError::Management(ErrorContext::new().volume(volume_id), e.to_string()))
    }

    pub async fn create(
        &self,
        name: &str,
        size_gib: u32,
        datacenter_id: &str,
    ) -> Result<Volume, StorageError> {
        validate_name(name)?;
        validate_size(size_gib)?;
        let registry = EndpointRegistry::new();
        let dc = registry.lookup(datacenter_id)?;

        let body = CreateVolumeBody {
            name: name.to_string(),
            size: size_gib,
            datacenter_id: dc.id.to_string(),
        };

        let resp = self
            .http
            .post(self.url(PRIMARY_PATH))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(StorageError::Management(
                ErrorContext::new().status(status.as_u16()),
                body_text,
            ));
        }
        resp.json::<Volume>()
            .await
            .map_err(|e| StorageError::Management(ErrorContext::new(), e.to_string()))
    }

    pub async fn update(
        &self,
        volume_id: &str,
        name: Option<String>,
        size: Option<u32>,
    ) -> Result<Volume, StorageError> {
        if name.is_none() && size.is_none() {
            return Err(StorageError::ValidationFailed(
                "update requires at least one of name or size".to_string(),
            ));
        }
        if let Some(n) = &name {
            validate_name(n)?;
        }
        if let Some(s) = size {
            validate_size(s)?;
        }

        let resp = self
            .http
            .patch(self.url(&format!("{PRIMARY_PATH}/{volume_id}")))
            .bearer_auth(&self.api_key)
            .json(&UpdateVolumeBody { name, size })
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::VolumeNotFound(volume_id.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Management(
                ErrorContext::new().volume(volume_id).status(status.as_u16()),
                body,
            ));
        }
        resp.json::<Volume>()
            .await
            .map_err(|e| StorageError::Management(ErrorContext::new().volume(volume_id), e.to_string()))
    }

    pub async fn delete(&self, volume_id: &str) -> Result<bool, StorageError> {
        let resp = self
            .http
            .delete(self.url(&format!("{PRIMARY_PATH}/{volume_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Management(
                ErrorContext::new().volume(volume_id).status(status.as_u16()),
                body,
            ));
        }
        Ok(true)
    }
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.len() > 64 {
        return Err(StorageError::ValidationFailed(format!(
            "volume name must be 1..64 characters, got {}",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StorageError::ValidationFailed(format!(
            "volume name '{name}' must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(())
}

fn validate_size(size_gib: u32) -> Result<(), StorageError> {
    if !(10..=4000).contains(&size_gib) {
        return Err(StorageError::ValidationFailed(format!(
            "volume size must be between 10 and 4000 GiB, got {size_gib}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name(&"a".repeat(65)).is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("valid-name_1").is_ok());
    }

    #[test]
    fn rejects_out_of_range_size() {
        assert!(validate_size(9).is_err());
        assert!(validate_size(4001).is_err());
        assert!(validate_size(10).is_ok());
        assert!(validate_size(4000).is_ok());
    }
}
