//! Off-chain asset store for campaign images.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{ClientError, Result};

/// Shown for campaigns without an image.
pub const PLACEHOLDER_IMAGE_URL: &str = "https://via.placeholder.com/200x200?text=No+Image";

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload one file and return its content reference.
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Pinning-service client (`pinFileToIPFS`-style endpoint).
pub struct PinningStore {
    client: Client,
    url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl PinningStore {
    pub fn new(client: Client, config: &Config) -> Self {
        PinningStore {
            client,
            url: config.asset_store_url.clone(),
            api_key: config.asset_store_api_key.clone(),
            api_secret: config.asset_store_api_secret.clone(),
        }
    }
}

#[async_trait]
impl AssetStore for PinningStore {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let size = bytes.len();
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("pinata_api_key", key);
        }
        if let Some(secret) = &self.api_secret {
            request = request.header("pinata_secret_api_key", secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::AssetUpload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Asset upload of {file_name} rejected ({status}): {body}");
            return Err(ClientError::AssetUpload(format!("{status}: {body}")));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| ClientError::AssetUpload(format!("unexpected response: {e}")))?;

        info!("Uploaded {file_name} ({size} bytes) as {}", pinned.ipfs_hash);
        Ok(pinned.ipfs_hash)
    }
}

/// Public URL for a content reference, or the placeholder when absent.
pub fn gateway_url(gateway: &str, asset_ref: Option<&str>) -> String {
    match asset_ref {
        Some(hash) if !hash.is_empty() => {
            format!("{}/ipfs/{hash}", gateway.trim_end_matches('/'))
        }
        _ => PLACEHOLDER_IMAGE_URL.to_string(),
    }
}
