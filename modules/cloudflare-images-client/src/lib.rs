pub mod error;

pub use error::{CloudflareImagesError, Result};

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    result: Option<UploadResult>,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    #[serde(default)]
    variants: Vec<String>,
}

/// Cloudflare Images host client. Uploads carry a caller-chosen unique id;
/// a 409 surfaces as `Conflict` so the caller can retry with a
/// finer-grained id.
pub struct CloudflareImagesClient {
    http: reqwest::Client,
    api_key: String,
    upload_url: String,
}

impl CloudflareImagesClient {
    pub fn new(account_id: &str, api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            api_key: api_key.to_string(),
            upload_url: format!(
                "https://api.cloudflare.com/client/v4/accounts/{account_id}/images/v1"
            ),
        }
    }

    pub fn with_upload_url(mut self, url: &str) -> Self {
        self.upload_url = url.to_string();
        self
    }

    /// Upload image bytes under `unique_id`, returning the first variant URL.
    pub async fn upload(
        &self,
        image_bytes: Vec<u8>,
        filename: &str,
        unique_id: &str,
    ) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(image_bytes)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")
            .expect("static mime type");
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("id", unique_id.to_string());

        info!(id = unique_id, "Cloudflare Images upload starting");

        let response = self
            .http
            .post(&self.upload_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 409 {
            warn!(id = unique_id, "Cloudflare Images id conflict");
            return Err(CloudflareImagesError::Conflict {
                id: unique_id.to_string(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CloudflareImagesError::Api {
                status: status.as_u16(),
                message: message.chars().take(500).collect(),
            });
        }

        let parsed: UploadResponse = response.json().await.map_err(CloudflareImagesError::Http)?;
        if !parsed.success {
            return Err(CloudflareImagesError::Api {
                status: status.as_u16(),
                message: "upload reported success=false".into(),
            });
        }

        let variant = parsed
            .result
            .and_then(|r| r.variants.into_iter().next())
            .ok_or(CloudflareImagesError::NoVariant)?;

        info!(id = unique_id, url = %variant, "Cloudflare Images upload complete");
        Ok(variant)
    }
}
