pub mod error;

pub use error::{CloudinaryError, Result};

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

/// Cloudinary image CDN client. Uploads with an unsigned preset, then derives
/// an optimized URL by injecting a transformation segment and fetches the
/// optimized bytes back for re-hosting.
pub struct CloudinaryClient {
    http: reqwest::Client,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryClient {
    pub fn new(cloud_name: &str, upload_preset: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            cloud_name: cloud_name.to_string(),
            upload_preset: upload_preset.to_string(),
        }
    }

    /// Upload raw image bytes, returning the delivered URL.
    pub async fn upload(&self, image_bytes: Vec<u8>) -> Result<String> {
        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );

        debug!(bytes = image_bytes.len(), "Cloudinary upload starting");

        let part = reqwest::multipart::Part::bytes(image_bytes)
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .expect("static mime type");
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CloudinaryError::Api {
                status: status.as_u16(),
                message: message.chars().take(500).collect(),
            });
        }

        let parsed: UploadResponse = response.json().await?;
        let raw_url = parsed
            .secure_url
            .or(parsed.url)
            .ok_or(CloudinaryError::NoUrl)?;

        info!(url = %raw_url, "Cloudinary upload complete");
        Ok(raw_url)
    }

    /// Rewrite a delivered URL to include the newsletter optimization
    /// transformation (scale to `width`, eco quality, WebP).
    pub fn optimized_url(raw_url: &str, width: u32) -> String {
        raw_url
            .replace("http://res.cloudinary.com", "https://res.cloudinary.com")
            .replace(
                "/upload/",
                &format!("/upload/c_scale,w_{width},q_auto:eco,f_webp/"),
            )
    }

    /// Fetch the optimized variant's bytes.
    pub async fn fetch_optimized(&self, optimized_url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(optimized_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CloudinaryError::Api {
                status: status.as_u16(),
                message: format!("failed to fetch optimized image: {optimized_url}"),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Upload + rewrite + fetch in one pass.
    pub async fn optimize(&self, image_bytes: Vec<u8>, width: u32) -> Result<Vec<u8>> {
        let raw_url = self.upload(image_bytes).await?;
        let optimized = Self::optimized_url(&raw_url, width);
        debug!(url = %optimized, "Fetching optimized image");
        self.fetch_optimized(&optimized).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_upload_segment() {
        let url = "https://res.cloudinary.com/demo/image/upload/v123/abc.jpg";
        assert_eq!(
            CloudinaryClient::optimized_url(url, 636),
            "https://res.cloudinary.com/demo/image/upload/c_scale,w_636,q_auto:eco,f_webp/v123/abc.jpg"
        );
    }

    #[test]
    fn upgrades_plain_http() {
        let url = "http://res.cloudinary.com/demo/image/upload/v123/abc.jpg";
        let optimized = CloudinaryClient::optimized_url(url, 636);
        assert!(optimized.starts_with("https://"));
    }
}
