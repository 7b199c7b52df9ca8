use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AiError, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

pub(crate) struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            api_key: api_key.to_string(),
            http,
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub async fn generate_image(&self, model: &str, prompt: &str) -> Result<Vec<u8>> {
        let url = format!("{}/images/generations", self.base_url);

        debug!(model, "OpenAI image request");

        let request = ImageRequest {
            model,
            prompt,
            n: 1,
            // 16:9 to match the primary generator's aspect ratio.
            size: "1536x1024",
            response_format: "b64_json",
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::from_status(status.as_u16(), error_text));
        }

        let parsed: ImageResponse = response.json().await?;
        let b64 = parsed
            .data
            .first()
            .and_then(|d| d.b64_json.as_deref())
            .ok_or_else(|| AiError::Upstream("OpenAI image response had no b64 payload".into()))?;

        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| AiError::Upstream(format!("invalid base64 image payload: {e}")))
    }
}
