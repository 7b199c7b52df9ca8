use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AiError, Result};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(rename = "responseModalities", skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(rename = "imageConfig", skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImageConfig {
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResponsePart {
    pub text: Option<String>,
    #[serde(rename = "inlineData")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InlineData {
    pub data: String,
}

impl GenerateResponse {
    pub fn text(&self) -> Option<String> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.clone())
            .next()
    }

    pub fn inline_data(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.as_str())
            .next()
    }
}

pub(crate) struct GeminiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            api_key: api_key.to_string(),
            http,
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        debug!(model, "Gemini generate request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::from_status(status.as_u16(), error_text));
        }

        Ok(response.json().await?)
    }
}
