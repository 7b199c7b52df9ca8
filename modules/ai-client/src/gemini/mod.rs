mod client;

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use tracing::debug;

use crate::error::{AiError, Result};
use crate::traits::{Classifier, ClassifierMatch, ImageModel, TextModel, TextRequest};
use crate::util;

use client::{Content, GeminiClient, GenerateRequest, GenerationConfig, ImageConfig, TextPart};

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

/// Gemini agent: the fast model for batch classification and content
/// cleaning.
pub struct GeminiAgent {
    client: GeminiClient,
    model: String,
}

impl GeminiAgent {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: GeminiClient::new(api_key),
            model: DEFAULT_TEXT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

#[async_trait]
impl TextModel for GeminiAgent {
    async fn complete(&self, request: TextRequest) -> Result<String> {
        // Gemini has no separate system channel; prepend it to the prompt.
        let text = match &request.system {
            Some(system) => format!("{system}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        };

        let wire = GenerateRequest {
            contents: vec![Content {
                parts: vec![TextPart { text }],
            }],
            generation_config: GenerationConfig {
                temperature: Some(request.temperature),
                max_output_tokens: Some(request.max_tokens),
                ..Default::default()
            },
        };

        let response =
            util::with_retry("gemini_generate", || self.client.generate(&self.model, &wire))
                .await?;
        response
            .text()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| AiError::Upstream("Gemini response contained no text part".into()))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[async_trait]
impl Classifier for GeminiAgent {
    async fn classify(
        &self,
        system_prompt: &str,
        candidates: &[Value],
    ) -> Result<Vec<ClassifierMatch>> {
        util::classify_chunked(self, system_prompt, candidates).await
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Gemini image generation, the primary image provider. 16:9 aspect ratio,
/// inline base64 payload.
pub struct GeminiImageModel {
    client: GeminiClient,
    model: String,
}

impl GeminiImageModel {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: GeminiClient::new(api_key),
            model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

#[async_trait]
impl ImageModel for GeminiImageModel {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let wire = GenerateRequest {
            contents: vec![Content {
                parts: vec![TextPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                image_config: Some(ImageConfig {
                    aspect_ratio: "16:9".to_string(),
                }),
                ..Default::default()
            },
        };

        let response =
            util::with_retry("gemini_image", || self.client.generate(&self.model, &wire)).await?;

        let data = response
            .inline_data()
            .ok_or_else(|| AiError::Upstream("Gemini image response had no inline data".into()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| AiError::Upstream(format!("invalid base64 image payload: {e}")))?;

        debug!(bytes = bytes.len(), "Gemini image generated");
        Ok(bytes)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
