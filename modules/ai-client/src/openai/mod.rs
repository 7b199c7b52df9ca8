mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::ImageModel;
use crate::util;

use client::OpenAiClient;

pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1.5";

/// OpenAI image generation, the fallback provider when Gemini fails.
pub struct OpenAiImageModel {
    client: OpenAiClient,
    model: String,
}

impl OpenAiImageModel {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: OpenAiClient::new(api_key),
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
impl ImageModel for OpenAiImageModel {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        // Wrap the story prompt in the newsletter's editorial style.
        let enhanced = format!(
            "Create a professional editorial illustration for a tech newsletter.\n\
             Style: Modern, clean, abstract representation. No text, logos, or faces.\n\
             Theme: {prompt}\n\
             Mood: Professional, informative, visually striking.\n\
             Colors: Vibrant but corporate-appropriate."
        );

        util::with_retry("openai_image", || {
            self.client.generate_image(&self.model, &enhanced)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "gpt"
    }
}
