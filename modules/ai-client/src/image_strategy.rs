use tracing::{info, warn};

use crate::error::{AiError, Result};
use crate::traits::ImageModel;

/// A generated image and the provider that produced it.
#[derive(Debug)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub source: &'static str,
}

/// Primary/fallback image generation strategy. The fallback is tried on any
/// non-auth failure of the primary.
pub struct ImageGenerator {
    primary: Box<dyn ImageModel>,
    fallback: Option<Box<dyn ImageModel>>,
}

impl ImageGenerator {
    pub fn new(primary: Box<dyn ImageModel>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn ImageModel>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
        match self.primary.generate(prompt).await {
            Ok(bytes) => {
                info!(source = self.primary.name(), bytes = bytes.len(), "Image generated");
                return Ok(GeneratedImage {
                    bytes,
                    source: self.primary.name(),
                });
            }
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                warn!(source = self.primary.name(), error = %e, "Primary image generator failed");
                if self.fallback.is_none() {
                    return Err(e);
                }
            }
        }

        let fallback = self.fallback.as_ref().expect("checked above");
        let bytes = fallback.generate(prompt).await?;
        info!(source = fallback.name(), bytes = bytes.len(), "Image generated via fallback");
        Ok(GeneratedImage {
            bytes,
            source: fallback.name(),
        })
    }
}
