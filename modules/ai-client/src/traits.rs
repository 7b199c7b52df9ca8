use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// =============================================================================
// Text completion
// =============================================================================

/// A single text-completion request. `system` is optional; everything else
/// has a sensible default for short structured calls.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1500,
            temperature: 0.5,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, request: TextRequest) -> Result<String>;
    fn name(&self) -> &'static str;
}

// =============================================================================
// Batch classification
// =============================================================================

/// One classifier hit: the story the model matched and the headline it saw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierMatch {
    pub story_id: String,
    #[serde(default)]
    pub headline: String,
}

/// Batch topical classifier. Implementations chunk `candidates` at
/// `crate::util::CLASSIFIER_CHUNK_SIZE` and concatenate matches; a failed
/// chunk is tolerated unless every chunk fails.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        system_prompt: &str,
        candidates: &[Value],
    ) -> Result<Vec<ClassifierMatch>>;
    fn name(&self) -> &'static str;
}

// =============================================================================
// Image generation
// =============================================================================

#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Generate a 16:9 editorial image for the prompt. Returns raw bytes.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
    fn name(&self) -> &'static str;
}
