mod client;
mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AiError, Result};
use crate::traits::{Classifier, ClassifierMatch, TextModel, TextRequest};
use crate::util;

use client::ClaudeClient;
use types::{ChatRequest, WireMessage};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Claude agent: the reasoning model for slot selection, decoration, subject
/// lines, and summaries; also the secondary batch classifier.
pub struct ClaudeAgent {
    client: ClaudeClient,
    model: String,
}

impl ClaudeAgent {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: ClaudeClient::new(api_key),
            model: DEFAULT_MODEL.to_string(),
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
impl TextModel for ClaudeAgent {
    async fn complete(&self, request: TextRequest) -> Result<String> {
        let chat = ChatRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            messages: vec![WireMessage::user(request.prompt)],
            system: request.system,
            temperature: Some(request.temperature),
        };

        let response = util::with_retry("claude_chat", || self.client.chat(&chat)).await?;
        response
            .text()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| AiError::Upstream("Claude response contained no text block".into()))
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

#[async_trait]
impl Classifier for ClaudeAgent {
    async fn classify(
        &self,
        system_prompt: &str,
        candidates: &[Value],
    ) -> Result<Vec<ClassifierMatch>> {
        util::classify_chunked(self, system_prompt, candidates).await
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}
