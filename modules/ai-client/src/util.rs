use std::future::Future;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AiError, Result};
use crate::traits::{ClassifierMatch, TextModel, TextRequest};

/// Max candidates per classifier call.
pub const CLASSIFIER_CHUNK_SIZE: usize = 100;

/// Output-token cap for classifier calls on the slower model.
pub const CLASSIFIER_MAX_TOKENS: u32 = 8192;

/// Retry attempts for model calls.
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff between attempts. Rate limits use 5x this base.
const RETRY_BASE: Duration = Duration::from_secs(2);

/// Run a model call with up to MAX_ATTEMPTS tries and exponential backoff.
/// The caller receives the last error after exhaustion.
pub async fn with_retry<T, F, Fut>(op: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 0..MAX_ATTEMPTS {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                let base = if e.is_rate_limited() {
                    RETRY_BASE * 5
                } else {
                    RETRY_BASE
                };
                let backoff = base * 2u32.pow(attempt);
                let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                warn!(
                    op,
                    attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "Model call failed, retrying after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| AiError::Upstream("retry loop exhausted".into())))
}

/// Parse a JSON object out of a model response. Tries a direct parse first,
/// then the outermost brace block (models often wrap JSON in prose or fences).
pub fn extract_json_object(text: &str) -> Result<Value> {
    let trimmed = text.trim().trim_start_matches("```json").trim_matches('`');
    if let Ok(value) = serde_json::from_str::<Value>(trimmed.trim()) {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(AiError::Upstream(format!(
        "response is not valid JSON: {}",
        &text.chars().take(200).collect::<String>()
    )))
}

/// Recover `{"matches": [...]}` from a possibly malformed classifier
/// response. Falls back to per-object regex extraction.
pub fn extract_matches(text: &str) -> Vec<ClassifierMatch> {
    if let Ok(value) = extract_json_object(text) {
        if let Some(matches) = value.get("matches").and_then(Value::as_array) {
            return matches
                .iter()
                .filter_map(|m| serde_json::from_value(m.clone()).ok())
                .collect();
        }
    }

    // Regex salvage of individual match objects.
    let pattern =
        Regex::new(r#"\{\s*"story_id"\s*:\s*"([^"]+)"\s*,\s*"headline"\s*:\s*"([^"]+)"\s*\}"#)
            .expect("static regex");
    let recovered: Vec<ClassifierMatch> = pattern
        .captures_iter(text)
        .map(|c| ClassifierMatch {
            story_id: c[1].to_string(),
            headline: c[2].to_string(),
        })
        .collect();

    if !recovered.is_empty() {
        info!(count = recovered.len(), "Recovered matches via regex extraction");
    }
    recovered
}

/// Run a slot classification over `candidates` in sequential chunks of
/// CLASSIFIER_CHUNK_SIZE through a text model. A chunk failure is tolerated
/// unless every chunk fails.
pub async fn classify_chunked(
    model: &dyn TextModel,
    system_prompt: &str,
    candidates: &[Value],
) -> Result<Vec<ClassifierMatch>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let chunks: Vec<&[Value]> = candidates.chunks(CLASSIFIER_CHUNK_SIZE).collect();
    let total = chunks.len();
    let mut all_matches = Vec::new();
    let mut failures = 0usize;
    let mut last_err = None;

    for (i, chunk) in chunks.into_iter().enumerate() {
        let candidates_json =
            serde_json::to_string_pretty(chunk).map_err(|e| AiError::Upstream(e.to_string()))?;
        let prompt = format!(
            "CANDIDATES:\n{candidates_json}\n\n\
             Return ONLY valid JSON with matching story IDs:\n\
             {{\"matches\": [{{\"story_id\": \"...\", \"headline\": \"headline text\"}}]}}\n\n\
             If no stories match, return: {{\"matches\": []}}"
        );

        let request = TextRequest::new(prompt)
            .system(system_prompt)
            .max_tokens(CLASSIFIER_MAX_TOKENS)
            .temperature(0.3);

        // The model's own complete() retries transient failures.
        match model.complete(request.clone()).await {
            Ok(text) => {
                let matches = extract_matches(&text);
                info!(
                    model = model.name(),
                    chunk = i + 1,
                    total,
                    matches = matches.len(),
                    "Classifier chunk complete"
                );
                all_matches.extend(matches);
            }
            Err(e) => {
                warn!(model = model.name(), chunk = i + 1, total, error = %e, "Classifier chunk failed");
                failures += 1;
                last_err = Some(e);
            }
        }
    }

    if failures == total {
        return Err(last_err.unwrap_or_else(|| AiError::Upstream("all chunks failed".into())));
    }
    Ok(all_matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_clean_json() {
        let value = extract_json_object(r#"{"matches": []}"#).unwrap();
        assert!(value.get("matches").is_some());
    }

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let text = "Here are the results:\n{\"matches\": [{\"story_id\": \"p5-abc\", \"headline\": \"X\"}]}\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["matches"][0]["story_id"], "p5-abc");
    }

    #[test]
    fn extracts_json_in_code_fence() {
        let text = "```json\n{\"selected_id\": \"rec1\"}\n```";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["selected_id"], "rec1");
    }

    #[test]
    fn recovers_matches_from_malformed_response() {
        let text = r#"{"matches": [{"story_id": "p5-1", "headline": "A"}, {"story_id": "p5-2", "headline": "B"},"#;
        let matches = extract_matches(text);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].story_id, "p5-1");
        assert_eq!(matches[1].headline, "B");
    }

    #[test]
    fn empty_matches_on_garbage() {
        assert!(extract_matches("no json here at all").is_empty());
    }
}
