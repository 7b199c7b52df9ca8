//! Scoring: extract content for newly ingested articles, score interest with
//! the reasoning model, and project high-interest rows into Selects.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use ai_client::{util, TextRequest};
use pivot_common::types::{FitStatus, Select};

use crate::deps::Deps;
use crate::jobs::StageError;
use crate::prompts;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Article text handed to the scorer is truncated to this budget.
const CONTENT_BUDGET: usize = 12_000;

#[derive(Debug, Default, Serialize)]
pub struct ScoringResult {
    pub scored: usize,
    pub high_interest: usize,
    pub selects_created: usize,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<ScoringResult> {
    let mut logger = ExecutionLogger::new(1, "ai_scoring");
    let mut result = ScoringResult::default();

    let articles = deps.store.articles_needing_scoring().await?;
    logger.info(format!("{} articles need scoring", articles.len()));

    for (article_id, article) in articles {
        // Individual article failures never block the batch.
        let content = match deps.fetcher.fetch(&article.canonical_url).await {
            Ok(content) => content,
            Err(e) => {
                logger.warn(format!(
                    "Content fetch failed for {}: {e}",
                    article.canonical_url
                ));
                result
                    .errors
                    .push(StageError::new(article.fingerprint.clone(), e));
                String::new()
            }
        };

        let truncated: String = content.chars().take(CONTENT_BUDGET).collect();
        let request = TextRequest::new(prompts::scoring(
            &article.title,
            &article.source_name,
            &truncated,
        ))
        .max_tokens(256)
        .temperature(0.3);

        let parsed = match deps.reasoning.complete(request).await {
            Ok(text) => util::extract_json_object(&text).ok(),
            Err(e) => {
                logger.warn(format!("Scoring call failed for {}: {e}", article.fingerprint));
                result
                    .errors
                    .push(StageError::new(article.fingerprint.clone(), e));
                None
            }
        };

        let Some(parsed) = parsed else {
            // Leave needs_scoring set; the next cycle retries this row.
            continue;
        };

        let interest_score = parsed
            .get("interest_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let topic = parsed
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let sentiment = parsed
            .get("sentiment")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        result.scored += 1;
        let fit = if interest_score >= deps.config.interest_threshold {
            result.high_interest += 1;
            let select = Select {
                fingerprint: article.fingerprint.clone(),
                source_name: article.source_name.clone(),
                canonical_url: article.canonical_url.clone(),
                headline: article.title.clone(),
                raw_body: truncated.clone(),
                cleaned_body: None,
                interest_score,
                topic,
                sentiment,
                published_at: Some(article.published_at),
                ai_processed_at: Utc::now(),
                extractor_session: None,
                extractor_used: false,
            };
            match deps.store.insert_select(&select).await {
                Ok(_) => result.selects_created += 1,
                Err(e) => {
                    logger.warn(format!("Select insert failed for {}: {e}", article.fingerprint));
                    result
                        .errors
                        .push(StageError::new(article.fingerprint.clone(), e));
                }
            }
            FitStatus::Scored
        } else {
            FitStatus::Rejected
        };

        if let Err(e) = deps.store.complete_scoring(&article_id, fit).await {
            logger.warn(format!("Could not clear scoring flag for {article_id}: {e}"));
            result.errors.push(StageError::new(article_id.clone(), e));
        }
    }

    logger.set_summary("articles_scored", result.scored);
    logger.set_summary("high_interest_count", result.high_interest);
    logger.set_summary("newsletter_selects_created", result.selects_created);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

/// Patch helper shared by the extraction jobs.
pub fn raw_body_patch(content: &str) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert("raw_body".into(), Value::String(content.to_string()));
    patch
}
