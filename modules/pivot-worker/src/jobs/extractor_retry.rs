//! Headless-extractor retry for paywalled sources whose content came back
//! missing or truncated from the plain fetcher. One attempt per row per run;
//! non-blocking in the pipeline.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use pivot_common::sources::PAYWALLED_SOURCES;

use crate::deps::Deps;
use crate::jobs::StageError;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Below this many characters an extraction counts as failed.
pub const MIN_CONTENT_LENGTH: u32 = 500;

#[derive(Debug, Default, Serialize)]
pub struct ExtractorRetryResult {
    pub skipped: bool,
    pub retried: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<ExtractorRetryResult> {
    let mut logger = ExecutionLogger::new(1, "extractor_retry");
    let mut result = ExtractorRetryResult::default();

    let Some(extractor) = &deps.extractor else {
        logger.warn("Extractor not configured, skipping");
        result.skipped = true;
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };

    let candidates = deps
        .store
        .paywalled_selects_needing_retry(PAYWALLED_SOURCES, MIN_CONTENT_LENGTH)
        .await?;
    logger.info(format!("{} paywalled selects need extraction", candidates.len()));

    for (select_id, select) in candidates {
        result.retried += 1;

        match extractor.scrape(&select.canonical_url).await {
            Ok(outcome) if outcome.success && outcome.content_length >= MIN_CONTENT_LENGTH as usize => {
                let mut patch = Map::new();
                patch.insert("raw_body".into(), Value::String(outcome.content));
                patch.insert("extractor_used".into(), Value::Bool(true));
                patch.insert(
                    "extractor_session".into(),
                    Value::String(outcome.session_replay),
                );
                deps.store.update_select(&select_id, patch).await?;
                result.succeeded += 1;
                logger.info(format!(
                    "Extracted {} chars for {}",
                    outcome.content_length, select.source_name
                ));
            }
            Ok(outcome) => {
                result.failed += 1;
                let reason = outcome
                    .error
                    .unwrap_or_else(|| "content too short or empty".into());
                logger.warn(format!("Extraction failed for {}: {reason}", select.canonical_url));
                result.errors.push(StageError::new(select.fingerprint, reason));
            }
            Err(e) => {
                result.failed += 1;
                logger.warn(format!("Extractor errored for {}: {e}", select.canonical_url));
                result.errors.push(StageError::new(select.fingerprint, e));
            }
        }
    }

    logger.set_summary("retried", result.retried);
    logger.set_summary("succeeded", result.succeeded);
    logger.set_summary("failed", result.failed);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeExtractor};
    use chrono::Utc;
    use pivot_common::types::Select;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn paywalled_select(fp: &str, source: &str, raw: &str) -> Select {
        Select {
            fingerprint: fp.into(),
            source_name: source.into(),
            canonical_url: format!("https://wsj.com/{fp}"),
            headline: "Paywalled Story".into(),
            raw_body: raw.into(),
            cleaned_body: None,
            interest_score: 8.0,
            topic: "jobs".into(),
            sentiment: "neutral".into(),
            published_at: Some(Utc::now()),
            ai_processed_at: Utc::now(),
            extractor_session: None,
            extractor_used: false,
        }
    }

    #[tokio::test]
    async fn short_paywalled_body_is_retried_exactly_once() {
        let mut deps = test_deps();
        let extractor = Arc::new(FakeExtractor {
            content: "long extracted content ".repeat(40),
            calls: AtomicU32::new(0),
        });
        deps.extractor = Some(extractor.clone());

        deps.store
            .insert_select(&paywalled_select("p5-wsj", "WSJ", "tiny"))
            .await
            .unwrap();
        // Healthy row from a paywalled source: not a candidate.
        deps.store
            .insert_select(&paywalled_select("p5-ok", "Bloomberg", &"x".repeat(600)))
            .await
            .unwrap();
        // Short row from a non-paywalled source: not a candidate either.
        deps.store
            .insert_select(&paywalled_select("p5-reuters", "Reuters", "tiny"))
            .await
            .unwrap();

        let result = run(&deps).await.unwrap();
        assert_eq!(result.retried, 1);
        assert_eq!(result.succeeded, 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

        let (_, updated) = deps
            .store
            .select_by_fingerprint("p5-wsj")
            .await
            .unwrap()
            .unwrap();
        assert!(updated.extractor_used);
        assert!(updated.raw_body.len() >= 500);
        assert!(updated.extractor_session.is_some());
    }

    #[tokio::test]
    async fn skipped_when_extractor_unconfigured() {
        let deps = test_deps();
        let result = run(&deps).await.unwrap();
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn short_extraction_counts_as_failure() {
        let mut deps = test_deps();
        deps.extractor = Some(Arc::new(FakeExtractor {
            content: "still too short".into(),
            calls: AtomicU32::new(0),
        }));
        deps.store
            .insert_select(&paywalled_select("p5-short", "NYT", ""))
            .await
            .unwrap();

        let result = run(&deps).await.unwrap();
        assert_eq!(result.failed, 1);
        assert_eq!(result.succeeded, 0);

        let (_, row) = deps
            .store
            .select_by_fingerprint("p5-short")
            .await
            .unwrap()
            .unwrap();
        assert!(!row.extractor_used);
    }
}
