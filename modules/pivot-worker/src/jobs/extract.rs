//! Newsletter extraction: re-fetch Selects whose body came back empty from
//! the scoring pass. Non-blocking in the pipeline.

use anyhow::Result;
use serde::Serialize;

use crate::deps::Deps;
use crate::jobs::scoring::raw_body_patch;
use crate::jobs::StageError;
use crate::run_log::{ExecutionLogger, RunStatus};

#[derive(Debug, Default, Serialize)]
pub struct ExtractResult {
    pub candidates: usize,
    pub extracted: usize,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<ExtractResult> {
    let mut logger = ExecutionLogger::new(1, "newsletter_extraction");
    let mut result = ExtractResult::default();

    let selects = deps.store.selects_missing_raw().await?;
    result.candidates = selects.len();
    logger.info(format!("{} selects missing content", selects.len()));

    for (select_id, select) in selects {
        match deps.fetcher.fetch(&select.canonical_url).await {
            Ok(content) if !content.is_empty() => {
                deps.store
                    .update_select(&select_id, raw_body_patch(&content))
                    .await?;
                result.extracted += 1;
            }
            Ok(_) => {
                logger.warn(format!("Empty content for {}", select.canonical_url));
                result
                    .errors
                    .push(StageError::new(select.fingerprint, "empty content"));
            }
            Err(e) => {
                logger.warn(format!("Fetch failed for {}: {e}", select.canonical_url));
                result.errors.push(StageError::new(select.fingerprint, e));
            }
        }
    }

    logger.set_summary("extracted", result.extracted);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}
