//! The chained pipeline: ingest through prefilter as a linear DAG with
//! conditional and non-blocking edges. Blocking-stage failures abort the
//! run; non-blocking failures are captured and the chain continues. Every
//! stage runs under its own deadline.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::time::timeout;

use crate::deps::Deps;
use crate::jobs::{direct_feeds, extract, extractor_retry, ingest, prefilter, scoring};
use crate::run_log::{ExecutionLogger, RunStatus};

/// Per-stage deadline. A stage past it is cancelled at its next await point.
const STAGE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Skipped { reason: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub name: &'static str,
    pub status: StageStatus,
    pub duration_ms: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct PipelineResult {
    pub stages: Vec<StageOutcome>,
    pub new_articles: usize,
    pub prefilter_written: usize,
    pub succeeded: bool,
}

impl PipelineResult {
    fn record(&mut self, name: &'static str, status: StageStatus, started: std::time::Instant) {
        self.stages.push(StageOutcome {
            name,
            status,
            duration_ms: started.elapsed().as_millis() as i64,
        });
    }

    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Run a stage under the deadline, normalizing timeouts into errors.
async fn bounded<T>(
    fut: impl std::future::Future<Output = Result<T>>,
    name: &'static str,
) -> Result<T> {
    match timeout(STAGE_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("stage {name} exceeded its deadline")),
    }
}

pub async fn run_full_pipeline(deps: &Deps, window_hours: u32) -> Result<PipelineResult> {
    let mut logger = ExecutionLogger::new(0, "full_pipeline");
    let mut result = PipelineResult::default();

    // Stage 1: ingest (blocking).
    let started = std::time::Instant::now();
    let ingested = match bounded(ingest::run(deps, window_hours), "ingest").await {
        Ok(outcome) => {
            result.new_articles += outcome.ingested;
            result.record("ingest", StageStatus::Completed, started);
            outcome
        }
        Err(e) => {
            result.record(
                "ingest",
                StageStatus::Failed {
                    message: e.to_string(),
                },
                started,
            );
            logger
                .complete(&deps.store, RunStatus::Error, Some(&e.to_string()))
                .await;
            return Err(e);
        }
    };
    logger.info(format!("ingest: {} new articles", ingested.ingested));

    // Stage 2: direct feeds (blocking).
    let started = std::time::Instant::now();
    match bounded(direct_feeds::run(deps, window_hours), "direct_feed_ingest").await {
        Ok(outcome) => {
            result.new_articles += outcome.ingested;
            result.record("direct_feed_ingest", StageStatus::Completed, started);
            logger.info(format!("direct feeds: {} new articles", outcome.ingested));
        }
        Err(e) => {
            result.record(
                "direct_feed_ingest",
                StageStatus::Failed {
                    message: e.to_string(),
                },
                started,
            );
            logger
                .complete(&deps.store, RunStatus::Error, Some(&e.to_string()))
                .await;
            return Err(e);
        }
    }

    // Stage 3: scoring, only when either ingest found new articles.
    let started = std::time::Instant::now();
    if result.new_articles > 0 {
        match bounded(scoring::run(deps), "ai_scoring").await {
            Ok(outcome) => {
                result.record("ai_scoring", StageStatus::Completed, started);
                logger.info(format!(
                    "scoring: {} scored, {} selects",
                    outcome.scored, outcome.selects_created
                ));
            }
            Err(e) => {
                result.record(
                    "ai_scoring",
                    StageStatus::Failed {
                        message: e.to_string(),
                    },
                    started,
                );
                logger
                    .complete(&deps.store, RunStatus::Error, Some(&e.to_string()))
                    .await;
                return Err(e);
            }
        }
    } else {
        logger.info("scoring skipped: no new articles");
        result.record(
            "ai_scoring",
            StageStatus::Skipped {
                reason: "no_new_articles".into(),
            },
            started,
        );
    }

    // Stage 4: newsletter extraction (non-blocking).
    let started = std::time::Instant::now();
    match bounded(extract::run(deps), "newsletter_extraction").await {
        Ok(outcome) => {
            result.record("newsletter_extraction", StageStatus::Completed, started);
            logger.info(format!("extraction: {} bodies filled", outcome.extracted));
        }
        Err(e) => {
            logger.warn(format!("extraction failed (continuing): {e}"));
            result.record(
                "newsletter_extraction",
                StageStatus::Failed {
                    message: e.to_string(),
                },
                started,
            );
        }
    }

    // Stage 5: extractor retry (non-blocking).
    let started = std::time::Instant::now();
    match bounded(extractor_retry::run(deps), "extractor_retry").await {
        Ok(outcome) if outcome.skipped => {
            result.record(
                "extractor_retry",
                StageStatus::Skipped {
                    reason: "not_configured".into(),
                },
                started,
            );
        }
        Ok(outcome) => {
            result.record("extractor_retry", StageStatus::Completed, started);
            logger.info(format!(
                "extractor retry: {}/{} succeeded",
                outcome.succeeded, outcome.retried
            ));
        }
        Err(e) => {
            logger.warn(format!("extractor retry failed (continuing): {e}"));
            result.record(
                "extractor_retry",
                StageStatus::Failed {
                    message: e.to_string(),
                },
                started,
            );
        }
    }

    // Stage 6: prefilter (blocking).
    let started = std::time::Instant::now();
    match bounded(
        prefilter::run(deps, deps.config.prefilter_lookback_hours as i64),
        "pre_filter",
    )
    .await
    {
        Ok(outcome) => {
            result.prefilter_written = outcome.written;
            result.record("pre_filter", StageStatus::Completed, started);
            logger.info(format!("prefilter: {} rows written", outcome.written));
        }
        Err(e) => {
            result.record(
                "pre_filter",
                StageStatus::Failed {
                    message: e.to_string(),
                },
                started,
            );
            logger
                .complete(&deps.store, RunStatus::Error, Some(&e.to_string()))
                .await;
            return Err(e);
        }
    }

    result.succeeded = true;
    logger.set_summary("new_articles", result.new_articles);
    logger.set_summary("prefilter_written", result.prefilter_written);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeFeedReader, FakeTextModel};
    use crate::deps::FeedItem;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn scoring_is_skipped_when_nothing_ingested() {
        let mut deps = test_deps();
        deps.feed_reader = Some(Arc::new(FakeFeedReader { items: Vec::new() }));

        let result = run_full_pipeline(&deps, 10).await.unwrap();
        assert!(result.succeeded);
        assert_eq!(
            result.stage("ai_scoring").unwrap().status,
            StageStatus::Skipped {
                reason: "no_new_articles".into()
            }
        );
        // Extractor retry skips without credentials but never blocks.
        assert_eq!(
            result.stage("extractor_retry").unwrap().status,
            StageStatus::Skipped {
                reason: "not_configured".into()
            }
        );
        assert_eq!(result.stage("pre_filter").unwrap().status, StageStatus::Completed);
    }

    #[tokio::test]
    async fn full_chain_runs_scoring_for_new_articles() {
        let mut deps = test_deps();
        deps.feed_reader = Some(Arc::new(FakeFeedReader {
            items: vec![FeedItem {
                url: "https://www.reuters.com/technology/fresh".into(),
                title: "Fresh Story".into(),
                published_at: Some(Utc::now() - ChronoDuration::hours(1)),
                source_id: None,
            }],
        }));
        deps.reasoning = Arc::new(FakeTextModel::returning(
            r#"{"interest_score": 9, "topic": "jobs", "sentiment": "neutral"}"#,
        ));

        let result = run_full_pipeline(&deps, 10).await.unwrap();
        assert!(result.succeeded);
        assert_eq!(result.new_articles, 1);
        assert_eq!(result.stage("ai_scoring").unwrap().status, StageStatus::Completed);

        // The scored article became a select visible to the prefilter.
        let selects = deps.dump(pivot_store::Table::Selects).await;
        assert_eq!(selects.len(), 1);
    }
}
