//! Aggregator repair sweep: re-resolve Articles whose URL still points at
//! the aggregator host. Deliberately slow — the decode endpoint blocks
//! aggressive clients — with per-row pauses and immediate writes.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use pivot_common::sources::AGGREGATOR_SOURCE;
use pivot_common::{canonicalize, fingerprint, is_aggregator_url, source_from_url};
use pivot_store::{Predicate, Query, Table};

use crate::deps::Deps;
use crate::jobs::StageError;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Pause between rows. The resolver adds its own inter-call pacing.
const ROW_PAUSE: Duration = Duration::from_secs(5);
/// Longer pause between batches of rows.
const BATCH_PAUSE: Duration = Duration::from_secs(60);
const BATCH_SIZE: usize = 10;

#[derive(Debug, Default, Serialize)]
pub struct RepairResult {
    pub candidates: usize,
    pub repaired: usize,
    pub still_wrapped: usize,
    pub errors: Vec<StageError>,
}

/// `paced = false` drops the long sleeps; used by manual runs and tests.
pub async fn run(deps: &Deps, paced: bool) -> Result<RepairResult> {
    let mut logger = ExecutionLogger::new(0, "aggregator_repair");
    let mut result = RepairResult::default();

    let query = Query::new().filter(Predicate::eq("source_name", AGGREGATOR_SOURCE));
    let records = deps.store.find(Table::Articles, &query).await?;

    let wrapped: Vec<_> = records
        .into_iter()
        .filter(|r| is_aggregator_url(r.str_field("canonical_url")))
        .collect();
    result.candidates = wrapped.len();
    logger.info(format!("{} articles still carry wrapper URLs", wrapped.len()));

    let known = deps.store.known_fingerprints().await?;

    for (idx, record) in wrapped.iter().enumerate() {
        if paced && idx > 0 {
            if idx % BATCH_SIZE == 0 {
                tokio::time::sleep(BATCH_PAUSE).await;
            } else {
                tokio::time::sleep(ROW_PAUSE).await;
            }
        }

        let url = record.str_field("canonical_url").to_string();
        let (decoded, resolved) = deps.resolver.resolve(&url).await;
        if !resolved {
            result.still_wrapped += 1;
            continue;
        }

        let new_fingerprint = fingerprint(&decoded);
        if new_fingerprint.is_empty() {
            result.still_wrapped += 1;
            continue;
        }
        // The decoded URL may already exist as its own article; in that case
        // only fix the display fields and keep the old identity.
        let mut patch = Map::new();
        patch.insert(
            "canonical_url".into(),
            Value::String(canonicalize(&decoded).unwrap_or(decoded.clone())),
        );
        if let Some(source) = source_from_url(&decoded) {
            patch.insert("source_name".into(), Value::String(source));
        }
        if !known.contains(&new_fingerprint) {
            patch.insert("fingerprint".into(), Value::String(new_fingerprint));
        }

        match deps.store.update(Table::Articles, &record.id, patch).await {
            Ok(_) => {
                result.repaired += 1;
                logger.info(format!("Repaired {url}"));
            }
            Err(e) => {
                logger.warn(format!("Repair write failed for {url}: {e}"));
                result.errors.push(StageError::new(record.id.clone(), e));
            }
        }
    }

    logger.set_summary("candidates", result.candidates);
    logger.set_summary("repaired", result.repaired);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeResolver};
    use chrono::Utc;
    use pivot_common::types::{Article, FitStatus};
    use std::sync::Arc;

    #[tokio::test]
    async fn repairs_wrapped_article() {
        let mut deps = test_deps();
        deps.resolver = Arc::new(FakeResolver::mapping(
            "https://news.google.com/rss/articles/CBMiX",
            "https://www.wsj.com/tech/real-story",
        ));

        deps.store
            .insert_articles(&[Article {
                fingerprint: "p5-wrapped".into(),
                canonical_url: "https://news.google.com/rss/articles/CBMiX".into(),
                title: "Wrapped".into(),
                source_name: AGGREGATOR_SOURCE.into(),
                published_at: Utc::now(),
                ingested_at: Utc::now(),
                needs_scoring: false,
                fit_status: FitStatus::Rejected,
            }])
            .await
            .unwrap();

        let result = run(&deps, false).await.unwrap();
        assert_eq!(result.repaired, 1);

        let articles = deps.dump_articles().await;
        assert_eq!(articles[0].str_field("source_name"), "WSJ");
        assert!(articles[0].str_field("canonical_url").contains("wsj.com"));
        assert!(articles[0].str_field("fingerprint").starts_with("p5-"));
        assert_ne!(articles[0].str_field("fingerprint"), "p5-wrapped");
    }

    #[tokio::test]
    async fn unresolvable_rows_stay_wrapped() {
        let deps = test_deps();
        deps.store
            .insert_articles(&[Article {
                fingerprint: "p5-stuck".into(),
                canonical_url: "https://news.google.com/rss/articles/CBMiY".into(),
                title: "Stuck".into(),
                source_name: AGGREGATOR_SOURCE.into(),
                published_at: Utc::now(),
                ingested_at: Utc::now(),
                needs_scoring: false,
                fit_status: FitStatus::Rejected,
            }])
            .await
            .unwrap();

        let result = run(&deps, false).await.unwrap();
        assert_eq!(result.repaired, 0);
        assert_eq!(result.still_wrapped, 1);
    }
}
