//! Feed ingest: fetch reader items, resolve aggregator redirects, filter,
//! fingerprint, dedup against every known fingerprint, append.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use pivot_common::types::{Article, FitStatus};
use pivot_common::{canonicalize, fingerprint, is_aggregator_url, is_blocked, source_from_url};
use pivot_common::sources::AGGREGATOR_SOURCE;

use crate::deps::{Deps, FeedItem};
use crate::jobs::StageError;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Max items pulled from the reader per run.
const FETCH_LIMIT: u32 = 1000;
/// Concurrent redirect resolutions per batch.
const RESOLVER_BATCH: usize = 10;
/// Pause between resolver batches.
const RESOLVER_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Serialize)]
pub struct IngestResult {
    pub fetched: usize,
    pub resolved: usize,
    pub blocked: usize,
    pub stale_dropped: usize,
    pub no_fingerprint: usize,
    pub duplicates: usize,
    pub ingested: usize,
    pub skipped: bool,
    pub errors: Vec<StageError>,
}

/// Aggregator-feed ingest. `window_hours` defaults to the cron window and
/// stretches to 120h for backfills.
pub async fn run(deps: &Deps, window_hours: u32) -> Result<IngestResult> {
    let mut logger = ExecutionLogger::new(0, "ingest");
    let mut result = IngestResult::default();

    let Some(reader) = &deps.feed_reader else {
        logger.warn("Feed reader not configured, skipping ingest");
        result.skipped = true;
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };

    // An upstream refresh failure is worth a warning, not an abort: the
    // reading list still serves the last crawl.
    if let Err(e) = reader.refresh().await {
        logger.warn(format!("Feed refresh failed: {e}"));
        result.errors.push(StageError::new("refresh", e));
    }

    let items = match reader.articles(FETCH_LIMIT, window_hours).await {
        Ok(items) => items,
        Err(e) => {
            logger.complete(&deps.store, RunStatus::Error, Some(&e.to_string())).await;
            return Err(e);
        }
    };
    result.fetched = items.len();
    logger.info(format!("Fetched {} items ({window_hours}h window)", items.len()));

    let mut items = resolve_aggregator_urls(deps, items, &mut result).await;
    for item in &mut items {
        if item.source_id.is_none() {
            item.source_id = source_from_url(&item.url);
        }
    }

    let outcome = ingest_items(deps, items, window_hours, &mut result, &mut logger).await;
    match outcome {
        Ok(()) => {
            logger.set_summary("articles_fetched", result.fetched);
            logger.set_summary("articles_ingested", result.ingested);
            logger.set_summary("aggregator_resolved", result.resolved);
            logger.set_summary("duplicates_skipped", result.duplicates);
            logger.complete(&deps.store, RunStatus::Success, None).await;
            Ok(result)
        }
        Err(e) => {
            logger.complete(&deps.store, RunStatus::Error, Some(&e.to_string())).await;
            Err(e)
        }
    }
}

/// Resolve aggregator redirect URLs in bounded-concurrency batches, updating
/// source names from the resolved host. Unresolvable items keep the wrapper
/// URL and get the aggregator label.
async fn resolve_aggregator_urls(
    deps: &Deps,
    mut items: Vec<FeedItem>,
    result: &mut IngestResult,
) -> Vec<FeedItem> {
    let aggregator_indices: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| is_aggregator_url(&item.url))
        .map(|(i, _)| i)
        .collect();

    if aggregator_indices.is_empty() {
        return items;
    }
    info!(count = aggregator_indices.len(), "Resolving aggregator URLs");

    for (batch_idx, batch) in aggregator_indices.chunks(RESOLVER_BATCH).enumerate() {
        if batch_idx > 0 {
            tokio::time::sleep(RESOLVER_PAUSE).await;
        }

        let urls: Vec<String> = batch.iter().map(|&i| items[i].url.clone()).collect();
        let futures = urls.iter().map(|url| deps.resolver.resolve(url));
        let resolutions = futures::future::join_all(futures).await;

        for (&i, (decoded, resolved)) in batch.iter().zip(resolutions) {
            if resolved && decoded != items[i].url {
                items[i].url = decoded;
                items[i].source_id = source_from_url(&items[i].url);
                result.resolved += 1;
            } else {
                items[i].source_id = Some(AGGREGATOR_SOURCE.to_string());
            }
        }
    }

    info!(resolved = result.resolved, "Aggregator resolution complete");
    items
}

/// Shared tail of both ingest variants: blocklist, published-window filter,
/// fingerprint, dedup, append.
pub async fn ingest_items(
    deps: &Deps,
    items: Vec<FeedItem>,
    window_hours: u32,
    result: &mut IngestResult,
    logger: &mut ExecutionLogger,
) -> Result<()> {
    let cutoff = Utc::now() - chrono::Duration::hours(window_hours as i64);
    let now = Utc::now();

    let mut candidates: Vec<Article> = Vec::new();
    for item in items {
        if is_blocked(&item.url) {
            result.blocked += 1;
            continue;
        }

        // Items without a published date cannot prove recency; drop them.
        let published_at = match item.published_at {
            Some(t) if t >= cutoff => t,
            _ => {
                result.stale_dropped += 1;
                continue;
            }
        };

        let print = fingerprint(&item.url);
        if print.is_empty() {
            result.no_fingerprint += 1;
            continue;
        }
        let canonical_url = canonicalize(&item.url).unwrap_or(item.url.clone());
        let source_name = item
            .source_id
            .clone()
            .or_else(|| source_from_url(&item.url))
            .unwrap_or_else(|| "Unknown".to_string());

        candidates.push(Article {
            fingerprint: print,
            canonical_url,
            title: item.title,
            source_name,
            published_at,
            ingested_at: now,
            needs_scoring: true,
            fit_status: FitStatus::Pending,
        });
    }

    // One paginated pass over the known fingerprints, then in-memory dedup
    // (including within this batch).
    let known = deps.store.known_fingerprints().await?;
    let mut seen = known;
    let mut fresh = Vec::new();
    for article in candidates {
        if seen.insert(article.fingerprint.clone()) {
            fresh.push(article);
        } else {
            result.duplicates += 1;
        }
    }

    result.ingested = deps.store.insert_articles(&fresh).await?;
    logger.info(format!(
        "Ingested {} articles (blocked {}, stale {}, duplicates {})",
        result.ingested, result.blocked, result.stale_dropped, result.duplicates
    ));
    if result.ingested != fresh.len() {
        warn!(
            expected = fresh.len(),
            created = result.ingested,
            "Create batch returned fewer rows than expected"
        );
    }
    Ok(())
}
