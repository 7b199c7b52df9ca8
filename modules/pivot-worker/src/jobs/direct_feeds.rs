//! Direct-feed ingest: non-aggregator RSS feeds parsed with feed-rs, merged
//! into the same Articles table through the shared ingest tail.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use pivot_common::is_aggregator_url;

use crate::deps::{Deps, FeedItem};
use crate::jobs::ingest::{ingest_items, IngestResult};
use crate::jobs::StageError;
use crate::run_log::{ExecutionLogger, RunStatus};

pub async fn run(deps: &Deps, window_hours: u32) -> Result<IngestResult> {
    let mut logger = ExecutionLogger::new(0, "direct_feed_ingest");
    let mut result = IngestResult::default();

    if deps.config.direct_feeds.is_empty() {
        logger.warn("No direct feeds configured, skipping");
        result.skipped = true;
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    }

    let mut items: Vec<FeedItem> = Vec::new();
    let mut aggregator_skipped = 0usize;
    for feed_url in &deps.config.direct_feeds {
        match fetch_feed(feed_url).await {
            Ok(feed_items) => {
                for item in feed_items {
                    // The aggregator's own items come through the reader path;
                    // direct feeds only carry publisher URLs.
                    if is_aggregator_url(&item.url) {
                        aggregator_skipped += 1;
                        continue;
                    }
                    items.push(item);
                }
            }
            Err(e) => {
                warn!(feed = feed_url, error = %e, "Failed to fetch direct feed");
                result.errors.push(StageError::new(feed_url.clone(), e));
            }
        }
    }
    result.fetched = items.len();
    logger.info(format!(
        "Collected {} items from {} direct feeds ({aggregator_skipped} aggregator links skipped)",
        items.len(),
        deps.config.direct_feeds.len()
    ));

    match ingest_items(deps, items, window_hours, &mut result, &mut logger).await {
        Ok(()) => {
            logger.set_summary("articles_ingested", result.ingested);
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

async fn fetch_feed(feed_url: &str) -> Result<Vec<FeedItem>> {
    let response = reqwest::get(feed_url).await?;
    anyhow::ensure!(
        response.status().is_success(),
        "feed fetch failed ({})",
        response.status()
    );
    let bytes = response.bytes().await?;
    let feed = feed_rs::parser::parse(&bytes[..])?;

    let source = feed.title.as_ref().map(|t| t.content.clone());
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.links.first().map(|l| l.href.clone())?;
            let published: Option<DateTime<Utc>> = entry.published.or(entry.updated);
            Some(FeedItem {
                url,
                title: entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_default(),
                published_at: published,
                source_id: source.clone(),
            })
        })
        .collect())
}
