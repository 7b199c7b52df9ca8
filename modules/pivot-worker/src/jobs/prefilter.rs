//! Prefilter: one batch classification per slot against slot-specific
//! topical criteria, plus the deterministic company filter on slot 1. Each
//! slot's rows are written as soon as the slot finishes, so a mid-run crash
//! preserves completed slots.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use ai_client::ClassifierMatch;
use pivot_common::sources::credibility_for;
use pivot_common::types::{NewsletterVariant, PrefilterRow, Select};

use crate::deps::Deps;
use crate::jobs::context::RecentIssueData;
use crate::jobs::StageError;
use crate::prompts;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Tier-1 vocabulary for the deterministic slot 1 company filter.
const SLOT_1_COMPANIES: &[&str] = &["openai", "google", "meta", "nvidia"];

/// Per-slot terminal state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum SlotOutcome {
    Done { written: usize },
    Empty,
    Failed { message: String },
}

#[derive(Debug, Default, Serialize)]
pub struct PrefilterResult {
    pub processed: usize,
    pub eligible: usize,
    pub written: usize,
    pub skipped: usize,
    pub slot_outcomes: Vec<(u8, SlotOutcome)>,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps, lookback_hours: i64) -> Result<PrefilterResult> {
    let mut logger = ExecutionLogger::new(1, "pre_filter");
    let mut result = PrefilterResult::default();

    // Gather: freshly scored selects plus yesterday's issue for exclusion.
    let selects = deps.store.selects_processed_since(lookback_hours).await?;
    result.processed = selects.len();
    logger.info(format!(
        "{} selects in the {lookback_hours}h lookback",
        selects.len()
    ));

    let recent_issues = deps
        .store
        .recent_issues(NewsletterVariant::Pivot5, 2)
        .await
        .unwrap_or_default();
    let yesterday = RecentIssueData::from_issues(&recent_issues);

    // Build one shared batch; every slot sees every eligible article.
    let mut batch: Vec<Value> = Vec::new();
    let mut by_story_id: HashMap<String, Select> = HashMap::new();
    for (select_id, select) in selects {
        if yesterday.fingerprints.contains(&select.fingerprint)
            || yesterday
                .headlines
                .contains(&select.headline.to_lowercase().trim().to_string())
        {
            result.skipped += 1;
            continue;
        }

        let credibility = credibility_for(
            &select.source_name,
            &deps.config.source_credibility_overrides,
            deps.config.default_source_credibility,
        );
        if credibility < deps.config.min_source_credibility {
            result.skipped += 1;
            continue;
        }

        batch.push(json!({
            "story_id": select_id,
            "fingerprint": select.fingerprint,
            "headline": select.headline,
            "summary": summary_of(&select.raw_body),
            "source": select.source_name,
            "published": select.published_at.map(|t| t.to_rfc3339()),
        }));
        by_story_id.insert(select_id, select);
    }
    logger.info(format!("{} articles eligible for classification", batch.len()));

    // Classify each slot in sequence, writing rows immediately per slot.
    let mut written_pairs: HashSet<(String, u8)> = HashSet::new();
    for slot in 1..=5u8 {
        let outcome = run_slot(
            deps,
            slot,
            &batch,
            &by_story_id,
            &yesterday.yesterday_headlines,
            &mut written_pairs,
            &mut result,
            &mut logger,
        )
        .await;
        result.slot_outcomes.push((slot, outcome));
    }

    let unique_stories: HashSet<&str> = written_pairs.iter().map(|(id, _)| id.as_str()).collect();
    result.eligible = unique_stories.len();

    logger.set_summary("processed", result.processed);
    logger.set_summary("eligible", result.eligible);
    logger.set_summary("written", result.written);
    logger.set_summary("skipped", result.skipped);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

/// One slot: classify, union the company filter (slot 1), persist.
/// Failure is terminal for the slot, never for the job.
#[allow(clippy::too_many_arguments)]
async fn run_slot(
    deps: &Deps,
    slot: u8,
    batch: &[Value],
    by_story_id: &HashMap<String, Select>,
    yesterday_headlines: &[String],
    written_pairs: &mut HashSet<(String, u8)>,
    result: &mut PrefilterResult,
    logger: &mut ExecutionLogger,
) -> SlotOutcome {
    if batch.is_empty() {
        return SlotOutcome::Empty;
    }

    let system = prompts::prefilter_system(slot, yesterday_headlines);
    let mut matches: Vec<ClassifierMatch> = Vec::new();
    let mut classifier_failed = false;

    match deps.classifier.classify(&system, batch).await {
        Ok(found) => {
            logger.info(format!(
                "Slot {slot}: classifier returned {} matches",
                found.len()
            ));
            matches.extend(found);
        }
        Err(e) => {
            logger.warn(format!("Slot {slot}: classifier failed: {e}"));
            result.errors.push(StageError::new(format!("slot_{slot}"), &e));
            classifier_failed = true;
        }
    }

    // Slot 1 additionally runs the deterministic company filter; results
    // union with the model's.
    if slot == 1 {
        let company_matches = company_filter(batch);
        logger.info(format!(
            "Slot 1: company filter matched {} stories",
            company_matches.len()
        ));
        matches.extend(company_matches);
    }

    if matches.is_empty() {
        return if classifier_failed {
            SlotOutcome::Failed {
                message: "classifier failed and no deterministic matches".into(),
            }
        } else {
            SlotOutcome::Empty
        };
    }

    // Dedup (fingerprint, slot) within the run, then write this slot's rows.
    let now = Utc::now();
    let mut rows: Vec<PrefilterRow> = Vec::new();
    for matched in matches {
        let Some(select) = by_story_id.get(&matched.story_id) else {
            logger.warn(format!(
                "Slot {slot}: match references unknown story {}",
                matched.story_id
            ));
            continue;
        };
        if !written_pairs.insert((select.fingerprint.clone(), slot)) {
            continue;
        }
        rows.push(PrefilterRow {
            fingerprint: select.fingerprint.clone(),
            article_id: matched.story_id.clone(),
            headline: select.headline.clone(),
            canonical_url: select.canonical_url.clone(),
            source_name: select.source_name.clone(),
            slot,
            prefiltered_at: now,
            published_at: select.published_at,
        });
    }

    match deps.store.insert_prefilter_rows(&rows).await {
        Ok(written) => {
            result.written += written;
            logger.info(format!("Slot {slot}: wrote {written} rows"));
            SlotOutcome::Done { written }
        }
        Err(e) => {
            logger.error(format!("Slot {slot}: write failed: {e}"));
            result.errors.push(StageError::new(format!("slot_{slot}"), &e));
            SlotOutcome::Failed {
                message: e.to_string(),
            }
        }
    }
}

/// Deterministic slot 1 match: any headline containing a Tier-1 company name.
fn company_filter(batch: &[Value]) -> Vec<ClassifierMatch> {
    batch
        .iter()
        .filter_map(|article| {
            let headline = article.get("headline")?.as_str()?.to_lowercase();
            let story_id = article.get("story_id")?.as_str()?;
            SLOT_1_COMPANIES
                .iter()
                .any(|company| headline.contains(company))
                .then(|| ClassifierMatch {
                    story_id: story_id.to_string(),
                    headline: article
                        .get("headline")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
        })
        .collect()
}

/// First ~300 chars of the body, broken at a sentence boundary when one lands
/// in the back half.
fn summary_of(raw: &str) -> String {
    const MAX: usize = 300;
    if raw.chars().count() <= MAX {
        return raw.to_string();
    }
    let truncated: String = raw.chars().take(MAX).collect();
    let boundary = ['.', '?', '!']
        .iter()
        .filter_map(|c| truncated.rfind(*c))
        .max();
    match boundary {
        Some(idx) if idx > MAX / 2 => truncated[..=idx].to_string(),
        _ => format!("{}...", truncated.trim_end()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeClassifier};
    use pivot_store::Table;
    use std::sync::Arc;

    fn select(fp: &str, headline: &str, source: &str) -> Select {
        Select {
            fingerprint: fp.into(),
            source_name: source.into(),
            canonical_url: format!("https://example.com/{fp}"),
            headline: headline.into(),
            raw_body: "Body. More body. Even more body.".into(),
            cleaned_body: None,
            interest_score: 8.0,
            topic: "ai".into(),
            sentiment: "neutral".into(),
            published_at: Some(Utc::now()),
            ai_processed_at: Utc::now(),
            extractor_session: None,
            extractor_used: false,
        }
    }

    #[tokio::test]
    async fn company_filter_unions_with_empty_classifier() {
        let mut deps = test_deps();
        // Classifier returns nothing for every slot.
        deps.classifier = Arc::new(FakeClassifier::empty());
        deps.store
            .insert_select(&select("p5-nvda", "Nvidia Eyes $3B Deal", "Reuters"))
            .await
            .unwrap();

        let result = run(&deps, 10).await.unwrap();

        let rows = deps.dump(Table::Prefilter).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].u8_field("slot"), 1);
        assert_eq!(rows[0].str_field("fingerprint"), "p5-nvda");
        assert_eq!(result.written, 1);
        assert_eq!(
            result.slot_outcomes[0],
            (1, SlotOutcome::Done { written: 1 })
        );
    }

    #[tokio::test]
    async fn fingerprint_slot_pairs_are_unique_within_run() {
        let mut deps = test_deps();
        deps.store
            .insert_select(&select("p5-nvda", "Nvidia Eyes $3B Deal", "Reuters"))
            .await
            .unwrap();
        let ids: Vec<String> = deps
            .dump(Table::Selects)
            .await
            .iter()
            .map(|r| r.id.clone())
            .collect();

        // Classifier matches the same story for slot 1 (which the company
        // filter also matches) and once more for slot 2.
        deps.classifier = Arc::new(FakeClassifier::scripted(vec![
            vec![ClassifierMatch {
                story_id: ids[0].clone(),
                headline: "Nvidia Eyes $3B Deal".into(),
            }],
            vec![ClassifierMatch {
                story_id: ids[0].clone(),
                headline: "Nvidia Eyes $3B Deal".into(),
            }],
            vec![],
            vec![],
            vec![],
        ]));

        let result = run(&deps, 10).await.unwrap();
        let rows = deps.dump(Table::Prefilter).await;

        // One row per (fingerprint, slot): slot 1 deduped, slot 2 separate.
        assert_eq!(rows.len(), 2);
        let slots: Vec<u8> = rows.iter().map(|r| r.u8_field("slot")).collect();
        assert!(slots.contains(&1));
        assert!(slots.contains(&2));
        assert_eq!(result.eligible, 1);
    }

    #[tokio::test]
    async fn low_credibility_sources_are_dropped() {
        let mut deps = test_deps();
        deps.config
            .source_credibility_overrides
            .insert("tabloid daily".into(), 1);
        deps.store
            .insert_select(&select("p5-tab", "Nvidia Eyes $3B Deal", "Tabloid Daily"))
            .await
            .unwrap();

        let result = run(&deps, 10).await.unwrap();
        assert_eq!(result.skipped, 1);
        assert!(deps.dump(Table::Prefilter).await.is_empty());
    }

    #[tokio::test]
    async fn yesterdays_stories_are_excluded() {
        let mut deps = test_deps();
        deps.store
            .insert_select(&select("p5-old", "Yesterday Story", "Reuters"))
            .await
            .unwrap();

        // Yesterday's issue already used this fingerprint.
        use chrono::Duration;
        use pivot_common::types::{Issue, SlotRef};
        let mut issue = Issue::new(
            "Pivot 5 - Yesterday".into(),
            Utc::now().date_naive() - Duration::days(1),
        );
        issue.slots.push(SlotRef {
            key: "slot_1".into(),
            fingerprint: "p5-old".into(),
            headline: "Yesterday Story".into(),
            story_id: "recY".into(),
        });
        deps.store
            .create_issue(NewsletterVariant::Pivot5, &issue)
            .await
            .unwrap();

        let result = run(&deps, 10).await.unwrap();
        assert_eq!(result.skipped, 1);
        assert!(deps.dump(Table::Prefilter).await.is_empty());
    }

    #[test]
    fn summary_breaks_at_sentence_boundary() {
        let long = format!("{} Tail that runs on.", "A sentence here.".repeat(20));
        let summary = summary_of(&long);
        assert!(summary.len() <= 301);
        assert!(summary.ends_with('.'));
    }
}
