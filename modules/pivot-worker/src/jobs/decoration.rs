//! Pivot 5 decoration: clean each selected story's content, generate the
//! headline/dek/bullets record, bold key phrases, and persist IssueStories
//! awaiting imagery.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use ai_client::{util, TextRequest};
use pivot_common::types::{ImageStatus, IssueStatus, IssueStory, NewsletterVariant, Select};

use crate::deps::Deps;
use crate::jobs::StageError;
use crate::prompts;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Fallback truncation when content cleaning fails.
const CLEAN_FALLBACK_CHARS: usize = 8_000;
/// Cleaned-content excerpt stored on the story row.
const RAW_EXCERPT_CHARS: usize = 10_000;

#[derive(Debug, Default, Serialize)]
pub struct DecorationResult {
    pub decorated: usize,
    pub issue_id: String,
    pub story_ids: Vec<String>,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<DecorationResult> {
    let variant = NewsletterVariant::Pivot5;
    let mut logger = ExecutionLogger::new(3, "decoration");
    let mut result = DecorationResult::default();

    let Some((issue_record_id, issue)) = deps.store.pending_issue(variant).await? else {
        logger.info("No pending issue found");
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };
    result.issue_id = issue.issue_id.clone();
    logger.info(format!("Decorating {}", issue.issue_id));

    for slot_ref in &issue.slots {
        let slot: u8 = slot_ref
            .key
            .strip_prefix("slot_")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);

        if slot_ref.fingerprint.is_empty() {
            continue;
        }

        match decorate_slot(deps, &issue.issue_id, slot, slot_ref.fingerprint.as_str(), &slot_ref.headline, &mut logger).await {
            Ok(story_id) => {
                result.story_ids.push(story_id);
                result.decorated += 1;
            }
            Err(e) => {
                logger.error(format!("Slot {slot} decoration failed: {e}"));
                result.errors.push(StageError::new(slot_ref.key.clone(), e));
            }
        }
    }

    if result.decorated > 0 {
        deps.store
            .advance_issue_status(variant, &issue_record_id, IssueStatus::Decorated)
            .await?;
        logger.info("Issue status updated to decorated");
    }

    logger.set_summary("decorated", result.decorated);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

async fn decorate_slot(
    deps: &Deps,
    issue_id: &str,
    slot: u8,
    fingerprint: &str,
    original_headline: &str,
    logger: &mut ExecutionLogger,
) -> Result<String> {
    let (select_id, select) = deps
        .store
        .select_by_fingerprint(fingerprint)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no select row for {fingerprint}"))?;

    let cleaned = clean_content(deps, &select, &select_id, logger).await;

    let response = deps
        .reasoning
        .complete(
            TextRequest::new(prompts::decorate_pivot5(
                original_headline,
                &select.source_name,
                &select.topic,
                &cleaned,
            ))
            .max_tokens(1500)
            .temperature(0.5),
        )
        .await?;
    let decoration = util::extract_json_object(&response)?;

    let field = |name: &str| {
        decoration
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let mut b1 = field("b1");
    let mut b2 = field("b2");
    let mut b3 = field("b3");

    // Second pass: bold one key phrase per bullet. Failure keeps the plain
    // bullets.
    match apply_bolding(deps, &b1, &b2, &b3).await {
        Ok((bold1, bold2, bold3)) => {
            b1 = bold1;
            b2 = bold2;
            b3 = bold3;
        }
        Err(e) => logger.warn(format!("Slot {slot}: bolding failed, keeping plain bullets: {e}")),
    }

    let headline = {
        let decorated = field("headline");
        if decorated.is_empty() {
            original_headline.to_string()
        } else {
            decorated
        }
    };
    let label = {
        let label = field("label");
        if label.is_empty() {
            "AI NEWS".to_string()
        } else {
            label
        }
    };

    let story = IssueStory {
        story_id: select_id.clone(),
        issue_id: issue_id.to_string(),
        slot_order: Some(slot),
        section: None,
        headline,
        dek: Some(field("dek")),
        b1: Some(b1),
        b2: Some(b2),
        b3: Some(b3),
        label,
        image_prompt: Some(field("image_prompt")),
        image_status: Some(ImageStatus::NeedsImage),
        raw_excerpt: cleaned.chars().take(RAW_EXCERPT_CHARS).collect(),
        ..Default::default()
    };

    let record_id = deps
        .store
        .insert_issue_story(NewsletterVariant::Pivot5, &story)
        .await?;
    logger.info(format!("Slot {slot}: story record {record_id} created"));
    Ok(record_id)
}

/// Clean article content with the fast model, caching the result on the
/// Select. Cleaning failure truncates the raw body instead.
pub async fn clean_content(
    deps: &Deps,
    select: &Select,
    select_id: &str,
    logger: &mut ExecutionLogger,
) -> String {
    if let Some(cached) = &select.cleaned_body {
        if !cached.is_empty() {
            return cached.clone();
        }
    }

    let request = TextRequest::new(prompts::content_cleaner(&select.raw_body))
        .max_tokens(4000)
        .temperature(0.3);

    match deps.cleaner.complete(request).await {
        Ok(cleaned) if !cleaned.is_empty() => {
            let mut patch = serde_json::Map::new();
            patch.insert("cleaned_body".into(), Value::String(cleaned.clone()));
            if let Err(e) = deps.store.update_select(select_id, patch).await {
                logger.warn(format!("Could not cache cleaned body: {e}"));
            }
            cleaned
        }
        Ok(_) | Err(_) => {
            logger.warn("Content cleaning failed, truncating raw body");
            select.raw_body.chars().take(CLEAN_FALLBACK_CHARS).collect()
        }
    }
}

async fn apply_bolding(
    deps: &Deps,
    b1: &str,
    b2: &str,
    b3: &str,
) -> Result<(String, String, String)> {
    let response = deps
        .reasoning
        .complete(
            TextRequest::new(prompts::bolding(b1, b2, b3))
                .max_tokens(500)
                .temperature(0.3),
        )
        .await?;
    let parsed = util::extract_json_object(&response)?;
    let pick = |name: &str, fallback: &str| {
        parsed
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };
    Ok((pick("b1", b1), pick("b2", b2), pick("b3", b3)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeTextModel};
    use chrono::{NaiveDate, Utc};
    use pivot_common::types::{Issue, SlotRef};
    use pivot_store::Table;
    use std::sync::Arc;

    fn seeded_select(fp: &str) -> Select {
        Select {
            fingerprint: fp.into(),
            source_name: "Reuters".into(),
            canonical_url: format!("https://reuters.com/{fp}"),
            headline: "Original Headline".into(),
            raw_body: "Raw body. ".repeat(50),
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

    fn pending_issue_with_slot(fp: &str) -> Issue {
        let mut issue = Issue::new(
            "Pivot 5 - Jan 02".into(),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        );
        issue.slots.push(SlotRef {
            key: "slot_1".into(),
            fingerprint: fp.into(),
            headline: "Original Headline".into(),
            story_id: "story-1".into(),
        });
        issue
    }

    #[tokio::test]
    async fn decorates_slot_and_advances_issue() {
        let mut deps = test_deps();
        deps.store.insert_select(&seeded_select("p5-a")).await.unwrap();
        deps.store
            .create_issue(NewsletterVariant::Pivot5, &pending_issue_with_slot("p5-a"))
            .await
            .unwrap();

        deps.reasoning = Arc::new(FakeTextModel::scripted(&[
            r#"{"headline": "AI Hiring Wave Builds", "dek": "A hook.", "b1": "First bullet one. Second sentence.", "b2": "Second bullet. More detail.", "b3": "Why it matters. The takeaway.", "label": "JOBS & ECONOMY", "image_prompt": "abstract hiring wave"}"#,
            r#"{"b1": "First <b>bullet</b> one. Second sentence.", "b2": "Second <b>bullet</b>. More detail.", "b3": "Why it <b>matters</b>. The takeaway."}"#,
        ]));

        let result = run(&deps).await.unwrap();
        assert_eq!(result.decorated, 1);

        let stories = deps
            .dump(Table::IssueStories(NewsletterVariant::Pivot5))
            .await;
        assert_eq!(stories.len(), 1);
        let story = &stories[0];
        assert_eq!(story.str_field("headline"), "AI Hiring Wave Builds");
        assert_eq!(story.str_field("label"), "JOBS & ECONOMY");
        assert_eq!(story.str_field("image_status"), "needs_image");
        assert!(story.str_field("b1").contains("<b>"));

        // Issue advanced to decorated.
        assert!(deps
            .store
            .pending_issue(NewsletterVariant::Pivot5)
            .await
            .unwrap()
            .is_none());
        assert!(deps
            .store
            .decorated_issue(NewsletterVariant::Pivot5)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn bolding_failure_keeps_plain_bullets() {
        let mut deps = test_deps();
        deps.store.insert_select(&seeded_select("p5-b")).await.unwrap();
        deps.store
            .create_issue(NewsletterVariant::Pivot5, &pending_issue_with_slot("p5-b"))
            .await
            .unwrap();

        deps.reasoning = Arc::new(FakeTextModel::scripted(&[
            r#"{"headline": "H", "dek": "D", "b1": "Plain one.", "b2": "Plain two.", "b3": "Plain three.", "label": "BIG TECH", "image_prompt": "x"}"#,
            "not json at all and no braces",
        ]));

        let result = run(&deps).await.unwrap();
        assert_eq!(result.decorated, 1);

        let stories = deps
            .dump(Table::IssueStories(NewsletterVariant::Pivot5))
            .await;
        assert_eq!(stories[0].str_field("b1"), "Plain one.");
    }

    #[tokio::test]
    async fn missing_select_is_recorded_not_fatal() {
        let mut deps = test_deps();
        deps.store
            .create_issue(NewsletterVariant::Pivot5, &pending_issue_with_slot("p5-gone"))
            .await
            .unwrap();
        deps.reasoning = Arc::new(FakeTextModel::returning("{}"));

        let result = run(&deps).await.unwrap();
        assert_eq!(result.decorated, 0);
        assert_eq!(result.errors.len(), 1);
    }
}
