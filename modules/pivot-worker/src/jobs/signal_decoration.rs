//! Signal decoration: full treatments for the four long-form sections
//! (one-liner, lead, why-it-matters, what's-next) and one-sentence blurbs
//! for the five quick-hits. Signal stories carry no imagery.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use ai_client::{util, TextRequest};
use pivot_common::types::{IssueStatus, IssueStory, NewsletterVariant};

use crate::deps::Deps;
use crate::jobs::decoration::clean_content;
use crate::jobs::StageError;
use crate::prompts;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Quick-hit content gets a shorter context budget.
const QUICK_HIT_CONTENT_CHARS: usize = 5_000;
const FULL_CONTENT_CHARS: usize = 8_000;

const SECTION_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("top_story", "TOP STORY"),
    ("ai_at_work", "AI AT WORK"),
    ("emerging", "EMERGING MOVES"),
    ("beyond", "BEYOND BUSINESS"),
];

#[derive(Debug, Default, Serialize)]
pub struct SignalDecorationResult {
    pub decorated: usize,
    pub issue_id: String,
    pub story_ids: Vec<String>,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<SignalDecorationResult> {
    let variant = NewsletterVariant::Signal;
    let mut logger = ExecutionLogger::new(3, "signal_decoration");
    let mut result = SignalDecorationResult::default();

    let Some((issue_record_id, issue)) = deps.store.pending_issue(variant).await? else {
        logger.info("No pending Signal issue found");
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };
    result.issue_id = issue.issue_id.clone();
    logger.info(format!("Decorating {}", issue.issue_id));

    for slot_ref in &issue.slots {
        if slot_ref.fingerprint.is_empty() {
            continue;
        }
        let is_quick_hit = slot_ref.key.starts_with("signal_");

        let outcome = decorate_section(
            deps,
            &issue.issue_id,
            &slot_ref.key,
            &slot_ref.fingerprint,
            &slot_ref.headline,
            is_quick_hit,
            &mut logger,
        )
        .await;

        match outcome {
            Ok(story_id) => {
                result.story_ids.push(story_id);
                result.decorated += 1;
            }
            Err(e) => {
                logger.error(format!("Section {} decoration failed: {e}", slot_ref.key));
                result.errors.push(StageError::new(slot_ref.key.clone(), e));
            }
        }
    }

    if result.decorated > 0 {
        deps.store
            .advance_issue_status(variant, &issue_record_id, IssueStatus::Decorated)
            .await?;
        logger.info("Signal issue status updated to decorated");
    }

    logger.set_summary("decorated", result.decorated);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

async fn decorate_section(
    deps: &Deps,
    issue_id: &str,
    section_key: &str,
    fingerprint: &str,
    original_headline: &str,
    is_quick_hit: bool,
    logger: &mut ExecutionLogger,
) -> Result<String> {
    let (select_id, select) = deps
        .store
        .select_by_fingerprint(fingerprint)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no select row for {fingerprint}"))?;

    let cleaned = clean_content(deps, &select, &select_id, logger).await;

    let story = if is_quick_hit {
        let content: String = cleaned.chars().take(QUICK_HIT_CONTENT_CHARS).collect();
        let response = deps
            .reasoning
            .complete(
                TextRequest::new(prompts::decorate_signal_quick_hit(
                    original_headline,
                    &select.source_name,
                    &content,
                ))
                .max_tokens(500)
                .temperature(0.5),
            )
            .await?;
        let parsed = util::extract_json_object(&response)?;
        quick_hit_story(&parsed, issue_id, section_key, &select_id, original_headline, &select.source_name)
    } else {
        let display_name = SECTION_DISPLAY_NAMES
            .iter()
            .find(|(key, _)| *key == section_key)
            .map(|(_, name)| *name)
            .unwrap_or(section_key);
        let content: String = cleaned.chars().take(FULL_CONTENT_CHARS).collect();
        let response = deps
            .reasoning
            .complete(
                TextRequest::new(prompts::decorate_signal_full(
                    original_headline,
                    &select.source_name,
                    display_name,
                    &content,
                ))
                .max_tokens(1500)
                .temperature(0.5),
            )
            .await?;
        let parsed = util::extract_json_object(&response)?;
        full_story(&parsed, issue_id, section_key, &select_id, original_headline, &select.source_name)
    };

    let record_id = deps
        .store
        .insert_issue_story(NewsletterVariant::Signal, &story)
        .await?;
    logger.info(format!("Section {section_key}: story record {record_id} created"));
    Ok(record_id)
}

fn text(parsed: &Value, key: &str) -> String {
    parsed
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn attribution(parsed: &Value, source_name: &str) -> Option<String> {
    let source = {
        let s = text(parsed, "source");
        if s.is_empty() {
            source_name.to_string()
        } else {
            s
        }
    };
    (!source.is_empty()).then(|| format!("via {source}"))
}

fn full_story(
    parsed: &Value,
    issue_id: &str,
    section_key: &str,
    select_id: &str,
    original_headline: &str,
    source_name: &str,
) -> IssueStory {
    let headline = {
        let h = text(parsed, "headline");
        if h.is_empty() {
            original_headline.to_string()
        } else {
            h
        }
    };
    IssueStory {
        story_id: select_id.to_string(),
        issue_id: issue_id.to_string(),
        section: Some(section_key.to_string()),
        slot_order: Some(1),
        headline,
        one_liner: Some(text(parsed, "one_liner")),
        lead: Some(text(parsed, "lead")),
        why_it_matters: Some(text(parsed, "why_it_matters")),
        whats_next: Some(text(parsed, "whats_next")),
        source_attribution: attribution(parsed, source_name),
        ..Default::default()
    }
}

fn quick_hit_story(
    parsed: &Value,
    issue_id: &str,
    section_key: &str,
    select_id: &str,
    original_headline: &str,
    source_name: &str,
) -> IssueStory {
    let headline = {
        let h = text(parsed, "headline");
        if h.is_empty() {
            original_headline.to_string()
        } else {
            h
        }
    };
    let ordinal = section_key
        .strip_prefix("signal_")
        .and_then(|n| n.parse().ok());
    IssueStory {
        story_id: select_id.to_string(),
        issue_id: issue_id.to_string(),
        section: Some("signal".to_string()),
        slot_order: ordinal,
        headline,
        signal_blurb: Some(text(parsed, "signal_blurb")),
        source_attribution: attribution(parsed, source_name),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeTextModel};
    use chrono::{NaiveDate, Utc};
    use pivot_common::types::{Issue, Select, SlotRef};
    use pivot_store::Table;
    use std::sync::Arc;

    fn seeded_select(fp: &str) -> Select {
        Select {
            fingerprint: fp.into(),
            source_name: "Bloomberg".into(),
            canonical_url: format!("https://bloomberg.com/{fp}"),
            headline: "Original".into(),
            raw_body: "Body text. ".repeat(100),
            cleaned_body: Some("Clean body text.".into()),
            interest_score: 9.0,
            topic: "enterprise".into(),
            sentiment: "neutral".into(),
            published_at: Some(Utc::now()),
            ai_processed_at: Utc::now(),
            extractor_session: None,
            extractor_used: false,
        }
    }

    #[tokio::test]
    async fn top_story_gets_semantic_fields() {
        let mut deps = test_deps();
        deps.store.insert_select(&seeded_select("p5-top")).await.unwrap();

        let mut issue = Issue::new(
            "Signal - Jan 12".into(),
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
        );
        issue.slots.push(SlotRef {
            key: "top_story".into(),
            fingerprint: "p5-top".into(),
            headline: "Original".into(),
            story_id: "story-1".into(),
        });
        deps.store
            .create_issue(NewsletterVariant::Signal, &issue)
            .await
            .unwrap();

        deps.reasoning = Arc::new(FakeTextModel::returning(
            r#"{"headline": "Enterprise AI Spending Doubles", "one_liner": "Budgets shift fast.", "lead": "A.\n\nB.", "why_it_matters": "\u{2022} X <b>y</b>.\n\u{2022} Z.", "whats_next": "\u{2022} P.\n\u{2022} Q.", "source": "Bloomberg"}"#,
        ));

        let result = run(&deps).await.unwrap();
        assert_eq!(result.decorated, 1);

        let stories = deps.dump(Table::IssueStories(NewsletterVariant::Signal)).await;
        let story = &stories[0];
        assert_eq!(story.str_field("headline"), "Enterprise AI Spending Doubles");
        assert_eq!(story.str_field("lead"), "A.\n\nB.");
        assert_eq!(
            story.str_field("why_it_matters").matches('\u{2022}').count(),
            2
        );
        assert_eq!(story.str_field("source_attribution"), "via Bloomberg");
        // Signal stories carry no imagery fields.
        assert!(story.opt_str("image_status").is_none());
    }

    #[tokio::test]
    async fn quick_hit_gets_blurb_and_ordinal() {
        let mut deps = test_deps();
        deps.store.insert_select(&seeded_select("p5-q3")).await.unwrap();

        let mut issue = Issue::new(
            "Signal - Jan 12".into(),
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
        );
        issue.slots.push(SlotRef {
            key: "signal_3".into(),
            fingerprint: "p5-q3".into(),
            headline: "Original".into(),
            story_id: "story-3".into(),
        });
        deps.store
            .create_issue(NewsletterVariant::Signal, &issue)
            .await
            .unwrap();

        deps.reasoning = Arc::new(FakeTextModel::returning(
            r#"{"headline": "Startup Raises Big Round", "signal_blurb": "The raise funds a push into regulated industries.", "source": "Bloomberg"}"#,
        ));

        let result = run(&deps).await.unwrap();
        assert_eq!(result.decorated, 1);

        let stories = deps.dump(Table::IssueStories(NewsletterVariant::Signal)).await;
        let story = &stories[0];
        assert_eq!(story.str_field("section"), "signal");
        assert_eq!(story.u8_field("slot_order"), 3);
        assert!(!story.str_field("signal_blurb").is_empty());
    }
}
