//! Signal slot selection: long-form sections first (1 -> 3 -> 4 -> 5), then
//! the five SIGNALS quick-hits in a single call. Signal has its own
//! freshness rules, no weekend extension, and no per-source cap.

use anyhow::Result;
use chrono::Datelike;
use serde::Serialize;
use serde_json::Value;

use ai_client::{util, TextRequest};
use pivot_common::schedule::{civil_now, issue_label, next_issue_date, slot_freshness_hours};
use pivot_common::types::{Issue, NewsletterVariant, SlotRef};

use crate::deps::Deps;
use crate::jobs::context::{RecentIssueData, SelectionContext};
use crate::jobs::selection::{
    candidate_lines, eligible_candidates, generate_subject_line, reconcile, select_slot,
    DUPLICATE_LOOKBACK_DAYS,
};
use crate::jobs::StageError;
use crate::prompts;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Quick-hit count for the SIGNALS section.
const QUICK_HIT_COUNT: usize = 5;

#[derive(Debug, Default, Serialize)]
pub struct SignalSelectionResult {
    pub sections_filled: usize,
    pub signals_filled: usize,
    pub subject_line: String,
    pub issue_id: String,
    pub record_id: String,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<SignalSelectionResult> {
    let variant = NewsletterVariant::Signal;
    let mut logger = ExecutionLogger::new(2, "signal_slot_selection");
    let mut result = SignalSelectionResult::default();

    let recent_issues = deps
        .store
        .recent_issues(variant, DUPLICATE_LOOKBACK_DAYS)
        .await?;
    let recent = RecentIssueData::from_issues(&recent_issues);
    logger.info(format!(
        "{} recent Signal issues in the dedup window",
        recent_issues.len()
    ));

    let now = civil_now(deps.config.timezone, chrono::Utc::now());
    let issue_date = next_issue_date(now);
    let label = issue_label(variant, issue_date);
    result.issue_id = label.clone();
    logger.info(format!("Next issue: {label}"));

    let mut issue = Issue::new(label.clone(), issue_date);
    let mut ctx = SelectionContext::default();
    let mut headlines: Vec<String> = Vec::new();

    for &slot in variant.slot_order() {
        let window = slot_freshness_hours(variant, slot, now.weekday()) as i64;

        if let Some(section) = variant.section_for_slot(slot) {
            match select_slot(deps, variant, slot, window, &recent, &ctx, &mut logger).await {
                Ok(Some(selection)) => {
                    ctx.record(
                        &selection.story_id,
                        &selection.fingerprint,
                        &selection.headline,
                        &selection.source,
                        selection.company.as_deref(),
                    );
                    headlines.push(selection.headline.clone());
                    issue.slots.push(SlotRef {
                        key: section.to_string(),
                        fingerprint: selection.fingerprint,
                        headline: selection.headline,
                        story_id: selection.story_id,
                    });
                    result.sections_filled += 1;
                }
                Ok(None) => {
                    result
                        .errors
                        .push(StageError::new(section, "no candidates available"));
                }
                Err(e) => {
                    logger.error(format!("Section {section} selection failed: {e}"));
                    result.errors.push(StageError::new(section, e));
                }
            }
        } else {
            // Slot 2 produces the five quick-hits in one call.
            match select_quick_hits(deps, slot, window, &recent, &mut ctx, &mut logger).await {
                Ok(picks) => {
                    for (i, pick) in picks.into_iter().enumerate() {
                        headlines.push(pick.headline.clone());
                        issue.slots.push(SlotRef {
                            key: format!("signal_{}", i + 1),
                            fingerprint: pick.fingerprint,
                            headline: pick.headline,
                            story_id: pick.story_id,
                        });
                        result.signals_filled += 1;
                    }
                }
                Err(e) => {
                    logger.error(format!("Quick-hit selection failed: {e}"));
                    result.errors.push(StageError::new("signals", e));
                }
            }
        }
    }

    if !headlines.is_empty() {
        match generate_subject_line(deps, &headlines).await {
            Ok(subject) => {
                result.subject_line = subject.clone();
                issue.subject_line = Some(subject);
            }
            Err(e) => {
                logger.warn(format!("Subject line generation failed: {e}"));
                result.errors.push(StageError::new("subject_line", e));
            }
        }
    }

    if result.sections_filled + result.signals_filled > 0 {
        let record_id = deps.store.create_issue(variant, &issue).await?;
        logger.info(format!("Created Signal issue {label} ({record_id})"));
        result.record_id = record_id;
    }

    logger.set_summary("sections_filled", result.sections_filled);
    logger.set_summary("signals_filled", result.signals_filled);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

struct QuickHit {
    story_id: String,
    fingerprint: String,
    headline: String,
}

/// Pick the five quick-hits in one model call, re-checking each against the
/// same deduplication invariants and the run context.
async fn select_quick_hits(
    deps: &Deps,
    slot: u8,
    window_hours: i64,
    recent: &RecentIssueData,
    ctx: &mut SelectionContext,
    logger: &mut ExecutionLogger,
) -> Result<Vec<QuickHit>> {
    let candidates = eligible_candidates(
        deps,
        NewsletterVariant::Signal,
        slot,
        window_hours,
        recent,
        ctx,
    )
    .await?;
    if candidates.is_empty() {
        logger.warn("SIGNALS: no candidates after dedup");
        return Ok(Vec::new());
    }

    let excluded = if ctx.selected_headlines.is_empty() {
        "None".to_string()
    } else {
        let mut used: Vec<String> = ctx
            .selected_headlines
            .iter()
            .map(|h| format!("- {h}"))
            .collect();
        used.sort();
        used.join("\n")
    };

    let prompt = prompts::quick_hit_selection(&candidate_lines(&candidates), &excluded);
    let response = deps
        .reasoning
        .complete(TextRequest::new(prompt).max_tokens(2000).temperature(0.5))
        .await?;
    let parsed = util::extract_json_object(&response)?;

    let selections = parsed
        .get("selections")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut picks = Vec::new();
    for selection in selections.iter().take(QUICK_HIT_COUNT) {
        let Some(matched) = reconcile(selection, &candidates) else {
            logger.warn("SIGNALS: pick did not match any candidate, dropping");
            continue;
        };
        if recent.is_duplicate(ctx, &matched.fingerprint, &matched.headline, &matched.story_id) {
            logger.warn(format!(
                "SIGNALS: pick {} already used, dropping",
                matched.headline
            ));
            continue;
        }
        ctx.record(
            &matched.story_id,
            &matched.fingerprint,
            &matched.headline,
            &matched.source,
            matched.company.as_deref(),
        );
        picks.push(QuickHit {
            story_id: matched.story_id,
            fingerprint: matched.fingerprint,
            headline: matched.headline,
        });
    }

    logger.info(format!("SIGNALS: selected {} quick-hits", picks.len()));
    Ok(picks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeTextModel};
    use chrono::{Duration, Utc};
    use pivot_common::types::PrefilterRow;
    use std::sync::Arc;

    fn row(fp: &str, headline: &str, slot: u8, hours_ago: i64) -> PrefilterRow {
        PrefilterRow {
            fingerprint: fp.into(),
            article_id: format!("story-{fp}"),
            headline: headline.into(),
            canonical_url: format!("https://example.com/{fp}"),
            source_name: "Reuters".into(),
            slot,
            prefiltered_at: Utc::now(),
            published_at: Some(Utc::now() - Duration::hours(hours_ago)),
        }
    }

    fn single(id: &str, fp: &str, headline: &str) -> String {
        format!(
            r#"{{"selected_id": "{id}", "selected_fingerprint": "{fp}", "selected_headline": "{headline}", "selected_source": "Reuters"}}"#
        )
    }

    #[tokio::test]
    async fn fills_sections_and_quick_hits_in_signal_order() {
        let mut deps = test_deps();
        // One candidate per long-form slot, five for the quick-hits.
        deps.store
            .insert_prefilter_rows(&[
                row("p5-top", "Top Story", 1, 2),
                row("p5-work", "Work Story", 3, 10),
                row("p5-emerge", "Emerging Story", 4, 10),
                row("p5-beyond", "Beyond Story", 5, 10),
                row("p5-s1", "Signal One", 2, 10),
                row("p5-s2", "Signal Two", 2, 10),
                row("p5-s3", "Signal Three", 2, 10),
                row("p5-s4", "Signal Four", 2, 10),
                row("p5-s5", "Signal Five", 2, 10),
            ])
            .await
            .unwrap();

        let quick_hits = format!(
            r#"{{"selections": [{}, {}, {}, {}, {}]}}"#,
            single("story-p5-s1", "p5-s1", "Signal One"),
            single("story-p5-s2", "p5-s2", "Signal Two"),
            single("story-p5-s3", "p5-s3", "Signal Three"),
            single("story-p5-s4", "p5-s4", "Signal Four"),
            single("story-p5-s5", "p5-s5", "Signal Five"),
        );
        deps.reasoning = Arc::new(FakeTextModel::scripted(&[
            &single("story-p5-top", "p5-top", "Top Story"),
            &single("story-p5-work", "p5-work", "Work Story"),
            &single("story-p5-emerge", "p5-emerge", "Emerging Story"),
            &single("story-p5-beyond", "p5-beyond", "Beyond Story"),
            &quick_hits,
            "Signal Subject",
        ]));

        let result = run(&deps).await.unwrap();
        assert_eq!(result.sections_filled, 4);
        assert_eq!(result.signals_filled, 5);
        assert!(result.errors.is_empty());

        let (_, issue) = deps
            .store
            .pending_issue(NewsletterVariant::Signal)
            .await
            .unwrap()
            .unwrap();
        assert!(issue.slot("top_story").is_some());
        assert!(issue.slot("ai_at_work").is_some());
        assert!(issue.slot("emerging").is_some());
        assert!(issue.slot("beyond").is_some());
        assert!(issue.slot("signal_5").is_some());
        // No duplicate fingerprints across the issue.
        let fingerprints = issue.fingerprints();
        let unique: std::collections::HashSet<_> = fingerprints.iter().collect();
        assert_eq!(unique.len(), fingerprints.len());
    }

    #[tokio::test]
    async fn quick_hit_duplicates_are_dropped() {
        let mut deps = test_deps();
        deps.store
            .insert_prefilter_rows(&[
                row("p5-top", "Top Story", 1, 2),
                row("p5-s1", "Signal One", 2, 10),
            ])
            .await
            .unwrap();

        // The model tries to reuse the top story as a quick-hit.
        let quick_hits = format!(
            r#"{{"selections": [{}, {}]}}"#,
            single("story-p5-top", "p5-top", "Top Story"),
            single("story-p5-s1", "p5-s1", "Signal One"),
        );
        // Sections 3-5 have no candidates, so the model is only consulted
        // for the top story and the quick-hits.
        deps.reasoning = Arc::new(FakeTextModel::scripted(&[
            &single("story-p5-top", "p5-top", "Top Story"),
            &quick_hits,
            "Subject",
        ]));

        let result = run(&deps).await.unwrap();
        assert_eq!(result.sections_filled, 1);
        assert_eq!(result.signals_filled, 1);
        assert_eq!(result.errors.len(), 3);

        let (_, issue) = deps
            .store
            .pending_issue(NewsletterVariant::Signal)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(issue.slot("signal_1").unwrap().fingerprint, "p5-s1");
    }
}
