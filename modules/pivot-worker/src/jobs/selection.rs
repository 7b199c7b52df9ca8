//! Pivot 5 slot selection: one reasoning-model choice per slot under
//! freshness windows and diversity invariants, with a cumulative run context
//! threaded through the slots.

use anyhow::Result;
use chrono::Datelike;
use serde::Serialize;
use serde_json::Value;

use ai_client::{util, TextRequest};
use pivot_common::schedule::{civil_now, issue_label, next_issue_date, slot_freshness_hours};
use pivot_common::types::{Issue, NewsletterVariant, PrefilterRow, SlotRef};

use crate::deps::Deps;
use crate::jobs::context::{RecentIssueData, SelectionContext};
use crate::jobs::StageError;
use crate::prompts::{self, CandidateLine};
use crate::run_log::{ExecutionLogger, RunStatus};

/// Rolling deduplication history, in days.
pub const DUPLICATE_LOOKBACK_DAYS: i64 = 14;

/// Max stories per source per issue.
pub const MAX_PER_SOURCE: u32 = 2;

/// Hard cap for subject lines.
const SUBJECT_MAX_CHARS: usize = 90;

#[derive(Debug, Default, Serialize)]
pub struct SelectionResult {
    pub slots_filled: usize,
    pub subject_line: String,
    pub issue_id: String,
    pub record_id: String,
    pub errors: Vec<StageError>,
}

/// The model's answer for one slot, reconciled against the candidate list.
#[derive(Debug, Clone)]
pub struct SlotSelection {
    pub story_id: String,
    pub fingerprint: String,
    pub headline: String,
    pub source: String,
    pub company: Option<String>,
}

pub async fn run(deps: &Deps) -> Result<SelectionResult> {
    let variant = NewsletterVariant::Pivot5;
    let mut logger = ExecutionLogger::new(2, "slot_selection");
    let mut result = SelectionResult::default();

    // History first: one read backs every slot's deduplication.
    let recent_issues = deps
        .store
        .recent_issues(variant, DUPLICATE_LOOKBACK_DAYS)
        .await?;
    let recent = RecentIssueData::from_issues(&recent_issues);
    logger.info(format!(
        "{} recent issues, {} known story ids",
        recent_issues.len(),
        recent.story_ids.len()
    ));

    let now = civil_now(deps.config.timezone, chrono::Utc::now());
    let issue_date = next_issue_date(now);
    let label = issue_label(variant, issue_date);
    logger.info(format!("Next issue: {label}"));

    let mut issue = Issue::new(label.clone(), issue_date);
    result.issue_id = label.clone();
    let mut ctx = SelectionContext::default();
    let mut headlines: Vec<String> = Vec::new();

    for &slot in variant.slot_order() {
        let window = slot_freshness_hours(variant, slot, now.weekday()) as i64;
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
                    key: format!("slot_{slot}"),
                    fingerprint: selection.fingerprint,
                    headline: selection.headline,
                    story_id: selection.story_id,
                });
                result.slots_filled += 1;
            }
            Ok(None) => {
                result
                    .errors
                    .push(StageError::new(format!("slot_{slot}"), "no candidates available"));
            }
            Err(e) => {
                logger.error(format!("Slot {slot} selection failed: {e}"));
                result.errors.push(StageError::new(format!("slot_{slot}"), e));
            }
        }
    }

    // Subject line from whatever filled; its failure never loses the issue.
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

    if result.slots_filled > 0 {
        match deps.store.create_issue(variant, &issue).await {
            Ok(record_id) => {
                logger.info(format!("Created issue {label} ({record_id})"));
                result.record_id = record_id;
            }
            Err(e) => {
                logger.error(format!("Issue write failed: {e}"));
                result.errors.push(StageError::new("write_issue", &e));
                logger.set_summary("slots_filled", result.slots_filled);
                logger
                    .complete(&deps.store, RunStatus::Error, Some(&e.to_string()))
                    .await;
                return Err(e.into());
            }
        }
    }

    logger.set_summary("slots_filled", result.slots_filled);
    logger.set_summary("errors", result.errors.len());
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

/// Select one story for a slot. Ok(None) means the slot had no usable
/// candidates; that is recorded, not raised.
pub async fn select_slot(
    deps: &Deps,
    variant: NewsletterVariant,
    slot: u8,
    window_hours: i64,
    recent: &RecentIssueData,
    ctx: &SelectionContext,
    logger: &mut ExecutionLogger,
) -> Result<Option<SlotSelection>> {
    let candidates = eligible_candidates(deps, variant, slot, window_hours, recent, ctx).await?;
    if candidates.is_empty() {
        logger.warn(format!("Slot {slot}: no candidates after dedup"));
        return Ok(None);
    }
    logger.info(format!(
        "Slot {slot}: {} candidates after dedup",
        candidates.len()
    ));

    let system = prompts::selection_system(variant, slot, recent, ctx);
    let user = prompts::selection_user(&candidate_lines(&candidates));
    let response = deps
        .reasoning
        .complete(
            TextRequest::new(user)
                .system(system)
                .max_tokens(2000)
                .temperature(0.5),
        )
        .await?;

    let parsed = util::extract_json_object(&response)?;
    let Some(selection) = reconcile(&parsed, &candidates) else {
        logger.warn(format!(
            "Slot {slot}: selection did not match any candidate"
        ));
        return Ok(None);
    };

    // Invariant re-checks; a violating candidate is dropped, never raised.
    if recent.is_duplicate(ctx, &selection.fingerprint, &selection.headline, &selection.story_id) {
        logger.warn(format!(
            "Slot {slot}: model chose an already-used story, dropping"
        ));
        return Ok(None);
    }
    if variant == NewsletterVariant::Pivot5
        && ctx.source_count(&selection.source) >= MAX_PER_SOURCE
    {
        logger.warn(format!(
            "Slot {slot}: source {} already at cap, dropping",
            selection.source
        ));
        return Ok(None);
    }

    logger.info(format!("Slot {slot} selected: {}", selection.headline));
    Ok(Some(selection))
}

/// Candidates for a slot after history, run-context, and source-cap
/// filtering.
pub async fn eligible_candidates(
    deps: &Deps,
    variant: NewsletterVariant,
    slot: u8,
    window_hours: i64,
    recent: &RecentIssueData,
    ctx: &SelectionContext,
) -> Result<Vec<(String, PrefilterRow)>> {
    let rows = deps.store.prefilter_candidates(slot, window_hours).await?;
    Ok(rows
        .into_iter()
        .filter(|(_, row)| {
            !recent.is_duplicate(ctx, &row.fingerprint, &row.headline, &row.article_id)
        })
        .filter(|(_, row)| {
            variant != NewsletterVariant::Pivot5
                || ctx.source_count(&row.source_name) < MAX_PER_SOURCE
        })
        .collect())
}

pub fn candidate_lines(candidates: &[(String, PrefilterRow)]) -> Vec<CandidateLine> {
    candidates
        .iter()
        .map(|(_, row)| CandidateLine {
            id: row.article_id.clone(),
            fingerprint: row.fingerprint.clone(),
            headline: row.headline.clone(),
            source: row.source_name.clone(),
            published: row
                .published_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        })
        .collect()
}

/// Reconcile a model answer against the candidate list. Fingerprint wins;
/// otherwise exact id, then exact trimmed case-insensitive headline — and in
/// the headline case the id is corrected to the matched candidate's.
pub fn reconcile(parsed: &Value, candidates: &[(String, PrefilterRow)]) -> Option<SlotSelection> {
    let get = |key: &str| {
        parsed
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let fingerprint = get("selected_fingerprint");
    let story_id = get("selected_id");
    let headline = get("selected_headline");

    let matched = fingerprint
        .and_then(|fp| candidates.iter().find(|(_, c)| c.fingerprint == fp))
        .or_else(|| {
            story_id.and_then(|id| candidates.iter().find(|(_, c)| c.article_id == id))
        })
        .or_else(|| {
            let wanted = headline?.to_lowercase();
            candidates
                .iter()
                .find(|(_, c)| c.headline.to_lowercase().trim() == wanted)
        })?;

    let row = &matched.1;
    Some(SlotSelection {
        story_id: row.article_id.clone(),
        fingerprint: row.fingerprint.clone(),
        headline: row.headline.clone(),
        source: row.source_name.clone(),
        company: get("selected_company").map(str::to_string),
    })
}

pub async fn generate_subject_line(deps: &Deps, headlines: &[String]) -> Result<String> {
    let response = deps
        .reasoning
        .complete(
            TextRequest::new(prompts::subject_line(headlines))
                .max_tokens(100)
                .temperature(0.7),
        )
        .await?;
    let subject = response.trim().trim_matches(['"', '\'']).to_string();
    Ok(subject.chars().take(SUBJECT_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeTextModel};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn prefilter_row(fp: &str, headline: &str, source: &str, slot: u8) -> PrefilterRow {
        PrefilterRow {
            fingerprint: fp.into(),
            article_id: format!("story-{fp}"),
            headline: headline.into(),
            canonical_url: format!("https://{source}.example/{fp}"),
            source_name: source.into(),
            slot,
            prefiltered_at: Utc::now(),
            published_at: Some(Utc::now() - Duration::hours(2)),
        }
    }

    fn selection_json(id: &str, fp: &str, headline: &str, source: &str) -> String {
        format!(
            r#"{{"selected_id": "{id}", "selected_fingerprint": "{fp}", "selected_headline": "{headline}", "selected_source": "{source}", "selected_company": null}}"#
        )
    }

    #[tokio::test]
    async fn source_cap_excludes_third_story_from_same_outlet() {
        let deps = test_deps();
        deps.store
            .insert_prefilter_rows(&[
                prefilter_row("p5-tc1", "TechCrunch One", "TechCrunch", 3),
                prefilter_row("p5-tc2", "TechCrunch Two", "TechCrunch", 3),
                prefilter_row("p5-r1", "Reuters Story", "Reuters", 3),
            ])
            .await
            .unwrap();

        // Two TechCrunch picks already made today.
        let mut ctx = SelectionContext::default();
        ctx.record("a", "p5-a", "A", "TechCrunch", None);
        ctx.record("b", "p5-b", "B", "TechCrunch", None);
        let recent = RecentIssueData::default();

        let candidates = eligible_candidates(
            &deps,
            NewsletterVariant::Pivot5,
            3,
            168,
            &recent,
            &ctx,
        )
        .await
        .unwrap();

        // Only the Reuters story survives the cap.
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].1.source_name, "Reuters");
    }

    #[tokio::test]
    async fn selection_reconciles_bad_id_by_headline() {
        let candidates = vec![
            ("rec1".to_string(), prefilter_row("p5-a", "Nvidia Eyes $3B Deal", "Reuters", 1)),
            ("rec2".to_string(), prefilter_row("p5-b", "Other Story", "CNBC", 1)),
        ];

        // Model hallucinated the id and omitted the fingerprint.
        let parsed: Value = serde_json::from_str(
            r#"{"selected_id": "bogus-id", "selected_headline": " NVIDIA EYES $3B DEAL ", "selected_source": "Reuters"}"#,
        )
        .unwrap();

        let selection = reconcile(&parsed, &candidates).unwrap();
        assert_eq!(selection.story_id, "story-p5-a");
        assert_eq!(selection.fingerprint, "p5-a");
    }

    #[tokio::test]
    async fn reconcile_prefers_fingerprint() {
        let candidates = vec![
            ("rec1".to_string(), prefilter_row("p5-a", "Story A", "Reuters", 1)),
            ("rec2".to_string(), prefilter_row("p5-b", "Story B", "CNBC", 1)),
        ];
        let parsed: Value = serde_json::from_str(
            r#"{"selected_id": "story-p5-a", "selected_fingerprint": "p5-b", "selected_headline": "Story A"}"#,
        )
        .unwrap();

        let selection = reconcile(&parsed, &candidates).unwrap();
        assert_eq!(selection.fingerprint, "p5-b");
    }

    #[tokio::test]
    async fn empty_slot_is_recorded_and_issue_still_created() {
        let mut deps = test_deps();
        // Only slot 1 has a candidate; the model returns it.
        deps.store
            .insert_prefilter_rows(&[prefilter_row("p5-only", "The Only Story", "Reuters", 1)])
            .await
            .unwrap();
        deps.reasoning = Arc::new(FakeTextModel::scripted(&[
            &selection_json("story-p5-only", "p5-only", "The Only Story", "Reuters"),
            "A Subject Line",
        ]));

        let result = run(&deps).await.unwrap();
        assert_eq!(result.slots_filled, 1);
        // Slots 2-5 recorded as errors, issue still written.
        assert_eq!(result.errors.len(), 4);
        assert!(!result.record_id.is_empty());

        let (_, issue) = deps
            .store
            .pending_issue(NewsletterVariant::Pivot5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(issue.slots.len(), 1);
        assert_eq!(issue.subject_line.as_deref(), Some("A Subject Line"));
    }

    #[tokio::test]
    async fn fourteen_day_history_excludes_candidates() {
        let deps = test_deps();
        deps.store
            .insert_prefilter_rows(&[prefilter_row("p5-used", "Used Before", "Reuters", 1)])
            .await
            .unwrap();

        let mut recent = RecentIssueData::default();
        recent.fingerprints.insert("p5-used".into());

        let candidates = eligible_candidates(
            &deps,
            NewsletterVariant::Pivot5,
            1,
            24,
            &recent,
            &SelectionContext::default(),
        )
        .await
        .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn subject_line_is_trimmed_and_capped() {
        let mut deps = test_deps();
        deps.reasoning = Arc::new(FakeTextModel::returning(
            "\"An Extremely Long Subject Line That Keeps Going And Going And Going And Going Well Past Ninety Characters\"",
        ));
        let subject = generate_subject_line(&deps, &["H".to_string()]).await.unwrap();
        assert!(subject.len() <= 90);
        assert!(!subject.starts_with('"'));
    }
}
