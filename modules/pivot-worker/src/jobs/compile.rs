//! Pivot 5 compile: load the decorated issue's image-complete stories, build
//! the rich and deliverability HTML variants plus the short summaries, and
//! queue the send.

use anyhow::Result;
use serde::Serialize;

use pivot_common::types::{FinalIssue, IssueStatus, NewsletterVariant};

use crate::deps::Deps;
use crate::html;
use crate::jobs::StageError;
use crate::prompts;
use crate::run_log::{ExecutionLogger, RunStatus};

use ai_client::TextRequest;

/// Fallback subject when selection never produced one.
pub const DEFAULT_SUBJECT: &str = "5 headlines. 5 minutes. 5 days a week.";

#[derive(Debug, Default, Serialize)]
pub struct CompileResult {
    pub compiled: bool,
    pub issue_id: String,
    pub subject_line: String,
    pub story_count: usize,
    pub html_length: usize,
    pub errors: Vec<StageError>,
}

/// Compile the newest decorated issue, or a specific one by label.
pub async fn run(deps: &Deps, issue_id: Option<&str>) -> Result<CompileResult> {
    let variant = NewsletterVariant::Pivot5;
    let mut logger = ExecutionLogger::new(4, "html_compile");
    let mut result = CompileResult::default();

    let found = match issue_id {
        Some(label) => deps.store.issue_by_label(variant, label).await?,
        None => deps.store.decorated_issue(variant).await?,
    };
    let Some((issue_record_id, issue)) = found else {
        logger.info("No decorated issue found");
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };
    result.issue_id = issue.issue_id.clone();
    logger.info(format!("Compiling {}", issue.issue_id));

    let stories = deps.store.stories_for_compile(variant, &issue.issue_id).await?;
    if stories.is_empty() {
        logger.warn("No image-complete stories to compile; issue stays decorated");
        result
            .errors
            .push(StageError::new("fetch_stories", "no compiled-ready stories"));
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    }
    result.story_count = stories.len();

    let subject_line = issue
        .subject_line
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
    result.subject_line = subject_line.clone();

    let rich = html::pivot5::render(&stories, &subject_line, issue.issue_date);
    let deliverability = html::stripper::strip_for_deliverability(
        &stories,
        &subject_line,
        &deps.config.deliverability_brand,
    );
    result.html_length = rich.len();
    logger.info(format!(
        "HTML built: {} chars rich, {} chars deliverability",
        rich.len(),
        deliverability.len()
    ));

    // Short summaries for the archive; failures keep an empty summary.
    let headlines: Vec<String> = stories.iter().map(|s| s.headline.clone()).collect();
    let summary = issue_summary(deps, &headlines, 15).await.unwrap_or_default();
    let summary_plus = issue_summary(deps, &headlines, 20).await.unwrap_or_default();

    let final_issue = FinalIssue {
        issue_id: issue.issue_id.clone(),
        newsletter_id: variant.newsletter_id().to_string(),
        html: rich,
        html_deliverability: deliverability,
        subject_line,
        status: IssueStatus::NextSend,
        summary,
        summary_plus,
        scheduled_send_time: None,
    };
    deps.store.create_final_issue(&final_issue).await?;

    // Recompiles find the issue already past these states; that is fine.
    for status in [IssueStatus::Compiled, IssueStatus::NextSend] {
        match deps
            .store
            .advance_issue_status(variant, &issue_record_id, status)
            .await
        {
            Ok(()) => {}
            Err(pivot_store::StoreError::StatusRegression { from, .. }) => {
                logger.info(format!("Issue already at {from}, leaving status"));
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    result.compiled = true;
    logger.info("Issue compiled and queued for send");

    logger.set_summary("story_count", result.story_count);
    logger.set_summary("html_length", result.html_length);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

async fn issue_summary(deps: &Deps, headlines: &[String], max_words: u32) -> Result<String> {
    let response = deps
        .reasoning
        .complete(
            TextRequest::new(prompts::issue_summary(headlines, max_words))
                .max_tokens(100)
                .temperature(0.5),
        )
        .await?;
    Ok(response.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeTextModel};
    use chrono::NaiveDate;
    use pivot_common::types::{ImageStatus, Issue, IssueStory, SlotRef};
    use pivot_store::Table;
    use std::sync::Arc;

    async fn seed_decorated_issue(deps: &crate::deps::Deps) -> String {
        let mut issue = Issue::new(
            "Pivot 5 - Jan 02".into(),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        );
        issue.subject_line = Some("Subject".into());
        issue.slots.push(SlotRef {
            key: "slot_1".into(),
            fingerprint: "p5-a".into(),
            headline: "H".into(),
            story_id: "story-1".into(),
        });
        let id = deps
            .store
            .create_issue(NewsletterVariant::Pivot5, &issue)
            .await
            .unwrap();
        deps.store
            .advance_issue_status(NewsletterVariant::Pivot5, &id, IssueStatus::Decorated)
            .await
            .unwrap();
        id
    }

    fn generated_story(slot: u8) -> IssueStory {
        IssueStory {
            story_id: format!("story-{slot}"),
            issue_id: "Pivot 5 - Jan 02".into(),
            slot_order: Some(slot),
            headline: format!("Headline {slot}"),
            dek: Some("Dek.".into()),
            b1: Some("One. Two.".into()),
            b2: Some("Three. Four.".into()),
            b3: Some("Five. Six.".into()),
            label: "BIG TECH".into(),
            image_url: Some("https://imagedelivery.net/x/public".into()),
            image_status: Some(ImageStatus::Generated),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn compiles_and_queues_send() {
        let mut deps = test_deps();
        deps.reasoning = Arc::new(FakeTextModel::returning("A concise summary."));
        seed_decorated_issue(&deps).await;
        for slot in 1..=5 {
            deps.store
                .insert_issue_story(NewsletterVariant::Pivot5, &generated_story(slot))
                .await
                .unwrap();
        }

        let result = run(&deps, None).await.unwrap();
        assert!(result.compiled);
        assert_eq!(result.story_count, 5);

        let finals = deps.dump(Table::IssuesFinal).await;
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].str_field("status"), "next-send");
        assert!(finals[0].str_field("html").contains("Headline 3"));
        assert!(!finals[0].str_field("html_deliverability").contains("<img"));
        assert_eq!(finals[0].str_field("summary"), "A concise summary.");

        // Issue advanced decorated -> compiled -> next-send.
        let issues = deps.dump(Table::Issues(NewsletterVariant::Pivot5)).await;
        assert_eq!(issues[0].str_field("status"), "next-send");
    }

    #[tokio::test]
    async fn recompile_is_byte_identical_for_same_inputs() {
        let mut deps = test_deps();
        deps.reasoning = Arc::new(FakeTextModel::returning("Summary."));
        seed_decorated_issue(&deps).await;
        deps.store
            .insert_issue_story(NewsletterVariant::Pivot5, &generated_story(1))
            .await
            .unwrap();

        let first = run(&deps, None).await.unwrap();
        assert!(first.compiled);
        let first_html = deps.dump(Table::IssuesFinal).await[0]
            .str_field("html")
            .to_string();

        // Recompile the same issue by label.
        let second = run(&deps, Some("Pivot 5 - Jan 02")).await.unwrap();
        assert!(second.compiled);
        let finals = deps.dump(Table::IssuesFinal).await;
        assert_eq!(finals[1].str_field("html"), first_html);
    }

    #[tokio::test]
    async fn uncompilable_issue_stays_decorated() {
        let deps = test_deps();
        seed_decorated_issue(&deps).await;
        // No image-complete stories.

        let result = run(&deps, None).await.unwrap();
        assert!(!result.compiled);

        let issues = deps.dump(Table::Issues(NewsletterVariant::Pivot5)).await;
        assert_eq!(issues[0].str_field("status"), "decorated");
    }
}
