//! Signal compile: build the no-image, no-link Signal email from the
//! decorated stories, store it on the issue, and queue the send.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use pivot_common::types::{FinalIssue, IssueStatus, NewsletterVariant};

use crate::deps::Deps;
use crate::html;
use crate::jobs::StageError;
use crate::run_log::{ExecutionLogger, RunStatus};

pub const DEFAULT_SUBJECT: &str = "Your daily AI briefing is ready";

#[derive(Debug, Default, Serialize)]
pub struct SignalCompileResult {
    pub compiled: bool,
    pub issue_id: String,
    pub subject_line: String,
    pub story_count: usize,
    pub html_length: usize,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps, issue_id: Option<&str>) -> Result<SignalCompileResult> {
    let variant = NewsletterVariant::Signal;
    let mut logger = ExecutionLogger::new(4, "signal_html_compile");
    let mut result = SignalCompileResult::default();

    let found = match issue_id {
        Some(label) => deps.store.issue_by_label(variant, label).await?,
        None => deps.store.decorated_issue(variant).await?,
    };
    let Some((issue_record_id, issue)) = found else {
        logger.info("No decorated Signal issue found");
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };
    result.issue_id = issue.issue_id.clone();
    logger.info(format!("Compiling {}", issue.issue_id));

    let stories = deps.store.stories_for_compile(variant, &issue.issue_id).await?;
    if stories.is_empty() {
        logger.warn("No decorated stories to compile; issue stays decorated");
        result
            .errors
            .push(StageError::new("fetch_stories", "no decorated stories"));
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

    let html = html::signal::render(&stories, &subject_line, issue.issue_date);
    result.html_length = html.len();
    logger.info(format!("HTML built: {} chars", html.len()));

    // The compiled HTML lives on the issue row; the send queue row carries
    // it too so the shared sender handles both variants.
    let mut patch = Map::new();
    patch.insert("compiled_html".into(), Value::String(html.clone()));
    deps.store.update_issue(variant, &issue_record_id, patch).await?;

    let final_issue = FinalIssue {
        issue_id: issue.issue_id.clone(),
        newsletter_id: variant.newsletter_id().to_string(),
        // Signal's template already is its deliverability-lean form.
        html_deliverability: html.clone(),
        html,
        subject_line,
        status: IssueStatus::NextSend,
        summary: String::new(),
        summary_plus: String::new(),
        scheduled_send_time: None,
    };
    deps.store.create_final_issue(&final_issue).await?;

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

    logger.set_summary("story_count", result.story_count);
    logger.set_summary("html_length", result.html_length);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::test_deps;
    use chrono::NaiveDate;
    use pivot_common::types::{Issue, IssueStory, SlotRef};
    use pivot_store::Table;

    #[tokio::test]
    async fn compiles_signal_issue_and_stores_html() {
        let deps = test_deps();

        let mut issue = Issue::new(
            "Signal - Jan 12".into(),
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
        );
        issue.subject_line = Some("Signal Subject".into());
        issue.slots.push(SlotRef {
            key: "top_story".into(),
            fingerprint: "p5-a".into(),
            headline: "H".into(),
            story_id: "story-1".into(),
        });
        let id = deps
            .store
            .create_issue(NewsletterVariant::Signal, &issue)
            .await
            .unwrap();
        deps.store
            .advance_issue_status(NewsletterVariant::Signal, &id, IssueStatus::Decorated)
            .await
            .unwrap();

        deps.store
            .insert_issue_story(
                NewsletterVariant::Signal,
                &IssueStory {
                    story_id: "story-1".into(),
                    issue_id: "Signal - Jan 12".into(),
                    section: Some("top_story".into()),
                    slot_order: Some(1),
                    headline: "Enterprise AI Spending Doubles".into(),
                    one_liner: Some("Budgets shift.".into()),
                    lead: Some("A.\n\nB.".into()),
                    why_it_matters: Some("\u{2022} X.\n\u{2022} Y.".into()),
                    whats_next: Some("\u{2022} P.\n\u{2022} Q.".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = run(&deps, None).await.unwrap();
        assert!(result.compiled);
        assert_eq!(result.subject_line, "Signal Subject");

        let issues = deps.dump(Table::Issues(NewsletterVariant::Signal)).await;
        assert_eq!(issues[0].str_field("status"), "next-send");
        assert!(issues[0]
            .str_field("compiled_html")
            .contains("Enterprise AI Spending Doubles"));

        let finals = deps.dump(Table::IssuesFinal).await;
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].str_field("newsletter_id"), "signal");
    }
}
