//! Scheduled-send sweep: every five minutes, reclassify past-due `scheduled`
//! issues to `next-send` and immediately push them through the sender.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use pivot_common::types::IssueStatus;

use crate::deps::Deps;
use crate::jobs::{send, StageError};
use crate::run_log::{ExecutionLogger, RunStatus};

#[derive(Debug, Default, Serialize)]
pub struct ScheduledSendResult {
    pub found: usize,
    pub triggered: Vec<String>,
    pub not_yet_due: usize,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<ScheduledSendResult> {
    let mut logger = ExecutionLogger::new(5, "scheduled_send_checker");
    let mut result = ScheduledSendResult::default();
    let now = Utc::now();

    let scheduled = deps.store.scheduled_final_issues().await?;
    result.found = scheduled.len();
    if scheduled.is_empty() {
        logger.info("No scheduled issues");
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    }

    let mut any_due = false;
    for (record_id, issue) in scheduled {
        let Some(send_time) = issue.scheduled_send_time else {
            logger.warn(format!("{}: no scheduled_send_time, skipping", issue.issue_id));
            result
                .errors
                .push(StageError::new(issue.issue_id.clone(), "missing scheduled_send_time"));
            continue;
        };

        if send_time <= now {
            logger.info(format!("{}: due, reclassifying to next-send", issue.issue_id));
            let mut patch = Map::new();
            patch.insert(
                "status".into(),
                Value::String(IssueStatus::NextSend.as_str().into()),
            );
            match deps.store.update_final_issue(&record_id, patch).await {
                Ok(()) => {
                    result.triggered.push(issue.issue_id.clone());
                    any_due = true;
                }
                Err(e) => {
                    logger.error(format!("{}: reclassify failed: {e}", issue.issue_id));
                    result.errors.push(StageError::new(issue.issue_id.clone(), e));
                }
            }
        } else {
            let minutes = (send_time - now).num_minutes();
            logger.info(format!("{}: not due for {minutes} minutes", issue.issue_id));
            result.not_yet_due += 1;
        }
    }

    // Synchronous enqueue: fire the sender now rather than waiting for the
    // next send cron.
    if any_due {
        if let Err(e) = send::run(deps).await {
            logger.warn(format!("Immediate send failed, next cron will retry: {e}"));
            result.errors.push(StageError::new("immediate_send", e));
        }
    }

    logger.set_summary("found", result.found);
    logger.set_summary("triggered", result.triggered.len());
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeGateway};
    use chrono::Duration;
    use pivot_common::types::FinalIssue;
    use pivot_store::Table;
    use std::sync::Arc;

    fn scheduled_issue(label: &str, minutes_from_now: i64) -> FinalIssue {
        FinalIssue {
            issue_id: label.into(),
            newsletter_id: "pivot_ai".into(),
            html: "<html></html>".into(),
            html_deliverability: String::new(),
            subject_line: "Subject".into(),
            status: IssueStatus::Scheduled,
            summary: String::new(),
            summary_plus: String::new(),
            scheduled_send_time: Some(Utc::now() + Duration::minutes(minutes_from_now)),
        }
    }

    #[tokio::test]
    async fn past_due_issue_is_reclassified_and_sent() {
        let mut deps = test_deps();
        deps.gateway = Some(Arc::new(FakeGateway::succeeding()));
        deps.store
            .create_final_issue(&scheduled_issue("Pivot 5 - Jan 02", -10))
            .await
            .unwrap();

        let result = run(&deps).await.unwrap();
        assert_eq!(result.triggered, vec!["Pivot 5 - Jan 02".to_string()]);

        // Sent and cleaned up by the immediate send.
        assert!(deps.dump(Table::IssuesFinal).await.is_empty());
        assert_eq!(deps.dump(Table::IssuesArchive).await.len(), 1);
    }

    #[tokio::test]
    async fn future_issue_is_left_alone() {
        let mut deps = test_deps();
        deps.gateway = Some(Arc::new(FakeGateway::succeeding()));
        deps.store
            .create_final_issue(&scheduled_issue("Pivot 5 - Jan 03", 90))
            .await
            .unwrap();

        let result = run(&deps).await.unwrap();
        assert!(result.triggered.is_empty());
        assert_eq!(result.not_yet_due, 1);

        let finals = deps.dump(Table::IssuesFinal).await;
        assert_eq!(finals[0].str_field("status"), "scheduled");
    }
}
