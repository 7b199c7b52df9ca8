//! Send: claim one `next-send` issue, create and send the gateway campaign,
//! archive the outcome, and clear the working-set row. Failures leave the
//! queue row in `failed` with a full archive record.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use pivot_common::types::{ArchiveRow, IssueStatus, NewsletterVariant};

use crate::deps::Deps;
use crate::jobs::StageError;
use crate::run_log::{ExecutionLogger, RunStatus};

#[derive(Debug, Default, Serialize)]
pub struct SendResult {
    pub skipped: bool,
    pub sent: bool,
    pub issue_id: String,
    pub gateway_sent_count: i64,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<SendResult> {
    let mut logger = ExecutionLogger::new(5, "send");
    let mut result = SendResult::default();

    let Some(gateway) = &deps.gateway else {
        logger.warn("Email gateway not configured, skipping send");
        result.skipped = true;
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };

    let Some((final_record_id, final_issue)) = deps.store.next_send_issue().await? else {
        logger.info("No issues queued for send");
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };
    result.issue_id = final_issue.issue_id.clone();
    logger.info(format!("Sending {}", final_issue.issue_id));

    let variant = if final_issue.newsletter_id == NewsletterVariant::Signal.newsletter_id() {
        NewsletterVariant::Signal
    } else {
        NewsletterVariant::Pivot5
    };

    let send_outcome = gateway
        .send_campaign(
            &final_issue.issue_id,
            &final_issue.subject_line,
            &final_issue.html,
            deps.config.mautic_segment_id,
        )
        .await;

    let now = Utc::now();
    match send_outcome {
        Ok(campaign) => {
            result.sent = true;
            result.gateway_sent_count = campaign.outcome.sent_count;
            logger.info(format!(
                "Gateway send complete: {} sent, {} failed",
                campaign.outcome.sent_count, campaign.outcome.failed_recipients
            ));

            let archive = ArchiveRow {
                issue_id: final_issue.issue_id.clone(),
                newsletter_id: final_issue.newsletter_id.clone(),
                send_date: now.date_naive(),
                sent_at: Some(now),
                subject_line: final_issue.subject_line.clone(),
                status: IssueStatus::Sent,
                html: final_issue.html.clone(),
                summary: final_issue.summary.clone(),
                gateway_sent_count: campaign.outcome.sent_count,
                gateway_failed_recipients: campaign.outcome.failed_recipients,
                gateway_send_status: "sent".into(),
                gateway_response_raw: campaign.outcome.raw_response.clone(),
            };
            deps.store.upsert_archive(&archive).await?;

            // The working-set row goes away; the issue row records the send.
            deps.store.delete_final_issue(&final_record_id).await?;
            if let Some((issue_record_id, _)) = deps
                .store
                .issue_by_label(variant, &final_issue.issue_id)
                .await?
            {
                let mut patch = Map::new();
                patch.insert("status".into(), Value::String(IssueStatus::Sent.as_str().into()));
                patch.insert("sent_at".into(), Value::String(now.to_rfc3339()));
                deps.store.update_issue(variant, &issue_record_id, patch).await?;
            }

            logger.set_summary("sent_count", campaign.outcome.sent_count);
            logger.complete(&deps.store, RunStatus::Success, None).await;
        }
        Err(e) => {
            logger.error(format!("Gateway send failed: {e}"));
            result.errors.push(StageError::new("gateway", &e));

            let mut patch = Map::new();
            patch.insert(
                "status".into(),
                Value::String(IssueStatus::Failed.as_str().into()),
            );
            deps.store.update_final_issue(&final_record_id, patch).await?;

            let archive = ArchiveRow {
                issue_id: final_issue.issue_id.clone(),
                newsletter_id: final_issue.newsletter_id.clone(),
                send_date: now.date_naive(),
                sent_at: None,
                subject_line: final_issue.subject_line.clone(),
                status: IssueStatus::Failed,
                html: final_issue.html.clone(),
                summary: final_issue.summary.clone(),
                gateway_sent_count: 0,
                gateway_failed_recipients: 0,
                gateway_send_status: "error".into(),
                gateway_response_raw: e.to_string(),
            };
            deps.store.upsert_archive(&archive).await?;

            logger
                .complete(&deps.store, RunStatus::Error, Some(&e.to_string()))
                .await;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{test_deps, FakeGateway};
    use pivot_common::types::FinalIssue;
    use pivot_store::Table;
    use std::sync::Arc;

    fn queued_issue() -> FinalIssue {
        FinalIssue {
            issue_id: "Pivot 5 - Jan 02".into(),
            newsletter_id: "pivot_ai".into(),
            html: "<html>issue</html>".into(),
            html_deliverability: "<div>issue</div>".into(),
            subject_line: "Subject".into(),
            status: IssueStatus::NextSend,
            summary: "Summary.".into(),
            summary_plus: "Summary plus.".into(),
            scheduled_send_time: None,
        }
    }

    #[tokio::test]
    async fn successful_send_archives_and_clears_queue() {
        let mut deps = test_deps();
        let gateway = Arc::new(FakeGateway::succeeding());
        deps.gateway = Some(gateway.clone());
        deps.store.create_final_issue(&queued_issue()).await.unwrap();

        let result = run(&deps).await.unwrap();
        assert!(result.sent);
        assert_eq!(result.gateway_sent_count, 41250);

        // Queue row deleted, archive row upserted with stats and raw response.
        assert!(deps.dump(Table::IssuesFinal).await.is_empty());
        let archive = deps.dump(Table::IssuesArchive).await;
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].str_field("status"), "sent");
        assert_eq!(archive[0].str_field("gateway_send_status"), "sent");
        assert!(archive[0].str_field("gateway_response_raw").contains("success"));
    }

    #[tokio::test]
    async fn gateway_failure_leaves_failed_row_with_archive() {
        let mut deps = test_deps();
        // The adapter's own retry is exercised in its crate; this gateway
        // fails outright.
        deps.gateway = Some(Arc::new(FakeGateway {
            fail_first: std::sync::atomic::AtomicU32::new(u32::MAX),
            sends: std::sync::Mutex::new(Vec::new()),
        }));
        deps.store.create_final_issue(&queued_issue()).await.unwrap();

        let result = run(&deps).await.unwrap();
        assert!(!result.sent);

        let finals = deps.dump(Table::IssuesFinal).await;
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].str_field("status"), "failed");

        let archive = deps.dump(Table::IssuesArchive).await;
        assert_eq!(archive[0].str_field("status"), "failed");
        assert!(!archive[0].str_field("gateway_response_raw").is_empty());
    }

    #[tokio::test]
    async fn skipped_without_gateway() {
        let deps = test_deps();
        let result = run(&deps).await.unwrap();
        assert!(result.skipped);
    }
}
