//! Typed store facade. Every pipeline stage reads and writes through these
//! operations; nothing upstream sees record ids, field maps, or formulas
//! unless it asks for the generic layer explicitly.

use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use pivot_common::types::{
    ArchiveRow, Article, FinalIssue, FitStatus, ImageStatus, Issue, IssueStatus, IssueStory,
    NewsletterVariant, PrefilterRow, Select,
};

use crate::backend::{Query, SortOrder, StoreError, Table, TableBackend};
use crate::predicate::Predicate;
use crate::record::Record;

type Result<T> = std::result::Result<T, StoreError>;

/// Candidate cap per slot when pulling prefilter rows for selection.
const SELECTION_CANDIDATE_CAP: u32 = 200;

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn TableBackend>,
}

impl Store {
    pub fn new(backend: Arc<dyn TableBackend>) -> Self {
        Self { backend }
    }

    // -----------------------------------------------------------------------
    // Generic operations
    // -----------------------------------------------------------------------

    pub async fn find(&self, table: Table, query: &Query) -> Result<Vec<Record>> {
        self.backend.list(table, query).await
    }

    pub async fn get(&self, table: Table, id: &str) -> Result<Option<Record>> {
        self.backend.get(table, id).await
    }

    pub async fn insert(&self, table: Table, fields: Map<String, Value>) -> Result<String> {
        let created = self.backend.create_batch(table, vec![fields]).await?;
        created
            .into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| StoreError::Backend("create returned no record".into()))
    }

    pub async fn insert_batch(
        &self,
        table: Table,
        rows: Vec<Map<String, Value>>,
    ) -> Result<Vec<String>> {
        let created = self.backend.create_batch(table, rows).await?;
        Ok(created.into_iter().map(|r| r.id).collect())
    }

    pub async fn update(
        &self,
        table: Table,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record> {
        self.backend.update(table, id, patch).await
    }

    pub async fn delete(&self, table: Table, id: &str) -> Result<()> {
        self.backend.delete(table, id).await
    }

    /// Insert-or-update keyed on one field's value.
    pub async fn upsert(
        &self,
        table: Table,
        match_field: &str,
        fields: Map<String, Value>,
    ) -> Result<String> {
        let key = fields
            .get(match_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StoreError::Backend(format!("upsert requires a string {match_field}"))
            })?
            .to_string();

        let query = Query::new()
            .filter(Predicate::eq(match_field, key))
            .limit(1);
        let existing = self.backend.list(table, &query).await?;

        match existing.into_iter().next() {
            Some(record) => {
                self.backend.update(table, &record.id, fields).await?;
                Ok(record.id)
            }
            None => self.insert(table, fields).await,
        }
    }

    // -----------------------------------------------------------------------
    // Articles
    // -----------------------------------------------------------------------

    /// One paginated pass over every known fingerprint, for ingest dedup.
    pub async fn known_fingerprints(&self) -> Result<HashSet<String>> {
        let query = Query::new().fields(&["fingerprint"]);
        let records = self.backend.list(Table::Articles, &query).await?;
        Ok(records
            .iter()
            .map(|r| r.str_field("fingerprint").to_string())
            .filter(|f| !f.is_empty())
            .collect())
    }

    pub async fn insert_articles(&self, articles: &[Article]) -> Result<usize> {
        if articles.is_empty() {
            return Ok(0);
        }
        let rows: Result<Vec<_>> = articles.iter().map(to_map).collect();
        let ids = self.insert_batch(Table::Articles, rows?).await?;
        Ok(ids.len())
    }

    pub async fn articles_needing_scoring(&self) -> Result<Vec<(String, Article)>> {
        let query = Query::new().filter(Predicate::is_true("needs_scoring"));
        let records = self.backend.list(Table::Articles, &query).await?;
        Ok(typed_rows(records))
    }

    /// Clear the scoring flag and set the final fit status.
    pub async fn complete_scoring(&self, article_id: &str, fit: FitStatus) -> Result<()> {
        let mut patch = Map::new();
        patch.insert("needs_scoring".into(), Value::Bool(false));
        patch.insert("fit_status".into(), Value::String(fit.as_str().into()));
        self.backend.update(Table::Articles, article_id, patch).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Selects
    // -----------------------------------------------------------------------

    pub async fn insert_select(&self, select: &Select) -> Result<String> {
        self.insert(Table::Selects, to_map(select)?).await
    }

    /// Selects whose AI processing happened within the lookback window;
    /// the prefilter's gather step.
    pub async fn selects_processed_since(&self, hours: i64) -> Result<Vec<(String, Select)>> {
        let query = Query::new().filter(Predicate::is_after_now_hours("ai_processed_at", hours));
        let records = self.backend.list(Table::Selects, &query).await?;
        Ok(typed_rows(records))
    }

    /// Selects with no usable body; the newsletter-extraction retry set.
    pub async fn selects_missing_raw(&self) -> Result<Vec<(String, Select)>> {
        let query = Query::new().filter(Predicate::or(vec![
            Predicate::empty("raw_body"),
            Predicate::len_lt("raw_body", 100),
        ]));
        let records = self.backend.list(Table::Selects, &query).await?;
        Ok(typed_rows(records))
    }

    /// Paywalled-source Selects processed today whose body is missing or
    /// below the extractor success threshold.
    pub async fn paywalled_selects_needing_retry(
        &self,
        sources: &[&str],
        min_len: u32,
    ) -> Result<Vec<(String, Select)>> {
        let source_preds: Vec<Predicate> = sources
            .iter()
            .map(|s| Predicate::eq("source_name", *s))
            .collect();
        let query = Query::new().filter(Predicate::and(vec![
            Predicate::or(source_preds),
            Predicate::or(vec![
                Predicate::empty("raw_body"),
                Predicate::len_lt("raw_body", min_len),
            ]),
            Predicate::is_same_day_today("ai_processed_at"),
        ]));
        let records = self.backend.list(Table::Selects, &query).await?;
        Ok(typed_rows(records))
    }

    pub async fn select_by_fingerprint(&self, fingerprint: &str) -> Result<Option<(String, Select)>> {
        let query = Query::new()
            .filter(Predicate::eq("fingerprint", fingerprint))
            .limit(1);
        let records = self.backend.list(Table::Selects, &query).await?;
        Ok(typed_rows(records).into_iter().next())
    }

    pub async fn update_select(&self, id: &str, patch: Map<String, Value>) -> Result<()> {
        self.backend.update(Table::Selects, id, patch).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Prefilter
    // -----------------------------------------------------------------------

    pub async fn insert_prefilter_rows(&self, rows: &[PrefilterRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let maps: Result<Vec<_>> = rows.iter().map(to_map).collect();
        let ids = self.insert_batch(Table::Prefilter, maps?).await?;
        Ok(ids.len())
    }

    /// Prefilter rows for a slot within the freshness window, freshest
    /// published first, capped for the selection prompt.
    pub async fn prefilter_candidates(
        &self,
        slot: u8,
        window_hours: i64,
    ) -> Result<Vec<(String, PrefilterRow)>> {
        let query = Query::new()
            .filter(Predicate::and(vec![
                Predicate::eq_num("slot", slot as i64),
                Predicate::is_after_now_hours("published_at", window_hours),
            ]))
            .sort_desc("published_at")
            .limit(SELECTION_CANDIDATE_CAP);
        let records = self.backend.list(Table::Prefilter, &query).await?;
        debug!(slot, window_hours, count = records.len(), "Prefilter candidates loaded");
        Ok(typed_rows(records))
    }

    // -----------------------------------------------------------------------
    // Issues
    // -----------------------------------------------------------------------

    pub async fn create_issue(&self, variant: NewsletterVariant, issue: &Issue) -> Result<String> {
        self.insert(Table::Issues(variant), issue.to_fields()).await
    }

    pub async fn pending_issue(
        &self,
        variant: NewsletterVariant,
    ) -> Result<Option<(String, Issue)>> {
        self.issue_with_status(variant, IssueStatus::Pending).await
    }

    pub async fn decorated_issue(
        &self,
        variant: NewsletterVariant,
    ) -> Result<Option<(String, Issue)>> {
        self.issue_with_status(variant, IssueStatus::Decorated).await
    }

    async fn issue_with_status(
        &self,
        variant: NewsletterVariant,
        status: IssueStatus,
    ) -> Result<Option<(String, Issue)>> {
        let query = Query::new()
            .filter(Predicate::eq("status", status.as_str()))
            .sort_desc("issue_date")
            .limit(1);
        let records = self.backend.list(Table::Issues(variant), &query).await?;
        Ok(records
            .into_iter()
            .next()
            .and_then(|r| Issue::from_fields(variant, &r.fields).map(|i| (r.id, i))))
    }

    pub async fn issue_by_label(
        &self,
        variant: NewsletterVariant,
        label: &str,
    ) -> Result<Option<(String, Issue)>> {
        let query = Query::new()
            .filter(Predicate::eq("issue_id", label))
            .limit(1);
        let records = self.backend.list(Table::Issues(variant), &query).await?;
        Ok(records
            .into_iter()
            .next()
            .and_then(|r| Issue::from_fields(variant, &r.fields).map(|i| (r.id, i))))
    }

    /// Issues of the variant from the last `days` days, any status, newest
    /// first. The 14-day deduplication history.
    pub async fn recent_issues(
        &self,
        variant: NewsletterVariant,
        days: i64,
    ) -> Result<Vec<Issue>> {
        let query = Query::new()
            .filter(Predicate::is_after_today_days("issue_date", days))
            .sort_desc("issue_date");
        let records = self.backend.list(Table::Issues(variant), &query).await?;
        Ok(records
            .iter()
            .filter_map(|r| Issue::from_fields(variant, &r.fields))
            .collect())
    }

    /// Advance an issue's status, rejecting regressions (statuses are
    /// monotonic).
    pub async fn advance_issue_status(
        &self,
        variant: NewsletterVariant,
        id: &str,
        next: IssueStatus,
    ) -> Result<()> {
        let current = self
            .backend
            .get(Table::Issues(variant), id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let current_status: IssueStatus = current
            .str_field("status")
            .parse()
            .unwrap_or(IssueStatus::Pending);

        if !current_status.can_advance_to(next) {
            return Err(StoreError::StatusRegression {
                from: current_status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let mut patch = Map::new();
        patch.insert("status".into(), Value::String(next.as_str().into()));
        self.backend.update(Table::Issues(variant), id, patch).await?;
        Ok(())
    }

    pub async fn update_issue(
        &self,
        variant: NewsletterVariant,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<()> {
        self.backend.update(Table::Issues(variant), id, patch).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // IssueStories
    // -----------------------------------------------------------------------

    pub async fn insert_issue_story(
        &self,
        variant: NewsletterVariant,
        story: &IssueStory,
    ) -> Result<String> {
        self.insert(Table::IssueStories(variant), to_map(story)?).await
    }

    /// Decorated stories for one issue. For Pivot 5 only image-complete
    /// stories compile; Signal has no imagery gate.
    pub async fn stories_for_compile(
        &self,
        variant: NewsletterVariant,
        issue_id: &str,
    ) -> Result<Vec<IssueStory>> {
        let mut parts = vec![Predicate::eq("issue_id", issue_id)];
        if variant == NewsletterVariant::Pivot5 {
            parts.push(Predicate::eq("image_status", ImageStatus::Generated.as_str()));
        }
        let query = Query::new()
            .filter(Predicate::and(parts))
            .sort_asc("slot_order");
        let records = self.backend.list(Table::IssueStories(variant), &query).await?;
        Ok(typed_rows(records).into_iter().map(|(_, s)| s).collect())
    }

    /// Stories awaiting image generation.
    pub async fn stories_needing_images(
        &self,
        variant: NewsletterVariant,
    ) -> Result<Vec<(String, IssueStory)>> {
        let query = Query::new().filter(Predicate::or(vec![
            Predicate::eq("image_status", ImageStatus::Pending.as_str()),
            Predicate::eq("image_status", ImageStatus::NeedsImage.as_str()),
        ]));
        let records = self.backend.list(Table::IssueStories(variant), &query).await?;
        Ok(typed_rows(records))
    }

    pub async fn update_issue_story(
        &self,
        variant: NewsletterVariant,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<()> {
        self.backend
            .update(Table::IssueStories(variant), id, patch)
            .await?;
        Ok(())
    }

    /// Recently decorated stories for the selector's semantic context.
    pub async fn recent_decorated_stories(
        &self,
        variant: NewsletterVariant,
        limit: u32,
    ) -> Result<Vec<IssueStory>> {
        let query = Query::new()
            .filter(Predicate::not_empty("headline"))
            .sort_desc("issue_id")
            .limit(limit);
        let records = self.backend.list(Table::IssueStories(variant), &query).await?;
        Ok(typed_rows(records).into_iter().map(|(_, s)| s).collect())
    }

    // -----------------------------------------------------------------------
    // IssuesFinal
    // -----------------------------------------------------------------------

    pub async fn create_final_issue(&self, final_issue: &FinalIssue) -> Result<String> {
        self.insert(Table::IssuesFinal, to_map(final_issue)?).await
    }

    pub async fn next_send_issue(&self) -> Result<Option<(String, FinalIssue)>> {
        let query = Query::new()
            .filter(Predicate::eq("status", IssueStatus::NextSend.as_str()))
            .limit(1);
        let records = self.backend.list(Table::IssuesFinal, &query).await?;
        Ok(typed_rows(records).into_iter().next())
    }

    pub async fn scheduled_final_issues(&self) -> Result<Vec<(String, FinalIssue)>> {
        let query =
            Query::new().filter(Predicate::eq("status", IssueStatus::Scheduled.as_str()));
        let records = self.backend.list(Table::IssuesFinal, &query).await?;
        Ok(typed_rows(records))
    }

    pub async fn update_final_issue(&self, id: &str, patch: Map<String, Value>) -> Result<()> {
        self.backend.update(Table::IssuesFinal, id, patch).await?;
        Ok(())
    }

    pub async fn delete_final_issue(&self, id: &str) -> Result<()> {
        self.backend.delete(Table::IssuesFinal, id).await
    }

    // -----------------------------------------------------------------------
    // IssuesArchive
    // -----------------------------------------------------------------------

    /// Idempotent archive write keyed on `issue_id`.
    pub async fn upsert_archive(&self, row: &ArchiveRow) -> Result<String> {
        self.upsert(Table::IssuesArchive, "issue_id", to_map(row)?).await
    }

    // -----------------------------------------------------------------------
    // ExecutionLogs
    // -----------------------------------------------------------------------

    /// Persist an execution log row. Failures are logged and swallowed:
    /// audit persistence must never mask the job's own result.
    pub async fn insert_execution_log(&self, fields: Map<String, Value>) {
        if let Err(e) = self.insert(Table::ExecutionLogs, fields).await {
            warn!(error = %e, "Failed to persist execution log");
        }
    }
}

fn to_map<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Backend("entity did not serialize to an object".into())),
    }
}

/// Deserialize each record's field map into a typed row, skipping (and
/// logging) rows that no longer fit the shape.
fn typed_rows<T: DeserializeOwned>(records: Vec<Record>) -> Vec<(String, T)> {
    records
        .into_iter()
        .filter_map(|r| {
            match serde_json::from_value::<T>(Value::Object(r.fields.clone())) {
                Ok(row) => Some((r.id, row)),
                Err(e) => {
                    warn!(record = %r.id, error = %e, "Skipping malformed store row");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use chrono::{Duration, NaiveDate, Utc};
    use pivot_common::types::SlotRef;

    fn store() -> (Store, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (Store::new(backend.clone()), backend)
    }

    fn article(fp: &str) -> Article {
        Article {
            fingerprint: fp.to_string(),
            canonical_url: format!("https://reuters.com/{fp}"),
            title: "Some headline".into(),
            source_name: "Reuters".into(),
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            needs_scoring: true,
            fit_status: FitStatus::Pending,
        }
    }

    #[tokio::test]
    async fn known_fingerprints_round_trip() {
        let (store, _) = store();
        store
            .insert_articles(&[article("p5-aaa"), article("p5-bbb")])
            .await
            .unwrap();

        let known = store.known_fingerprints().await.unwrap();
        assert!(known.contains("p5-aaa"));
        assert!(known.contains("p5-bbb"));
        assert_eq!(known.len(), 2);
    }

    #[tokio::test]
    async fn scoring_flag_clears() {
        let (store, _) = store();
        store.insert_articles(&[article("p5-x")]).await.unwrap();
        let rows = store.articles_needing_scoring().await.unwrap();
        assert_eq!(rows.len(), 1);

        store
            .complete_scoring(&rows[0].0, FitStatus::Scored)
            .await
            .unwrap();
        assert!(store.articles_needing_scoring().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn issue_status_never_regresses() {
        let (store, _) = store();
        let mut issue = Issue::new(
            "Pivot 5 - Jan 02".into(),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        );
        issue.slots.push(SlotRef {
            key: "slot_1".into(),
            fingerprint: "p5-a".into(),
            headline: "H".into(),
            story_id: "rec1".into(),
        });
        let id = store
            .create_issue(NewsletterVariant::Pivot5, &issue)
            .await
            .unwrap();

        store
            .advance_issue_status(NewsletterVariant::Pivot5, &id, IssueStatus::Decorated)
            .await
            .unwrap();
        store
            .advance_issue_status(NewsletterVariant::Pivot5, &id, IssueStatus::Compiled)
            .await
            .unwrap();

        let err = store
            .advance_issue_status(NewsletterVariant::Pivot5, &id, IssueStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StatusRegression { .. }));
    }

    #[tokio::test]
    async fn recent_issues_respects_window() {
        let (store, _) = store();
        let today = Utc::now().date_naive();
        for (label, days_ago) in [("fresh", 3i64), ("stale", 20i64)] {
            let issue = Issue::new(
                format!("Pivot 5 - {label}"),
                today - Duration::days(days_ago),
            );
            store
                .create_issue(NewsletterVariant::Pivot5, &issue)
                .await
                .unwrap();
        }

        let recent = store
            .recent_issues(NewsletterVariant::Pivot5, 14)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].issue_id, "Pivot 5 - fresh");
    }

    #[tokio::test]
    async fn archive_upsert_is_idempotent() {
        let (store, backend) = store();
        let row = ArchiveRow {
            issue_id: "Pivot 5 - Jan 02".into(),
            newsletter_id: "pivot_ai".into(),
            send_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            sent_at: None,
            subject_line: "Subject".into(),
            status: IssueStatus::Failed,
            html: "<html></html>".into(),
            summary: String::new(),
            gateway_sent_count: 0,
            gateway_failed_recipients: 0,
            gateway_send_status: "error".into(),
            gateway_response_raw: "{}".into(),
        };

        let first = store.upsert_archive(&row).await.unwrap();
        let mut updated = row.clone();
        updated.status = IssueStatus::Sent;
        updated.gateway_sent_count = 41250;
        let second = store.upsert_archive(&updated).await.unwrap();

        assert_eq!(first, second);
        let rows = backend.dump(Table::IssuesArchive).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str_field("status"), "sent");
    }

    #[tokio::test]
    async fn prefilter_candidates_filter_by_slot_and_window() {
        let (store, _) = store();
        let now = Utc::now();
        let rows = vec![
            PrefilterRow {
                fingerprint: "p5-fresh".into(),
                article_id: "rec1".into(),
                headline: "Fresh".into(),
                canonical_url: "https://reuters.com/fresh".into(),
                source_name: "Reuters".into(),
                slot: 1,
                prefiltered_at: now,
                published_at: Some(now - Duration::hours(2)),
            },
            PrefilterRow {
                fingerprint: "p5-stale".into(),
                article_id: "rec2".into(),
                headline: "Stale".into(),
                canonical_url: "https://reuters.com/stale".into(),
                source_name: "Reuters".into(),
                slot: 1,
                prefiltered_at: now,
                published_at: Some(now - Duration::hours(70)),
            },
            PrefilterRow {
                fingerprint: "p5-other".into(),
                article_id: "rec3".into(),
                headline: "Other slot".into(),
                canonical_url: "https://reuters.com/other".into(),
                source_name: "Reuters".into(),
                slot: 2,
                prefiltered_at: now,
                published_at: Some(now - Duration::hours(2)),
            },
        ];
        store.insert_prefilter_rows(&rows).await.unwrap();

        let candidates = store.prefilter_candidates(1, 24).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].1.fingerprint, "p5-fresh");
    }
}
