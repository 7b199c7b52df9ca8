//! Airtable-backed implementation of `TableBackend`. Predicates compile to
//! filter formulas here and nowhere else.

use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use serde_json::{Map, Value};

use airtable_client::{AirtableClient, ApiRecord, ListQuery};
use pivot_common::types::NewsletterVariant;
use pivot_common::Config;

use crate::backend::{Query, SortOrder, StoreError, Table, TableBackend};
use crate::record::Record;

pub struct AirtableBackend {
    client: AirtableClient,
    tables: HashMap<&'static str, (String, String)>,
}

impl AirtableBackend {
    pub fn new(config: &Config) -> Self {
        let client = AirtableClient::new(&config.airtable_api_key);

        let editor = config.editor_base_id.clone();
        let signal = config.signal_base_id.clone();

        let mut tables = HashMap::new();
        tables.insert(
            Table::Articles.key(),
            (editor.clone(), table_env("ARTICLES_TABLE", "tblArticles")),
        );
        tables.insert(
            Table::Selects.key(),
            (editor.clone(), table_env("SELECTS_TABLE", "tblSelects")),
        );
        tables.insert(
            Table::Prefilter.key(),
            (editor.clone(), table_env("PREFILTER_TABLE", "tblPrefilter")),
        );
        tables.insert(
            Table::Issues(NewsletterVariant::Pivot5).key(),
            (editor.clone(), table_env("ISSUES_TABLE", "tblIssues")),
        );
        tables.insert(
            Table::Issues(NewsletterVariant::Signal).key(),
            (
                signal.clone(),
                table_env("SIGNAL_ISSUES_TABLE", "tblSignalIssues"),
            ),
        );
        tables.insert(
            Table::IssueStories(NewsletterVariant::Pivot5).key(),
            (
                editor.clone(),
                table_env("ISSUE_STORIES_TABLE", "tblIssueStories"),
            ),
        );
        tables.insert(
            Table::IssueStories(NewsletterVariant::Signal).key(),
            (
                signal,
                table_env("SIGNAL_ISSUE_STORIES_TABLE", "tblSignalStories"),
            ),
        );
        tables.insert(
            Table::IssuesFinal.key(),
            (editor.clone(), table_env("ISSUES_FINAL_TABLE", "tblIssuesFinal")),
        );
        tables.insert(
            Table::IssuesArchive.key(),
            (
                editor.clone(),
                table_env("ISSUES_ARCHIVE_TABLE", "tblIssuesArchive"),
            ),
        );
        tables.insert(
            Table::ExecutionLogs.key(),
            (editor, table_env("EXECUTION_LOGS_TABLE", "tblExecutionLogs")),
        );

        Self { client, tables }
    }

    fn resolve(&self, table: Table) -> Result<(&str, &str), StoreError> {
        self.tables
            .get(table.key())
            .map(|(base, tbl)| (base.as_str(), tbl.as_str()))
            .ok_or_else(|| StoreError::Backend(format!("unmapped table: {}", table.key())))
    }

    fn compile(query: &Query) -> ListQuery {
        let mut list = ListQuery::new();
        if let Some(predicate) = &query.predicate {
            list = list.formula(predicate.to_formula());
        }
        for (field, order) in &query.sort {
            list = match order {
                SortOrder::Asc => list.sort_asc(field.clone()),
                SortOrder::Desc => list.sort_desc(field.clone()),
            };
        }
        if !query.fields.is_empty() {
            let refs: Vec<&str> = query.fields.iter().map(String::as_str).collect();
            list = list.fields(&refs);
        }
        if let Some(max) = query.max_records {
            list = list.max_records(max);
        }
        list
    }
}

fn table_env(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn to_record(api: ApiRecord) -> Record {
    Record::new(api.id, api.fields)
}

#[async_trait]
impl TableBackend for AirtableBackend {
    async fn list(&self, table: Table, query: &Query) -> Result<Vec<Record>, StoreError> {
        let (base, tbl) = self.resolve(table)?;
        let list_query = Self::compile(query);
        let records = self.client.list_all(base, tbl, &list_query).await?;
        Ok(records.into_iter().map(to_record).collect())
    }

    async fn get(&self, table: Table, id: &str) -> Result<Option<Record>, StoreError> {
        let (base, tbl) = self.resolve(table)?;
        Ok(self.client.get(base, tbl, id).await?.map(to_record))
    }

    async fn create_batch(
        &self,
        table: Table,
        rows: Vec<Map<String, Value>>,
    ) -> Result<Vec<Record>, StoreError> {
        let (base, tbl) = self.resolve(table)?;
        let created = self.client.create_batch(base, tbl, rows).await?;
        Ok(created.into_iter().map(to_record).collect())
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        let (base, tbl) = self.resolve(table)?;
        Ok(to_record(self.client.update(base, tbl, id, patch).await?))
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), StoreError> {
        let (base, tbl) = self.resolve(table)?;
        Ok(self.client.delete(base, tbl, id).await?)
    }
}
