use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use pivot_common::types::NewsletterVariant;

use crate::predicate::Predicate;
use crate::record::Record;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    StatusRegression { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<airtable_client::AirtableError> for StoreError {
    fn from(e: airtable_client::AirtableError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Logical tables. Issues and IssueStories are per newsletter variant;
/// everything else is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Articles,
    Selects,
    Prefilter,
    Issues(NewsletterVariant),
    IssueStories(NewsletterVariant),
    IssuesFinal,
    IssuesArchive,
    ExecutionLogs,
}

impl Table {
    /// Stable key for backends that index tables by name.
    pub fn key(&self) -> &'static str {
        match self {
            Table::Articles => "articles",
            Table::Selects => "selects",
            Table::Prefilter => "prefilter",
            Table::Issues(NewsletterVariant::Pivot5) => "issues_pivot5",
            Table::Issues(NewsletterVariant::Signal) => "issues_signal",
            Table::IssueStories(NewsletterVariant::Pivot5) => "issue_stories_pivot5",
            Table::IssueStories(NewsletterVariant::Signal) => "issue_stories_signal",
            Table::IssuesFinal => "issues_final",
            Table::IssuesArchive => "issues_archive",
            Table::ExecutionLogs => "execution_logs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A list query: optional predicate, sort, field projection, row cap.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub predicate: Option<Predicate>,
    pub sort: Vec<(String, SortOrder)>,
    pub fields: Vec<String>,
    pub max_records: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn sort_desc(mut self, field: &str) -> Self {
        self.sort.push((field.to_string(), SortOrder::Desc));
        self
    }

    pub fn sort_asc(mut self, field: &str) -> Self {
        self.sort.push((field.to_string(), SortOrder::Asc));
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn limit(mut self, max: u32) -> Self {
        self.max_records = Some(max);
        self
    }
}

/// Record-level access to one backend. The facade in `store.rs` builds all
/// typed operations on top of this.
#[async_trait]
pub trait TableBackend: Send + Sync {
    async fn list(&self, table: Table, query: &Query) -> Result<Vec<Record>, StoreError>;
    async fn get(&self, table: Table, id: &str) -> Result<Option<Record>, StoreError>;
    async fn create_batch(
        &self,
        table: Table,
        rows: Vec<Map<String, Value>>,
    ) -> Result<Vec<Record>, StoreError>;
    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, StoreError>;
    async fn delete(&self, table: Table, id: &str) -> Result<(), StoreError>;
}
