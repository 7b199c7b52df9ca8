//! In-memory `TableBackend` for tests. Evaluates predicates structurally,
//! so store queries run without a live backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::backend::{Query, SortOrder, StoreError, Table, TableBackend};
use crate::record::Record;

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<&'static str, Vec<Record>>>,
    counter: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("rec{:06}", n + 1)
    }

    /// Test hook: all rows of a table, insertion order.
    pub async fn dump(&self, table: Table) -> Vec<Record> {
        self.tables
            .lock()
            .await
            .get(table.key())
            .cloned()
            .unwrap_or_default()
    }

    /// Test hook: seed a row with a chosen id.
    pub async fn seed(&self, table: Table, id: &str, fields: Map<String, Value>) {
        self.tables
            .lock()
            .await
            .entry(table.key())
            .or_default()
            .push(Record::new(id, fields));
    }
}

fn sort_key(record: &Record, field: &str) -> String {
    match record.fields.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => format!("{:020}", n.as_i64().unwrap_or(0)),
        _ => String::new(),
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn list(&self, table: Table, query: &Query) -> Result<Vec<Record>, StoreError> {
        let now = Utc::now();
        let tables = self.tables.lock().await;
        let mut rows: Vec<Record> = tables
            .get(table.key())
            .map(|rows| {
                rows.iter()
                    .filter(|r| {
                        query
                            .predicate
                            .as_ref()
                            .map(|p| p.matches(&r.fields, now))
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for (field, order) in query.sort.iter().rev() {
            rows.sort_by(|a, b| {
                let cmp = sort_key(a, field).cmp(&sort_key(b, field));
                match order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                }
            });
        }

        if let Some(max) = query.max_records {
            rows.truncate(max as usize);
        }

        Ok(rows)
    }

    async fn get(&self, table: Table, id: &str) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(table.key())
            .and_then(|rows| rows.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn create_batch(
        &self,
        table: Table,
        rows: Vec<Map<String, Value>>,
    ) -> Result<Vec<Record>, StoreError> {
        let mut tables = self.tables.lock().await;
        let entry = tables.entry(table.key()).or_default();
        let mut created = Vec::with_capacity(rows.len());
        for fields in rows {
            let record = Record::new(self.next_id(), fields);
            entry.push(record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        let mut tables = self.tables.lock().await;
        let rows = tables
            .get_mut(table.key())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let record = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        // Patch semantics: named fields replaced, everything else untouched.
        for (key, value) in patch {
            record.fields.insert(key, value);
        }
        Ok(record.clone())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(rows) = tables.get_mut(table.key()) {
            rows.retain(|r| r.id != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Predicate;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn create_filter_sort_and_cap() {
        let backend = MemoryBackend::new();
        for (slot, published) in [(1, "2026-01-02T10:00:00Z"), (2, "2026-01-02T11:00:00Z"), (1, "2026-01-02T12:00:00Z")] {
            backend
                .create_batch(
                    Table::Prefilter,
                    vec![fields(json!({"slot": slot, "published_at": published}))],
                )
                .await
                .unwrap();
        }

        let query = Query::new()
            .filter(Predicate::eq_num("slot", 1))
            .sort_desc("published_at")
            .limit(5);
        let rows = backend.list(Table::Prefilter, &query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].str_field("published_at"), "2026-01-02T12:00:00Z");
    }

    #[tokio::test]
    async fn update_is_a_patch() {
        let backend = MemoryBackend::new();
        let created = backend
            .create_batch(
                Table::Selects,
                vec![fields(json!({"fingerprint": "p5-a", "raw_body": "x", "mystery_field": 42}))],
            )
            .await
            .unwrap();

        let id = created[0].id.clone();
        backend
            .update(Table::Selects, &id, fields(json!({"raw_body": "longer text"})))
            .await
            .unwrap();

        let row = backend.get(Table::Selects, &id).await.unwrap().unwrap();
        assert_eq!(row.str_field("raw_body"), "longer text");
        // Unknown fields survive updates.
        assert_eq!(row.fields["mystery_field"], 42);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let backend = MemoryBackend::new();
        let created = backend
            .create_batch(Table::IssuesFinal, vec![fields(json!({"issue_id": "X"}))])
            .await
            .unwrap();
        backend
            .delete(Table::IssuesFinal, &created[0].id)
            .await
            .unwrap();
        assert!(backend
            .get(Table::IssuesFinal, &created[0].id)
            .await
            .unwrap()
            .is_none());
    }
}
