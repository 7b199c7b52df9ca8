//! Execution log — one record per job invocation, accumulated in memory and
//! persisted on completion. Persistence failure never masks the job's own
//! result.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use pivot_store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct LogEntry {
    timestamp: DateTime<Utc>,
    level: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

pub struct ExecutionLogger {
    pub run_id: String,
    step_id: u8,
    job_type: String,
    slot: Option<u8>,
    started_at: DateTime<Utc>,
    entries: Vec<LogEntry>,
    summary: Map<String, Value>,
}

impl ExecutionLogger {
    pub fn new(step_id: u8, job_type: &str) -> Self {
        let mut logger = Self {
            run_id: Uuid::new_v4().to_string(),
            step_id,
            job_type: job_type.to_string(),
            slot: None,
            started_at: Utc::now(),
            entries: Vec::new(),
            summary: Map::new(),
        };
        logger.info(format!(
            "Starting {} job (run_id: {}...)",
            logger.job_type,
            &logger.run_id[..8]
        ));
        logger
    }

    pub fn with_slot(mut self, slot: u8) -> Self {
        self.slot = Some(slot);
        self
    }

    fn log(&mut self, level: &'static str, message: String, metadata: Option<Value>) {
        match level {
            "error" => error!(job = %self.job_type, slot = ?self.slot, "{message}"),
            "warn" => warn!(job = %self.job_type, slot = ?self.slot, "{message}"),
            _ => info!(job = %self.job_type, slot = ?self.slot, "{message}"),
        }
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            metadata,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log("info", message.into(), None);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log("warn", message.into(), None);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log("error", message.into(), None);
    }

    pub fn info_with(&mut self, message: impl Into<String>, metadata: Value) {
        self.log("info", message.into(), Some(metadata));
    }

    pub fn set_summary(&mut self, key: &str, value: impl Into<Value>) {
        self.summary.insert(key.to_string(), value.into());
    }

    /// Finish the run and persist the record. A store failure here is logged
    /// and swallowed.
    pub async fn complete(mut self, store: &Store, status: RunStatus, error_message: Option<&str>) {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - self.started_at).num_milliseconds();

        match status {
            RunStatus::Success => self.info(format!(
                "Completed {} job in {duration_ms}ms",
                self.job_type
            )),
            RunStatus::Error => self.error(format!(
                "Failed {} job: {}",
                self.job_type,
                error_message.unwrap_or("unknown error")
            )),
        }

        let mut fields = Map::new();
        fields.insert("run_id".into(), Value::String(self.run_id.clone()));
        fields.insert("step_id".into(), Value::from(self.step_id));
        fields.insert("job_type".into(), Value::String(self.job_type.clone()));
        if let Some(slot) = self.slot {
            fields.insert("slot".into(), Value::from(slot));
        }
        fields.insert(
            "started_at".into(),
            Value::String(self.started_at.to_rfc3339()),
        );
        fields.insert(
            "completed_at".into(),
            Value::String(completed_at.to_rfc3339()),
        );
        fields.insert("duration_ms".into(), Value::from(duration_ms));
        fields.insert("status".into(), Value::String(status.as_str().into()));
        fields.insert(
            "summary".into(),
            Value::String(serde_json::to_string(&self.summary).unwrap_or_default()),
        );
        fields.insert(
            "log_entries".into(),
            Value::String(serde_json::to_string(&self.entries).unwrap_or_default()),
        );
        if let Some(message) = error_message {
            // Callers pass the full error chain; the first line is the
            // headline message, the whole thing is the stack.
            let headline = message.lines().next().unwrap_or(message);
            fields.insert("error_message".into(), Value::String(headline.to_string()));
            fields.insert("error_stack".into(), Value::String(message.to_string()));
        }

        store.insert_execution_log(fields).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pivot_store::{MemoryBackend, Table};
    use std::sync::Arc;

    #[tokio::test]
    async fn persists_entries_and_summary() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Store::new(backend.clone());

        let mut logger = ExecutionLogger::new(1, "pre_filter").with_slot(3);
        logger.info("classifying batch");
        logger.set_summary("eligible", 12);
        logger.complete(&store, RunStatus::Success, None).await;

        let rows = backend.dump(Table::ExecutionLogs).await;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.str_field("job_type"), "pre_filter");
        assert_eq!(row.str_field("status"), "success");
        assert!(row.str_field("summary").contains("\"eligible\":12"));
        assert!(row.str_field("log_entries").contains("classifying batch"));
    }

    #[tokio::test]
    async fn records_error_status_and_message() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Store::new(backend.clone());

        let logger = ExecutionLogger::new(2, "slot_selection");
        logger
            .complete(&store, RunStatus::Error, Some("no candidates"))
            .await;

        let rows = backend.dump(Table::ExecutionLogs).await;
        assert_eq!(rows[0].str_field("status"), "error");
        assert_eq!(rows[0].str_field("error_message"), "no candidates");
    }
}
