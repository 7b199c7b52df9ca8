pub mod error;
pub mod types;

pub use error::{AirtableError, Result};
pub use types::{ApiRecord, ListQuery, RecordPage, SortDirection};

use std::time::Duration;

use rand::Rng;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use types::{CreatePayload, CreateRecord, RecordList, UpdatePayload};

const BASE_URL: &str = "https://api.airtable.com/v0";

/// Airtable caps list pages at 100 records.
pub const PAGE_SIZE: u32 = 100;

/// Airtable caps writes at 10 records per request.
pub const MAX_RECORDS_PER_WRITE: usize = 10;

/// Max retry attempts for transient failures (5xx, timeouts, 429).
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff for transient errors. Rate limits wait 5x this base.
const RETRY_BASE: Duration = Duration::from_secs(2);

pub struct AirtableClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AirtableClient {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn table_url(&self, base_id: &str, table_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, base_id, table_id)
    }

    /// Fetch a single page of records. Pass the previous page's `offset` to
    /// continue a scan.
    pub async fn list_page(
        &self,
        base_id: &str,
        table_id: &str,
        query: &ListQuery,
        offset: Option<&str>,
    ) -> Result<RecordPage> {
        let url = self.table_url(base_id, table_id);

        let mut params: Vec<(String, String)> = Vec::new();
        params.push((
            "pageSize".into(),
            query.page_size.unwrap_or(PAGE_SIZE).to_string(),
        ));
        if let Some(formula) = &query.formula {
            params.push(("filterByFormula".into(), formula.clone()));
        }
        for (i, (field, dir)) in query.sort.iter().enumerate() {
            params.push((format!("sort[{i}][field]"), field.clone()));
            params.push((format!("sort[{i}][direction]"), dir.as_str().to_string()));
        }
        for field in &query.fields {
            params.push(("fields[]".into(), field.clone()));
        }
        if let Some(max) = query.max_records {
            params.push(("maxRecords".into(), max.to_string()));
        }
        if let Some(offset) = offset {
            params.push(("offset".into(), offset.to_string()));
        }

        let body = self
            .send_with_retry(|| {
                self.client
                    .get(&url)
                    .bearer_auth(&self.api_key)
                    .query(&params)
            })
            .await?;

        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch all records matching the query, following the offset cursor.
    pub async fn list_all(
        &self,
        base_id: &str,
        table_id: &str,
        query: &ListQuery,
    ) -> Result<Vec<ApiRecord>> {
        let mut all = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = self
                .list_page(base_id, table_id, query, offset.as_deref())
                .await?;
            all.extend(page.records);

            if let Some(max) = query.max_records {
                if all.len() >= max as usize {
                    all.truncate(max as usize);
                    break;
                }
            }

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!(table = table_id, count = all.len(), "Airtable list complete");
        Ok(all)
    }

    pub async fn get(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
    ) -> Result<Option<ApiRecord>> {
        let url = format!("{}/{}", self.table_url(base_id, table_id), record_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AirtableError::from_status(status.as_u16(), text));
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Create records in chunks of `MAX_RECORDS_PER_WRITE`. Returns the
    /// created records in input order.
    pub async fn create_batch(
        &self,
        base_id: &str,
        table_id: &str,
        rows: Vec<Map<String, Value>>,
    ) -> Result<Vec<ApiRecord>> {
        let url = self.table_url(base_id, table_id);
        let mut created = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(MAX_RECORDS_PER_WRITE) {
            let payload = CreatePayload {
                records: chunk
                    .iter()
                    .map(|fields| CreateRecord {
                        fields: fields.clone(),
                    })
                    .collect(),
            };

            let body = self
                .send_with_retry(|| {
                    self.client
                        .post(&url)
                        .bearer_auth(&self.api_key)
                        .json(&payload)
                })
                .await?;

            let list: RecordList = serde_json::from_str(&body)?;
            created.extend(list.records);
        }

        debug!(table = table_id, count = created.len(), "Airtable create complete");
        Ok(created)
    }

    pub async fn update(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<ApiRecord> {
        let url = format!("{}/{}", self.table_url(base_id, table_id), record_id);
        let payload = UpdatePayload { fields };

        let body = self
            .send_with_retry(|| {
                self.client
                    .patch(&url)
                    .bearer_auth(&self.api_key)
                    .json(&payload)
            })
            .await?;

        Ok(serde_json::from_str(&body)?)
    }

    pub async fn delete(&self, base_id: &str, table_id: &str, record_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.table_url(base_id, table_id), record_id);
        self.send_with_retry(|| self.client.delete(&url).bearer_auth(&self.api_key))
            .await?;
        Ok(())
    }

    /// Send a request with up to MAX_ATTEMPTS tries. 5xx and connection
    /// failures back off at RETRY_BASE * 2^attempt; 429 waits 5x longer.
    async fn send_with_retry<F>(&self, build: F) -> Result<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            let result = async {
                let resp = build().send().await?;
                let status = resp.status();
                let text = resp.text().await?;
                if !status.is_success() {
                    return Err(AirtableError::from_status(status.as_u16(), text));
                }
                Ok(text)
            }
            .await;

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let base = if e.is_rate_limited() {
                        RETRY_BASE * 5
                    } else {
                        RETRY_BASE
                    };
                    let backoff = base * 2u32.pow(attempt);
                    let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                    warn!(
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "Airtable request failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff + jitter).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(AirtableError::Api {
            status: 0,
            message: "retry loop exhausted".into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_taxonomy_from_status() {
        assert!(matches!(
            AirtableError::from_status(401, String::new()),
            AirtableError::Auth
        ));
        assert!(matches!(
            AirtableError::from_status(429, String::new()),
            AirtableError::RateLimited { .. }
        ));
        assert!(matches!(
            AirtableError::from_status(422, String::new()),
            AirtableError::InvalidInput(_)
        ));
        assert!(matches!(
            AirtableError::from_status(500, String::new()),
            AirtableError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn retryable_classification() {
        assert!(AirtableError::from_status(503, String::new()).is_retryable());
        assert!(AirtableError::from_status(429, String::new()).is_retryable());
        assert!(!AirtableError::from_status(401, String::new()).is_retryable());
        assert!(!AirtableError::from_status(422, String::new()).is_retryable());
    }

    #[test]
    fn list_query_builder() {
        let q = ListQuery::new()
            .formula("{status}='pending'")
            .sort_desc("issue_date")
            .fields(&["issue_id", "status"])
            .max_records(1);
        assert_eq!(q.formula.as_deref(), Some("{status}='pending'"));
        assert_eq!(q.sort.len(), 1);
        assert_eq!(q.fields.len(), 2);
        assert_eq!(q.max_records, Some(1));
    }
}
