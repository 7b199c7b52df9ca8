pub mod error;
pub mod types;

pub use error::{MauticError, Result};
pub use types::{Email, EmailStats, NewEmail, SendOutcome};

use std::time::Duration;

use base64::Engine;
use tracing::{info, warn};

use types::{EmailEnvelope, SendResponse};

/// Retry attempts for transient gateway failures (5xx, timeouts, 429).
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(2);

pub struct MauticClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
    transport_id: Option<String>,
}

impl MauticClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        let credentials = format!("{username}:{password}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {encoded}"),
            transport_id: None,
        }
    }

    pub fn with_transport(mut self, transport_id: &str) -> Self {
        self.transport_id = Some(transport_id.to_string());
        self
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.base_url, endpoint)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
        params: &[(&str, String)],
    ) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            let mut builder = self
                .http
                .request(method.clone(), self.api_url(endpoint))
                .header("Authorization", &self.auth_header)
                .header("Content-Type", "application/json")
                .query(params);

            if let Some(body) = &body {
                builder = builder.json(body);
            }

            let result = async {
                let response = builder.send().await?;
                let status = response.status();
                let text = response.text().await?;

                if status.as_u16() == 401 || status.as_u16() == 403 {
                    return Err(MauticError::Auth);
                }
                if !status.is_success() {
                    return Err(MauticError::Api {
                        status: status.as_u16(),
                        message: text.chars().take(500).collect(),
                    });
                }
                Ok(text)
            }
            .await;

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let backoff = RETRY_BASE * 2u32.pow(attempt);
                    warn!(
                        endpoint,
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "Mautic request failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(MauticError::Api {
            status: 0,
            message: "retry loop exhausted".into(),
        }))
    }

    /// Create a new email campaign. Returns the gateway email id.
    pub async fn create_email(&self, email: &NewEmail) -> Result<Email> {
        let body = serde_json::to_value(email)?;
        let text = self
            .request(reqwest::Method::POST, "emails/new", Some(body), &[])
            .await?;
        let envelope: EmailEnvelope = serde_json::from_str(&text)?;
        info!(email_id = envelope.email.id, "Mautic email created");
        Ok(envelope.email)
    }

    /// Attach the configured delivery transport to an email. Missing
    /// transport configuration is not an error; delivery falls back to the
    /// gateway default.
    pub async fn attach_transport(&self, email_id: i64) -> Result<bool> {
        let Some(transport_id) = &self.transport_id else {
            warn!("No transport configured, using gateway default");
            return Ok(false);
        };

        let body = serde_json::json!({ "transport_id": transport_id });
        self.request(
            reqwest::Method::POST,
            &format!("emails/{email_id}/transport"),
            Some(body),
            &[],
        )
        .await?;
        Ok(true)
    }

    /// Send an email to a segment (or the email's default lists).
    pub async fn send_email(&self, email_id: i64, segment_id: Option<i64>) -> Result<SendOutcome> {
        let mut params = Vec::new();
        if let Some(segment_id) = segment_id {
            params.push(("listId", segment_id.to_string()));
        }

        let text = self
            .request(
                reqwest::Method::POST,
                &format!("emails/{email_id}/send"),
                None,
                &params,
            )
            .await?;

        let parsed: SendResponse = serde_json::from_str(&text).unwrap_or(SendResponse {
            sent_count: 0,
            failed_recipients: 0,
        });

        info!(
            email_id,
            sent = parsed.sent_count,
            failed = parsed.failed_recipients,
            "Mautic send complete"
        );

        Ok(SendOutcome {
            sent_count: parsed.sent_count,
            failed_recipients: parsed.failed_recipients,
            raw_response: text,
        })
    }

    pub async fn email_stats(&self, email_id: i64) -> Result<EmailStats> {
        let text = self
            .request(reqwest::Method::GET, &format!("emails/{email_id}"), None, &[])
            .await?;
        let envelope: EmailEnvelope = serde_json::from_str(&text)?;
        let email = envelope.email;

        Ok(EmailStats {
            sent_count: email.sent_count,
            read_count: email.read_count,
            click_count: email.click_count,
            unsubscribe_count: email.unsubscribe_count,
            bounce_count: email.bounce_count,
        })
    }
}
