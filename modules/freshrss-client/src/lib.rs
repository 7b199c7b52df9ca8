pub mod error;

pub use error::{FreshRssError, Result};

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One item from the reading list stream.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamContents {
    #[serde(default)]
    items: Vec<StreamItem>,
}

#[derive(Debug, Deserialize)]
struct StreamItem {
    #[serde(default)]
    title: String,
    published: Option<i64>,
    #[serde(default)]
    canonical: Vec<Href>,
    #[serde(default)]
    alternate: Vec<Href>,
    origin: Option<Origin>,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Origin {
    title: Option<String>,
}

/// FreshRSS client over the Google Reader compatible API.
pub struct FreshRssClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    api_password: String,
    // ClientLogin token, fetched lazily and reused for the process lifetime.
    auth_token: Mutex<Option<String>>,
}

impl FreshRssClient {
    pub fn new(base_url: &str, username: &str, api_password: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            api_password: api_password.to_string(),
            auth_token: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String> {
        let mut guard = self.auth_token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let url = format!("{}/api/greader.php/accounts/ClientLogin", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[("Email", &self.username), ("Passwd", &self.api_password)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FreshRssError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let token = body
            .lines()
            .find_map(|line| line.strip_prefix("Auth="))
            .map(str::to_string)
            .ok_or(FreshRssError::Auth)?;

        debug!("FreshRSS ClientLogin succeeded");
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Fire an upstream feed refresh. Failures here are logged and surfaced,
    /// but callers treat them as non-fatal: the reading list still serves
    /// whatever was last crawled.
    pub async fn trigger_refresh(&self) -> Result<()> {
        let token = self.token().await?;
        let url = format!("{}/i/?c=feed&a=actualize&ajax=1", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("GoogleLogin auth={token}"))
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "FreshRSS refresh returned non-success");
        } else {
            info!("FreshRSS refresh triggered");
        }
        Ok(())
    }

    /// Fetch up to `limit` reading-list items published within the last
    /// `since_hours` hours.
    pub async fn articles(&self, limit: u32, since_hours: u32) -> Result<Vec<FeedItem>> {
        let token = self.token().await?;
        let cutoff = Utc::now().timestamp() - (since_hours as i64) * 3600;
        let url = format!(
            "{}/api/greader.php/reader/api/0/stream/contents/reading-list",
            self.base_url
        );

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("GoogleLogin auth={token}"))
            .query(&[
                ("n", limit.to_string()),
                ("ot", cutoff.to_string()),
                ("output", "json".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FreshRssError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let contents: StreamContents = response
            .json()
            .await
            .map_err(|e| FreshRssError::Parse(e.to_string()))?;

        let items: Vec<FeedItem> = contents
            .items
            .into_iter()
            .filter_map(|item| {
                let url = item
                    .canonical
                    .first()
                    .or(item.alternate.first())
                    .map(|h| h.href.clone())?;
                let published_at = item
                    .published
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
                Some(FeedItem {
                    url,
                    title: item.title,
                    published_at,
                    source_id: item.origin.and_then(|o| o.title),
                })
            })
            .collect();

        info!(count = items.len(), since_hours, "Fetched reading list");
        Ok(items)
    }
}
