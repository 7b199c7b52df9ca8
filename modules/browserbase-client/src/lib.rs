pub mod error;
mod readability;

pub use error::{BrowserbaseError, Result};

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const API_URL: &str = "https://api.browserbase.com/v1";

/// Where cached per-site auth context ids live. Ephemeral scratch; losing it
/// only costs a fresh login context.
const CONTEXT_CACHE: &str = "/tmp/browserbase_contexts.json";

/// Outcome of one scrape attempt. `content` is Readability markdown of the
/// rendered DOM.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub success: bool,
    pub content: String,
    pub content_length: usize,
    pub session_replay: String,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest<'a> {
    project_id: &'a str,
    browser_settings: BrowserSettings,
    proxies: Vec<Proxy>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrowserSettings {
    solve_captchas: bool,
    block_ads: bool,
    viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<ContextRef>,
}

#[derive(Debug, Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
struct ContextRef {
    id: String,
    persist: bool,
}

#[derive(Debug, Serialize)]
struct Proxy {
    #[serde(rename = "type")]
    kind: &'static str,
    geolocation: Geolocation,
}

#[derive(Debug, Serialize)]
struct Geolocation {
    country: &'static str,
    state: &'static str,
    city: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    id: String,
    connect_url: String,
}

#[derive(Debug, Deserialize)]
struct ContextResponse {
    id: String,
}

/// Client for the Browserbase cloud browser. Used only for the configured
/// paywalled sources, with stealth settings and persistent auth contexts.
pub struct BrowserbaseClient {
    http: reqwest::Client,
    api_key: String,
    project_id: String,
    base_url: String,
    context_cache: PathBuf,
}

impl BrowserbaseClient {
    pub fn new(api_key: &str, project_id: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            api_key: api_key.to_string(),
            project_id: project_id.to_string(),
            base_url: API_URL.to_string(),
            context_cache: PathBuf::from(CONTEXT_CACHE),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_context_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.context_cache = path.into();
        self
    }

    /// Scrape a URL through a fresh stealth session, reusing a cached auth
    /// context for the site when one exists. Never returns Err for content
    /// failures; those surface as `success = false` with an error message.
    pub async fn scrape(&self, url: &str) -> Result<ScrapeResult> {
        let site_key = site_key_for(url);
        let session = self.create_session(site_key.as_deref()).await?;
        let replay_url = format!("https://browserbase.com/sessions/{}", session.id);

        info!(url, session = %session.id, "Browserbase scrape starting");

        // The session's connect endpoint serves rendered page content.
        let content_url = format!("{}/content", session.connect_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&content_url)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await;

        let html = match response {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(resp) => {
                let status = resp.status();
                let message = resp.text().await.unwrap_or_default();
                warn!(url, status = %status, "Browserbase content fetch failed");
                return Ok(ScrapeResult {
                    success: false,
                    content: String::new(),
                    content_length: 0,
                    session_replay: replay_url,
                    error: Some(format!("content fetch failed ({status}): {message}")),
                });
            }
            Err(e) => {
                warn!(url, error = %e, "Browserbase content fetch errored");
                return Ok(ScrapeResult {
                    success: false,
                    content: String::new(),
                    content_length: 0,
                    session_replay: replay_url,
                    error: Some(e.to_string()),
                });
            }
        };

        let markdown = readability::html_to_markdown(html.as_bytes(), Some(url));
        let content_length = markdown.len();

        info!(url, content_length, "Browserbase scrape complete");
        Ok(ScrapeResult {
            success: !markdown.is_empty(),
            content: markdown,
            content_length,
            session_replay: replay_url,
            error: None,
        })
    }

    async fn create_session(&self, site_key: Option<&str>) -> Result<SessionResponse> {
        let context = site_key.and_then(|key| {
            self.load_contexts().get(key).map(|id| ContextRef {
                id: id.clone(),
                persist: true,
            })
        });
        if context.is_some() {
            info!(site = site_key, "Using cached auth context");
        }

        let request = SessionRequest {
            project_id: &self.project_id,
            browser_settings: BrowserSettings {
                solve_captchas: true,
                block_ads: true,
                viewport: Viewport {
                    width: 1920,
                    height: 1080,
                },
                context,
            },
            proxies: vec![Proxy {
                kind: "browserbase",
                geolocation: Geolocation {
                    country: "US",
                    state: "NY",
                    city: "New York",
                },
            }],
        };

        let url = format!("{}/sessions", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-BB-API-Key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(BrowserbaseError::Auth);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BrowserbaseError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Create and cache a persistent context for a site, for authenticated
    /// scraping sessions.
    pub async fn create_context(&self, site_key: &str) -> Result<String> {
        let url = format!("{}/contexts", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-BB-API-Key", &self.api_key)
            .json(&serde_json::json!({ "projectId": self.project_id }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BrowserbaseError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let context: ContextResponse = response.json().await?;
        let mut contexts = self.load_contexts();
        contexts.insert(site_key.to_string(), context.id.clone());
        self.save_contexts(&contexts);

        Ok(context.id)
    }

    fn load_contexts(&self) -> HashMap<String, String> {
        std::fs::read_to_string(&self.context_cache)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save_contexts(&self, contexts: &HashMap<String, String>) {
        if let Ok(raw) = serde_json::to_string(contexts) {
            if let Err(e) = std::fs::write(&self.context_cache, raw) {
                warn!(error = %e, "Could not save context cache");
            }
        }
    }
}

/// Map a URL to its paywalled-site key, if any.
fn site_key_for(url: &str) -> Option<String> {
    const SITES: &[&str] = &["wsj.com", "nytimes.com", "bloomberg.com", "msn.com"];
    let lower = url.to_lowercase();
    SITES
        .iter()
        .find(|site| lower.contains(*site))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_key_matching() {
        assert_eq!(
            site_key_for("https://www.wsj.com/tech/ai/story").as_deref(),
            Some("wsj.com")
        );
        assert_eq!(
            site_key_for("https://www.NYTimes.com/2026/01/x").as_deref(),
            Some("nytimes.com")
        );
        assert_eq!(site_key_for("https://reuters.com/x"), None);
    }
}
