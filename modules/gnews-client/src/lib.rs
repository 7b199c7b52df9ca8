pub mod error;

pub use error::{GnewsError, Result};

use std::time::Duration;

use regex::Regex;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

const AGGREGATOR_HOST: &str = "news.google.com";
const BATCHEXECUTE_URL: &str = "https://news.google.com/_/DotsSplashUi/data/batchexecute";

/// Minimum gap between decode calls. Google rate-limits this endpoint hard.
const CALL_INTERVAL: Duration = Duration::from_millis(300);

/// Waits after a 429, in order. Attempts are exhausted after the last.
const RATE_LIMIT_WAITS: [Duration; 3] = [
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(120),
];

/// Result of resolving one aggregator URL.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub decoded_url: String,
    /// False when decoding failed and the wrapper URL is returned unchanged.
    pub resolved: bool,
}

/// Resolver for Google News redirect URLs via the batchexecute API.
pub struct GnewsClient {
    http: reqwest::Client,
    // Pacing gate: time the last call finished.
    last_call: Mutex<Option<Instant>>,
}

impl Default for GnewsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GnewsClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            last_call: Mutex::new(None),
        }
    }

    pub fn is_aggregator_url(url: &str) -> bool {
        url.contains(AGGREGATOR_HOST)
    }

    /// Resolve a Google News redirect URL to the underlying article URL.
    /// On any decode failure the wrapper URL is returned with
    /// `resolved = false`; the caller labels the source as the aggregator.
    pub async fn resolve(&self, url: &str) -> Result<Resolution> {
        if !Self::is_aggregator_url(url) {
            return Err(GnewsError::NotAggregatorUrl(url.to_string()));
        }

        match self.decode(url).await {
            Ok(decoded_url) => Ok(Resolution {
                decoded_url,
                resolved: true,
            }),
            Err(e) => {
                warn!(url, error = %e, "Failed to decode aggregator URL");
                Ok(Resolution {
                    decoded_url: url.to_string(),
                    resolved: false,
                })
            }
        }
    }

    async fn decode(&self, url: &str) -> Result<String> {
        // 1. Fetch the interstitial page and pull the signed decode params.
        let page = self.get_with_backoff(url).await?;
        let (signature, timestamp, article_id) = extract_decode_params(&page, url)?;

        // 2. Ask batchexecute for the real URL.
        let inner = serde_json::json!([
            "Fbv4je",
            format!(
                "[\"garturlreq\",[[\"X\",\"X\",[\"X\",\"X\"],null,null,1,1,\"US:en\",null,1,null,null,null,null,null,0,1],\"X\",\"X\",1,[1,1,1],1,1,null,0,0,null,0],\"{article_id}\",{timestamp},\"{signature}\"]"
            )
        ]);
        let f_req = serde_json::json!([[inner]]).to_string();

        self.pace().await;
        let response = self
            .http
            .post(BATCHEXECUTE_URL)
            .header("Content-Type", "application/x-www-form-urlencoded;charset=UTF-8")
            .form(&[("f.req", f_req.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GnewsError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        parse_batchexecute_url(&body)
            .ok_or_else(|| GnewsError::Decode("no URL in batchexecute response".into()))
    }

    /// GET with the documented 429 backoff ladder (30s, 60s, 120s).
    async fn get_with_backoff(&self, url: &str) -> Result<String> {
        for (attempt, wait) in RATE_LIMIT_WAITS.iter().enumerate() {
            self.pace().await;
            let response = self.http.get(url).send().await?;
            let status = response.status();

            if status.as_u16() == 429 {
                warn!(
                    url,
                    attempt = attempt + 1,
                    wait_secs = wait.as_secs(),
                    "Rate limited by aggregator, backing off"
                );
                tokio::time::sleep(*wait).await;
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                return Err(GnewsError::Api {
                    status: status.as_u16(),
                    message: body.chars().take(200).collect(),
                });
            }
            return Ok(body);
        }

        Err(GnewsError::Api {
            status: 429,
            message: "rate limited after all backoff attempts".into(),
        })
    }

    /// Enforce the 300ms inter-call gap.
    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < CALL_INTERVAL {
                tokio::time::sleep(CALL_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Pull (signature, timestamp, article id) out of the interstitial page.
fn extract_decode_params(page: &str, url: &str) -> Result<(String, String, String)> {
    let article_id = url
        .rsplit('/')
        .next()
        .map(|tail| tail.split('?').next().unwrap_or(tail).to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| GnewsError::Decode("could not extract article id".into()))?;

    let sig_re = Regex::new(r#"data-n-a-sg="([^"]+)""#).expect("static regex");
    let ts_re = Regex::new(r#"data-n-a-ts="([^"]+)""#).expect("static regex");

    let signature = sig_re
        .captures(page)
        .map(|c| c[1].to_string())
        .ok_or_else(|| GnewsError::Decode("missing signature attribute".into()))?;
    let timestamp = ts_re
        .captures(page)
        .map(|c| c[1].to_string())
        .ok_or_else(|| GnewsError::Decode("missing timestamp attribute".into()))?;

    debug!(article_id, "Extracted decode params");
    Ok((signature, timestamp, article_id))
}

/// The batchexecute envelope nests JSON-in-JSON; the decoded URL is the
/// second element of the inner garturlres payload.
fn parse_batchexecute_url(body: &str) -> Option<String> {
    for line in body.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with("[[") {
            continue;
        }
        let outer: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let payload = outer.get(0)?.get(2)?.as_str()?;
        let inner: serde_json::Value = serde_json::from_str(payload).ok()?;
        if let Some(url) = inner.get(1).and_then(|v| v.as_str()) {
            if url.starts_with("http") {
                return Some(url.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_detection() {
        assert!(GnewsClient::is_aggregator_url(
            "https://news.google.com/rss/articles/CBMi"
        ));
        assert!(!GnewsClient::is_aggregator_url("https://reuters.com/x"));
    }

    #[test]
    fn extracts_decode_params_from_page() {
        let page = r#"<c-wiz data-n-a-sg="AQY" data-n-a-ts="12345"></c-wiz>"#;
        let (sig, ts, id) =
            extract_decode_params(page, "https://news.google.com/rss/articles/CBMiABC").unwrap();
        assert_eq!(sig, "AQY");
        assert_eq!(ts, "12345");
        assert_eq!(id, "CBMiABC");
    }

    #[test]
    fn missing_params_is_decode_error() {
        let err = extract_decode_params("<html></html>", "https://news.google.com/rss/articles/X")
            .unwrap_err();
        assert!(matches!(err, GnewsError::Decode(_)));
    }

    #[test]
    fn parses_batchexecute_envelope() {
        let body = ")]}'\n\n[[\"wrb.fr\",\"Fbv4je\",\"[\\\"garturlres\\\",\\\"https://reuters.com/article\\\"]\",null,null,null,\"generic\"]]";
        assert_eq!(
            parse_batchexecute_url(body).as_deref(),
            Some("https://reuters.com/article")
        );
    }
}
