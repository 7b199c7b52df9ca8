use std::collections::HashMap;
use std::env;

use chrono_tz::Tz;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Tabular datastore
    pub airtable_api_key: String,
    pub editor_base_id: String,
    pub signal_base_id: String,

    // AI providers
    pub anthropic_api_key: String,
    pub gemini_api_key: String,
    pub openai_api_key: String,

    // Feed reader
    pub freshrss_url: String,
    pub freshrss_username: String,
    pub freshrss_api_password: String,

    // Headless extractor
    pub browserbase_api_key: String,
    pub browserbase_project_id: String,

    // Email gateway
    pub mautic_base_url: String,
    pub mautic_username: String,
    pub mautic_password: String,
    pub mautic_transport_id: String,
    pub mautic_segment_id: Option<i64>,
    pub from_address: String,
    pub from_name: String,
    pub reply_to_address: String,

    // Imagery
    pub cloudflare_account_id: String,
    pub cloudflare_api_key: String,
    pub cloudinary_cloud_name: String,
    pub cloudinary_upload_preset: String,

    // Editorial rules
    /// Civil timezone for all issue-date arithmetic.
    pub timezone: Tz,
    /// Minimum interest score for an Article to become a Select.
    pub interest_threshold: f64,
    /// Sources below this credibility are dropped in prefilter.
    pub min_source_credibility: u8,
    /// Score assigned to any source without an explicit override.
    pub default_source_credibility: u8,
    /// Per-source credibility overrides, lowercase source name -> score.
    pub source_credibility_overrides: HashMap<String, u8>,
    /// Brand name substituted into the deliverability HTML variant.
    pub deliverability_brand: String,
    /// Which classifier backs the prefilter: "gemini" (primary) or "claude".
    pub prefilter_classifier: String,

    // Pipeline windows
    pub ingest_window_hours: u32,
    pub prefilter_lookback_hours: u32,

    // Direct (non-aggregator) RSS feeds
    pub direct_feeds: Vec<String>,
}

impl Config {
    /// Load the full worker configuration. Panics with a clear message when
    /// required vars are missing.
    pub fn worker_from_env() -> Self {
        Self {
            airtable_api_key: required_env("AIRTABLE_API_KEY"),
            editor_base_id: env::var("EDITOR_BASE_ID").unwrap_or_else(|_| "appEditorBase".into()),
            signal_base_id: env::var("SIGNAL_BASE_ID").unwrap_or_else(|_| "appSignalBase".into()),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            freshrss_url: env::var("FRESHRSS_URL").unwrap_or_default(),
            freshrss_username: env::var("FRESHRSS_USERNAME").unwrap_or_default(),
            freshrss_api_password: env::var("FRESHRSS_API_PASSWORD").unwrap_or_default(),
            browserbase_api_key: env::var("BROWSERBASE_API_KEY").unwrap_or_default(),
            browserbase_project_id: env::var("BROWSERBASE_PROJECT_ID").unwrap_or_default(),
            mautic_base_url: env::var("MAUTIC_BASE_URL").unwrap_or_default(),
            mautic_username: env::var("MAUTIC_USERNAME").unwrap_or_default(),
            mautic_password: env::var("MAUTIC_PASSWORD").unwrap_or_default(),
            mautic_transport_id: env::var("MAUTIC_TRANSPORT_ID").unwrap_or_default(),
            mautic_segment_id: env::var("MAUTIC_SEGMENT_ID").ok().and_then(|v| v.parse().ok()),
            from_address: env::var("NEWSLETTER_FROM_ADDRESS")
                .unwrap_or_else(|_| "newsletter@pivotmedia.ai".into()),
            from_name: env::var("NEWSLETTER_FROM_NAME").unwrap_or_else(|_| "Pivot 5".into()),
            reply_to_address: env::var("NEWSLETTER_REPLY_TO")
                .unwrap_or_else(|_| "reply@pivotmedia.ai".into()),
            cloudflare_account_id: env::var("CLOUDFLARE_ACCOUNT_ID").unwrap_or_default(),
            cloudflare_api_key: env::var("CLOUDFLARE_API_KEY").unwrap_or_default(),
            cloudinary_cloud_name: env::var("CLOUDINARY_CLOUD_NAME").unwrap_or_default(),
            cloudinary_upload_preset: env::var("CLOUDINARY_UPLOAD_PRESET")
                .unwrap_or_else(|_| "MakeImage".into()),
            timezone: env::var("NEWSLETTER_TIMEZONE")
                .unwrap_or_else(|_| "America/New_York".into())
                .parse()
                .expect("NEWSLETTER_TIMEZONE must be a valid IANA timezone"),
            interest_threshold: env::var("INTEREST_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7.0),
            min_source_credibility: env::var("MIN_SOURCE_CREDIBILITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            default_source_credibility: env::var("DEFAULT_SOURCE_CREDIBILITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            source_credibility_overrides: parse_overrides(
                &env::var("SOURCE_CREDIBILITY_OVERRIDES").unwrap_or_default(),
            ),
            deliverability_brand: env::var("DELIVERABILITY_BRAND")
                .unwrap_or_else(|_| "Daily AI Briefing".into()),
            prefilter_classifier: env::var("PREFILTER_CLASSIFIER")
                .unwrap_or_else(|_| "gemini".into())
                .to_lowercase(),
            ingest_window_hours: env::var("INGEST_WINDOW_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            prefilter_lookback_hours: env::var("PREFILTER_LOOKBACK_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            direct_feeds: parse_feeds(&env::var("DIRECT_FEEDS").unwrap_or_default()),
        }
    }

    /// Log the presence of each sensitive env var without leaking values.
    pub fn log_redacted(&self) {
        let vars = [
            ("AIRTABLE_API_KEY", &self.airtable_api_key),
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
            ("GEMINI_API_KEY", &self.gemini_api_key),
            ("OPENAI_API_KEY", &self.openai_api_key),
            ("FRESHRSS_API_PASSWORD", &self.freshrss_api_password),
            ("BROWSERBASE_API_KEY", &self.browserbase_api_key),
            ("MAUTIC_PASSWORD", &self.mautic_password),
            ("CLOUDFLARE_API_KEY", &self.cloudflare_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

/// Parse "Source Name:score,Other:score" into an override map.
fn parse_overrides(raw: &str) -> HashMap<String, u8> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, score) = pair.split_once(':')?;
            let score: u8 = score.trim().parse().ok()?;
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                None
            } else {
                Some((name, score))
            }
        })
        .collect()
}

fn parse_feeds(raw: &str) -> Vec<String> {
    let configured: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !configured.is_empty() {
        return configured;
    }
    // Default direct feeds; the aggregator feed comes through the reader.
    vec![
        "https://techcrunch.com/category/artificial-intelligence/feed/".into(),
        "https://www.theverge.com/rss/index.xml".into(),
        "https://venturebeat.com/category/ai/feed/".into(),
    ]
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_credibility_overrides() {
        let overrides = parse_overrides("Tabloid Daily:1, Reuters:5");
        assert_eq!(overrides.get("tabloid daily"), Some(&1));
        assert_eq!(overrides.get("reuters"), Some(&5));
        assert!(parse_overrides("").is_empty());
        assert!(parse_overrides("garbage").is_empty());
    }

    #[test]
    fn feed_list_falls_back_to_defaults() {
        assert!(!parse_feeds("").is_empty());
        let custom = parse_feeds("https://a.example/feed, https://b.example/rss");
        assert_eq!(custom.len(), 2);
    }
}
