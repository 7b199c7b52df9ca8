//! Adapter seams and production wiring. Every job takes its collaborators
//! through `Deps`, so tests swap in-memory fakes through the same traits the
//! coordinator wires for production.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ai_client::{
    Classifier, ClaudeAgent, GeminiAgent, GeminiImageModel, ImageGenerator, OpenAiImageModel,
    TextModel,
};
use browserbase_client::BrowserbaseClient;
use cloudflare_images_client::CloudflareImagesClient;
use cloudinary_client::CloudinaryClient;
use freshrss_client::FreshRssClient;
use gnews_client::GnewsClient;
use mautic_client::{MauticClient, NewEmail, SendOutcome};
use pivot_common::Config;
use pivot_store::airtable::AirtableBackend;
use pivot_store::Store;

// ---------------------------------------------------------------------------
// Trait seams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: Option<String>,
}

#[async_trait]
pub trait FeedReader: Send + Sync {
    async fn refresh(&self) -> Result<()>;
    async fn articles(&self, limit: u32, since_hours: u32) -> Result<Vec<FeedItem>>;
}

/// Resolves an aggregator redirect URL. Returns the decoded URL and whether
/// decoding actually succeeded.
#[async_trait]
pub trait RedirectResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> (String, bool);
}

/// Plain article-content fetcher used by scoring and newsletter extraction.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    pub success: bool,
    pub content: String,
    pub content_length: usize,
    pub session_replay: String,
    pub error: Option<String>,
}

/// Headless-browser extractor for paywalled sources.
#[async_trait]
pub trait PaywallExtractor: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ExtractOutcome>;
}

/// Image CDN optimization. Implementations fall back locally when the CDN is
/// unreachable.
#[async_trait]
pub trait ImageOptimizer: Send + Sync {
    async fn optimize(&self, bytes: Vec<u8>, width: u32) -> Vec<u8>;
}

/// Image host upload: returns the public URL. Conflict retries are the
/// adapter's business.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, story_id: &str, source: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct CampaignResult {
    pub email_id: i64,
    pub outcome: SendOutcome,
}

/// Email gateway: create campaign, attach transport, send.
#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send_campaign(
        &self,
        name: &str,
        subject: &str,
        html: &str,
        segment_id: Option<i64>,
    ) -> Result<CampaignResult>;
}

/// The imagery stack bundled: generate, optimize, host.
pub struct ImagePipeline {
    pub generator: ImageGenerator,
    pub optimizer: Arc<dyn ImageOptimizer>,
    pub host: Arc<dyn ImageHost>,
}

// ---------------------------------------------------------------------------
// Deps
// ---------------------------------------------------------------------------

/// Constructor-injected collaborators for every stage. Optional members are
/// the ones whose credentials may be absent; stages requiring them either
/// skip (non-blocking) or fail (blocking).
pub struct Deps {
    pub config: Config,
    pub store: Store,
    pub feed_reader: Option<Arc<dyn FeedReader>>,
    pub resolver: Arc<dyn RedirectResolver>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub extractor: Option<Arc<dyn PaywallExtractor>>,
    pub reasoning: Arc<dyn TextModel>,
    pub cleaner: Arc<dyn TextModel>,
    pub classifier: Arc<dyn Classifier>,
    pub images: Option<Arc<ImagePipeline>>,
    pub gateway: Option<Arc<dyn EmailGateway>>,
}

impl Deps {
    /// Wire production adapters from config. Missing optional credentials
    /// leave the corresponding member unset.
    pub fn from_config(config: Config) -> Self {
        let store = Store::new(Arc::new(AirtableBackend::new(&config)));

        let feed_reader: Option<Arc<dyn FeedReader>> = if config.freshrss_url.is_empty() {
            warn!("FreshRSS not configured; ingest will be skipped");
            None
        } else {
            Some(Arc::new(FreshRssReader::new(
                &config.freshrss_url,
                &config.freshrss_username,
                &config.freshrss_api_password,
            )))
        };

        let extractor: Option<Arc<dyn PaywallExtractor>> = if config.browserbase_api_key.is_empty()
        {
            info!("Browserbase not configured; extractor retry will be skipped");
            None
        } else {
            Some(Arc::new(BrowserbaseExtractor::new(
                &config.browserbase_api_key,
                &config.browserbase_project_id,
            )))
        };

        let reasoning: Arc<dyn TextModel> = Arc::new(ClaudeAgent::new(&config.anthropic_api_key));

        // The cleaner prefers the fast model but falls back to the reasoning
        // model when Gemini is unconfigured.
        let cleaner: Arc<dyn TextModel> = if config.gemini_api_key.is_empty() {
            Arc::new(ClaudeAgent::new(&config.anthropic_api_key))
        } else {
            Arc::new(GeminiAgent::new(&config.gemini_api_key))
        };

        // One config bit flips the prefilter between the primary (Gemini)
        // and secondary (Claude) classifier behind the same interface.
        let classifier: Arc<dyn Classifier> =
            if config.prefilter_classifier == "claude" || config.gemini_api_key.is_empty() {
                Arc::new(ClaudeAgent::new(&config.anthropic_api_key))
            } else {
                Arc::new(GeminiAgent::new(&config.gemini_api_key))
            };

        let images = build_image_pipeline(&config);

        let gateway: Option<Arc<dyn EmailGateway>> = if config.mautic_base_url.is_empty() {
            warn!("Mautic not configured; send will be skipped");
            None
        } else {
            let mut client = MauticClient::new(
                &config.mautic_base_url,
                &config.mautic_username,
                &config.mautic_password,
            );
            if !config.mautic_transport_id.is_empty() {
                client = client.with_transport(&config.mautic_transport_id);
            }
            Some(Arc::new(MauticGateway {
                client,
                from_address: config.from_address.clone(),
                from_name: config.from_name.clone(),
                reply_to_address: config.reply_to_address.clone(),
            }))
        };

        Self {
            store,
            feed_reader,
            resolver: Arc::new(GnewsResolver::new()),
            fetcher: Arc::new(HttpContentFetcher::new()),
            extractor,
            reasoning,
            cleaner,
            classifier,
            images,
            gateway,
            config,
        }
    }
}

fn build_image_pipeline(config: &Config) -> Option<Arc<ImagePipeline>> {
    if config.gemini_api_key.is_empty() && config.openai_api_key.is_empty() {
        info!("No image generator configured; imagery will be skipped");
        return None;
    }

    let mut generator = if !config.gemini_api_key.is_empty() {
        ImageGenerator::new(Box::new(GeminiImageModel::new(&config.gemini_api_key)))
    } else {
        ImageGenerator::new(Box::new(OpenAiImageModel::new(&config.openai_api_key)))
    };
    if !config.gemini_api_key.is_empty() && !config.openai_api_key.is_empty() {
        generator = generator.with_fallback(Box::new(OpenAiImageModel::new(&config.openai_api_key)));
    }

    let optimizer: Arc<dyn ImageOptimizer> = if config.cloudinary_cloud_name.is_empty() {
        Arc::new(LocalOptimizer)
    } else {
        Arc::new(CloudinaryOptimizer {
            client: CloudinaryClient::new(
                &config.cloudinary_cloud_name,
                &config.cloudinary_upload_preset,
            ),
        })
    };

    if config.cloudflare_account_id.is_empty() {
        info!("Cloudflare Images not configured; imagery will be skipped");
        return None;
    }
    let host: Arc<dyn ImageHost> = Arc::new(CloudflareHost {
        client: CloudflareImagesClient::new(
            &config.cloudflare_account_id,
            &config.cloudflare_api_key,
        ),
    });

    Some(Arc::new(ImagePipeline {
        generator,
        optimizer,
        host,
    }))
}

// ---------------------------------------------------------------------------
// Production adapter impls
// ---------------------------------------------------------------------------

struct FreshRssReader {
    client: FreshRssClient,
}

impl FreshRssReader {
    fn new(url: &str, username: &str, api_password: &str) -> Self {
        Self {
            client: FreshRssClient::new(url, username, api_password),
        }
    }
}

#[async_trait]
impl FeedReader for FreshRssReader {
    async fn refresh(&self) -> Result<()> {
        self.client.trigger_refresh().await.context("feed refresh")
    }

    async fn articles(&self, limit: u32, since_hours: u32) -> Result<Vec<FeedItem>> {
        let items = self
            .client
            .articles(limit, since_hours)
            .await
            .context("feed fetch")?;
        Ok(items
            .into_iter()
            .map(|i| FeedItem {
                url: i.url,
                title: i.title,
                published_at: i.published_at,
                source_id: i.source_id,
            })
            .collect())
    }
}

struct GnewsResolver {
    client: GnewsClient,
}

impl GnewsResolver {
    fn new() -> Self {
        Self {
            client: GnewsClient::new(),
        }
    }
}

#[async_trait]
impl RedirectResolver for GnewsResolver {
    async fn resolve(&self, url: &str) -> (String, bool) {
        match self.client.resolve(url).await {
            Ok(resolution) => (resolution.decoded_url, resolution.resolved),
            Err(e) => {
                warn!(url, error = %e, "Redirect resolution errored");
                (url.to_string(), false)
            }
        }
    }
}

/// Plain HTTP fetch + Readability markdown.
pub struct HttpContentFetcher {
    http: reqwest::Client,
}

impl HttpContentFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; pivot-worker)")
            .build()
            .expect("Failed to build HTTP client");
        Self { http }
    }
}

impl Default for HttpContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await.context("article fetch")?;
        let status = response.status();
        anyhow::ensure!(status.is_success(), "article fetch failed ({status})");
        let html = response.bytes().await.context("article body")?;
        Ok(crate::readability::html_to_markdown(&html, Some(url)))
    }
}

struct BrowserbaseExtractor {
    client: BrowserbaseClient,
}

impl BrowserbaseExtractor {
    fn new(api_key: &str, project_id: &str) -> Self {
        Self {
            client: BrowserbaseClient::new(api_key, project_id),
        }
    }
}

#[async_trait]
impl PaywallExtractor for BrowserbaseExtractor {
    async fn scrape(&self, url: &str) -> Result<ExtractOutcome> {
        let result = self.client.scrape(url).await.context("browserbase scrape")?;
        Ok(ExtractOutcome {
            success: result.success,
            content: result.content,
            content_length: result.content_length,
            session_replay: result.session_replay,
            error: result.error,
        })
    }
}

struct CloudinaryOptimizer {
    client: CloudinaryClient,
}

#[async_trait]
impl ImageOptimizer for CloudinaryOptimizer {
    async fn optimize(&self, bytes: Vec<u8>, width: u32) -> Vec<u8> {
        match self.client.optimize(bytes.clone(), width).await {
            Ok(optimized) => optimized,
            Err(e) => {
                warn!(error = %e, "CDN optimization failed, resizing locally");
                LocalOptimizer.optimize(bytes, width).await
            }
        }
    }
}

/// Local resize fallback when the CDN is unreachable.
pub struct LocalOptimizer;

#[async_trait]
impl ImageOptimizer for LocalOptimizer {
    async fn optimize(&self, bytes: Vec<u8>, width: u32) -> Vec<u8> {
        let original = bytes.clone();
        match tokio::task::spawn_blocking(move || resize_jpeg(&bytes, width)).await {
            Ok(Some(resized)) => resized,
            _ => {
                warn!("Local resize failed, passing original bytes through");
                original
            }
        }
    }
}

fn resize_jpeg(bytes: &[u8], width: u32) -> Option<Vec<u8>> {
    let img = image::load_from_memory(bytes).ok()?;
    let ratio = width as f32 / img.width() as f32;
    let height = (img.height() as f32 * ratio) as u32;
    let resized = img.resize_exact(width, height.max(1), image::imageops::FilterType::Lanczos3);

    let mut out = std::io::Cursor::new(Vec::new());
    resized
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .ok()?;
    Some(out.into_inner())
}

struct CloudflareHost {
    client: CloudflareImagesClient,
}

#[async_trait]
impl ImageHost for CloudflareHost {
    async fn upload(&self, bytes: Vec<u8>, story_id: &str, source: &str) -> Result<String> {
        let filename = format!("pivot5-{story_id}-{source}.jpg");
        let base_id = filename.replace('.', "-");

        // Second-resolution timestamp first; on an id conflict retry once
        // with millisecond precision.
        let unique_id = format!("{base_id}-{}", Utc::now().timestamp());
        match self
            .client
            .upload(bytes.clone(), &filename, &unique_id)
            .await
        {
            Ok(url) => Ok(url),
            Err(e) if e.is_conflict() => {
                let retry_id = format!("{base_id}-{}", Utc::now().timestamp_millis());
                Ok(self.client.upload(bytes, &filename, &retry_id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

struct MauticGateway {
    client: MauticClient,
    from_address: String,
    from_name: String,
    reply_to_address: String,
}

#[async_trait]
impl EmailGateway for MauticGateway {
    async fn send_campaign(
        &self,
        name: &str,
        subject: &str,
        html: &str,
        segment_id: Option<i64>,
    ) -> Result<CampaignResult> {
        let email = self
            .client
            .create_email(&NewEmail {
                name: name.to_string(),
                subject: subject.to_string(),
                custom_html: html.to_string(),
                description: String::new(),
                from_address: self.from_address.clone(),
                from_name: self.from_name.clone(),
                reply_to_address: self.reply_to_address.clone(),
                is_published: true,
                email_type: "template".to_string(),
            })
            .await?;

        if let Err(e) = self.client.attach_transport(email.id).await {
            warn!(email_id = email.id, error = %e, "Transport attach failed, using default");
        }

        let outcome = self.client.send_email(email.id, segment_id).await?;
        Ok(CampaignResult {
            email_id: email.id,
            outcome,
        })
    }
}

// ---------------------------------------------------------------------------
// Test fakes
// ---------------------------------------------------------------------------
