//! Imagery sweep: generate, optimize, and host one image per Pivot 5 story
//! awaiting one. Generation falls from the primary to the fallback provider;
//! optimization falls back to a local resize; already-populated image URLs
//! are skipped so re-runs are idempotent.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use pivot_common::types::{ImageStatus, NewsletterVariant};

use crate::deps::Deps;
use crate::jobs::StageError;
use crate::run_log::{ExecutionLogger, RunStatus};

/// Newsletter image width.
pub const IMAGE_WIDTH: u32 = 636;

#[derive(Debug, Default, Serialize)]
pub struct ImageryResult {
    pub skipped: bool,
    pub generated: usize,
    pub failed: usize,
    pub already_populated: usize,
    pub errors: Vec<StageError>,
}

pub async fn run(deps: &Deps) -> Result<ImageryResult> {
    let mut logger = ExecutionLogger::new(3, "image_generation");
    let mut result = ImageryResult::default();

    let Some(images) = &deps.images else {
        logger.warn("Image pipeline not configured, skipping");
        result.skipped = true;
        logger.complete(&deps.store, RunStatus::Success, None).await;
        return Ok(result);
    };

    let pending = deps
        .store
        .stories_needing_images(NewsletterVariant::Pivot5)
        .await?;
    logger.info(format!("{} stories need images", pending.len()));

    for (record_id, story) in pending {
        // Idempotence: a populated URL means a previous run finished this
        // story but died before flipping the status.
        if story.image_url.as_deref().is_some_and(|u| !u.is_empty()) {
            result.already_populated += 1;
            let mut patch = Map::new();
            patch.insert(
                "image_status".into(),
                Value::String(ImageStatus::Generated.as_str().into()),
            );
            deps.store
                .update_issue_story(NewsletterVariant::Pivot5, &record_id, patch)
                .await?;
            continue;
        }

        let prompt = match story.image_prompt.as_deref().filter(|p| !p.is_empty()) {
            Some(prompt) => prompt.to_string(),
            None => format!(
                "Abstract editorial illustration representing: {}",
                story.headline
            ),
        };

        match process_story(deps, images, &story.story_id, &prompt).await {
            Ok((url, source)) => {
                let mut patch = Map::new();
                patch.insert("image_url".into(), Value::String(url));
                patch.insert("image_source".into(), Value::String(source.to_string()));
                patch.insert(
                    "image_status".into(),
                    Value::String(ImageStatus::Generated.as_str().into()),
                );
                patch.insert(
                    "image_generated_at".into(),
                    Value::String(Utc::now().to_rfc3339()),
                );
                deps.store
                    .update_issue_story(NewsletterVariant::Pivot5, &record_id, patch)
                    .await?;
                result.generated += 1;
                logger.info(format!("Image generated for {}", story.story_id));
            }
            Err(e) => {
                result.failed += 1;
                logger.warn(format!("Image failed for {}: {e}", story.story_id));
                result.errors.push(StageError::new(story.story_id.clone(), &e));

                let mut patch = Map::new();
                patch.insert(
                    "image_status".into(),
                    Value::String(ImageStatus::Failed.as_str().into()),
                );
                patch.insert(
                    "image_error".into(),
                    Value::String(e.to_string().chars().take(500).collect()),
                );
                deps.store
                    .update_issue_story(NewsletterVariant::Pivot5, &record_id, patch)
                    .await?;
            }
        }
    }

    logger.set_summary("generated", result.generated);
    logger.set_summary("failed", result.failed);
    logger.complete(&deps.store, RunStatus::Success, None).await;
    Ok(result)
}

/// Generate → optimize → host for one story, sequentially.
async fn process_story(
    _deps: &Deps,
    images: &crate::deps::ImagePipeline,
    story_id: &str,
    prompt: &str,
) -> Result<(String, &'static str)> {
    let generated = images.generator.generate(prompt).await?;
    let optimized = images.optimizer.optimize(generated.bytes, IMAGE_WIDTH).await;
    let url = images
        .host
        .upload(optimized, story_id, generated.source)
        .await?;
    Ok((url, generated.source))
}

/// Manual regeneration for one story record.
pub async fn regenerate(deps: &Deps, record_id: &str) -> Result<String> {
    let images = deps
        .images
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("image pipeline not configured"))?;

    let record = deps
        .store
        .get(pivot_store::Table::IssueStories(NewsletterVariant::Pivot5), record_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("story record not found: {record_id}"))?;

    let story_id = record.str_field("story_id").to_string();
    let prompt = match record.opt_str("image_prompt") {
        Some(prompt) => prompt.to_string(),
        None => format!(
            "Abstract editorial illustration representing: {}",
            record.str_field("headline")
        ),
    };

    let (url, source) = process_story(deps, images, &story_id, &prompt).await?;
    let mut patch = Map::new();
    patch.insert("image_url".into(), Value::String(url.clone()));
    patch.insert("image_source".into(), Value::String(source.to_string()));
    patch.insert(
        "image_status".into(),
        Value::String(ImageStatus::Generated.as_str().into()),
    );
    deps.store
        .update_issue_story(NewsletterVariant::Pivot5, record_id, patch)
        .await?;
    Ok(url)
}
