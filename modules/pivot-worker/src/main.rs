use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pivot_common::types::NewsletterVariant;
use pivot_common::Config;
use pivot_worker::deps::Deps;
use pivot_worker::jobs::{
    compile, decoration, direct_feeds, extract, extractor_retry, imagery, ingest, prefilter,
    repair, scheduled_send, scoring, selection, send, signal_compile, signal_decoration,
    signal_selection,
};
use pivot_worker::pipeline;

#[derive(Parser)]
#[command(name = "pivot-worker", about = "Daily newsletter production pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full chained pipeline (ingest through prefilter).
    Pipeline {
        /// Lookback window in hours; raise up to 120 for backfills.
        #[arg(long, default_value_t = 10)]
        window_hours: u32,
    },
    /// Aggregator-feed ingest only.
    Ingest {
        #[arg(long, default_value_t = 10)]
        window_hours: u32,
    },
    /// Direct (non-aggregator) RSS ingest only.
    DirectFeeds {
        #[arg(long, default_value_t = 10)]
        window_hours: u32,
    },
    /// Score articles flagged by ingest.
    Score,
    /// Re-fetch selects with empty bodies.
    Extract,
    /// Headless-extractor retry for paywalled sources.
    ExtractorRetry,
    /// Re-resolve aggregator wrapper URLs left in Articles.
    Repair,
    /// Run the five-slot prefilter.
    Prefilter {
        #[arg(long, default_value_t = 10)]
        lookback_hours: i64,
    },
    /// Select stories into a new issue.
    Select {
        #[arg(long, default_value = "pivot5")]
        variant: NewsletterVariant,
    },
    /// Decorate the pending issue.
    Decorate {
        #[arg(long, default_value = "pivot5")]
        variant: NewsletterVariant,
    },
    /// Generate images for decorated stories.
    Images,
    /// Compile the decorated issue into email HTML.
    Compile {
        #[arg(long, default_value = "pivot5")]
        variant: NewsletterVariant,
        /// Compile a specific issue label instead of the newest decorated.
        #[arg(long)]
        issue_id: Option<String>,
    },
    /// Send the next queued issue.
    Send,
    /// Sweep scheduled issues whose send time has passed.
    ScheduledCheck,
    /// Run the cron scheduler (three daily cycles plus the stage triggers).
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pivot=info".parse()?))
        .init();

    info!("Pivot worker starting...");

    let cli = Cli::parse();
    let config = Config::worker_from_env();
    config.log_redacted();
    let deps = Deps::from_config(config);

    match cli.command {
        Command::Pipeline { window_hours } => {
            let result = pipeline::run_full_pipeline(&deps, window_hours).await?;
            info!(
                new_articles = result.new_articles,
                prefilter_written = result.prefilter_written,
                "Pipeline complete"
            );
        }
        Command::Ingest { window_hours } => {
            let result = ingest::run(&deps, window_hours).await?;
            info!(ingested = result.ingested, "Ingest complete");
        }
        Command::DirectFeeds { window_hours } => {
            let result = direct_feeds::run(&deps, window_hours).await?;
            info!(ingested = result.ingested, "Direct-feed ingest complete");
        }
        Command::Score => {
            let result = scoring::run(&deps).await?;
            info!(
                scored = result.scored,
                selects = result.selects_created,
                "Scoring complete"
            );
        }
        Command::Extract => {
            let result = extract::run(&deps).await?;
            info!(extracted = result.extracted, "Extraction complete");
        }
        Command::ExtractorRetry => {
            let result = extractor_retry::run(&deps).await?;
            info!(
                succeeded = result.succeeded,
                failed = result.failed,
                "Extractor retry complete"
            );
        }
        Command::Repair => {
            let result = repair::run(&deps, true).await?;
            info!(repaired = result.repaired, "Repair complete");
        }
        Command::Prefilter { lookback_hours } => {
            let result = prefilter::run(&deps, lookback_hours).await?;
            info!(written = result.written, "Prefilter complete");
        }
        Command::Select { variant } => match variant {
            NewsletterVariant::Pivot5 => {
                let result = selection::run(&deps).await?;
                info!(slots_filled = result.slots_filled, "Selection complete");
            }
            NewsletterVariant::Signal => {
                let result = signal_selection::run(&deps).await?;
                info!(
                    sections = result.sections_filled,
                    signals = result.signals_filled,
                    "Signal selection complete"
                );
            }
        },
        Command::Decorate { variant } => match variant {
            NewsletterVariant::Pivot5 => {
                let result = decoration::run(&deps).await?;
                info!(decorated = result.decorated, "Decoration complete");
            }
            NewsletterVariant::Signal => {
                let result = signal_decoration::run(&deps).await?;
                info!(decorated = result.decorated, "Signal decoration complete");
            }
        },
        Command::Images => {
            let result = imagery::run(&deps).await?;
            info!(
                generated = result.generated,
                failed = result.failed,
                "Imagery complete"
            );
        }
        Command::Compile { variant, issue_id } => match variant {
            NewsletterVariant::Pivot5 => {
                let result = compile::run(&deps, issue_id.as_deref()).await?;
                info!(compiled = result.compiled, "Compile complete");
            }
            NewsletterVariant::Signal => {
                let result = signal_compile::run(&deps, issue_id.as_deref()).await?;
                info!(compiled = result.compiled, "Signal compile complete");
            }
        },
        Command::Send => {
            let result = send::run(&deps).await?;
            info!(sent = result.sent, "Send complete");
        }
        Command::ScheduledCheck => {
            let result = scheduled_send::run(&deps).await?;
            info!(triggered = result.triggered.len(), "Scheduled sweep complete");
        }
        Command::Schedule => run_scheduler(Arc::new(deps)).await?,
    }

    Ok(())
}

/// Cron daemon: three pipeline cycles per day, selection and production
/// triggers on publishing nights, and the five-minute scheduled-send sweep.
/// Times are UTC expressions of the Eastern editorial schedule.
async fn run_scheduler(deps: Arc<Deps>) -> Result<()> {
    let scheduler = JobScheduler::new().await?;

    // Pipeline cycles: overnight, morning publications, end-of-day.
    for cron in ["0 0 7 * * *", "0 30 14 * * *", "0 0 22 * * *"] {
        let deps = deps.clone();
        scheduler
            .add(Job::new_async(cron, move |_id, _sched| {
                let deps = deps.clone();
                Box::pin(async move {
                    if let Err(e) = pipeline::run_full_pipeline(&deps, deps.config.ingest_window_hours).await {
                        error!(error = %e, "Pipeline cycle failed");
                    }
                })
            })?)
            .await?;
    }

    // Selection Tue-Sat (Mon-Fri issues, Eastern evenings).
    let selection_deps = deps.clone();
    scheduler
        .add(Job::new_async("0 55 4 * * Tue-Sat", move |_id, _sched| {
            let deps = selection_deps.clone();
            Box::pin(async move {
                if let Err(e) = selection::run(&deps).await {
                    error!(error = %e, "Selection failed");
                }
                if let Err(e) = signal_selection::run(&deps).await {
                    error!(error = %e, "Signal selection failed");
                }
            })
        })?)
        .await?;

    // Decoration and imagery.
    let decorate_deps = deps.clone();
    scheduler
        .add(Job::new_async("0 25 2 * * Tue-Sat", move |_id, _sched| {
            let deps = decorate_deps.clone();
            Box::pin(async move {
                if let Err(e) = decoration::run(&deps).await {
                    error!(error = %e, "Decoration failed");
                }
                if let Err(e) = signal_decoration::run(&deps).await {
                    error!(error = %e, "Signal decoration failed");
                }
            })
        })?)
        .await?;
    let imagery_deps = deps.clone();
    scheduler
        .add(Job::new_async("0 30 2 * * Tue-Sat", move |_id, _sched| {
            let deps = imagery_deps.clone();
            Box::pin(async move {
                if let Err(e) = imagery::run(&deps).await {
                    error!(error = %e, "Imagery failed");
                }
            })
        })?)
        .await?;

    // Compile after imagery settles.
    let compile_deps = deps.clone();
    scheduler
        .add(Job::new_async("0 0 4 * * Tue-Sat", move |_id, _sched| {
            let deps = compile_deps.clone();
            Box::pin(async move {
                if let Err(e) = compile::run(&deps, None).await {
                    error!(error = %e, "Compile failed");
                }
                if let Err(e) = signal_compile::run(&deps, None).await {
                    error!(error = %e, "Signal compile failed");
                }
            })
        })?)
        .await?;

    // Morning send.
    let send_deps = deps.clone();
    scheduler
        .add(Job::new_async("0 0 10 * * Mon-Fri", move |_id, _sched| {
            let deps = send_deps.clone();
            Box::pin(async move {
                if let Err(e) = send::run(&deps).await {
                    error!(error = %e, "Send failed");
                }
            })
        })?)
        .await?;

    // Scheduled-send sweep every five minutes.
    let sweep_deps = deps.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_id, _sched| {
            let deps = sweep_deps.clone();
            Box::pin(async move {
                if let Err(e) = scheduled_send::run(&deps).await {
                    error!(error = %e, "Scheduled sweep failed");
                }
            })
        })?)
        .await?;

    scheduler.start().await?;
    info!("Scheduler running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    Ok(())
}
