use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod assessment;
mod config;
mod error;
mod extract;
mod fingerprint;
mod ledger;
mod logging;
mod notify;
mod orchestrator;
mod processor;
mod sources;
mod storage;
mod types;

use crate::assessment::{AssessmentApi, HttpAssessmentClient};
use crate::config::Config;
use crate::ledger::sqlite::SqliteLedgerStore;
use crate::ledger::EventLedger;
use crate::notify::{Notifier, NullNotifier, WebhookNotifier};
use crate::orchestrator::BatchRunner;
use crate::processor::SessionProcessor;
use crate::sources::HttpCalendarFeed;
use crate::storage::FsBuildFileStore;
use crate::types::CalendarSource;

#[derive(Parser)]
#[command(name = "buildflow")]
#[command(about = "Coaching-session automation: provisions client Build Files")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one batch of calendar events
    Run,
    /// Print ledger aggregate statistics
    Stats,
    /// Remove ledger rows past the retention horizon
    Prune,
    /// Drop every ledger row
    Reset {
        /// Required safety latch
        #[arg(long)]
        yes: bool,
    },
}

fn open_ledger(config: &Config) -> anyhow::Result<EventLedger> {
    let store = SqliteLedgerStore::open(&config.ledger.path)?;
    Ok(EventLedger::new(
        Arc::new(store),
        config.ledger.dedupe_enabled,
    ))
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    match std::env::var("NOTIFY_WEBHOOK_URL") {
        Ok(url) if !url.trim().is_empty() => Arc::new(WebhookNotifier::new(
            &url,
            config.notifications.clone(),
        )),
        _ => {
            warn!("NOTIFY_WEBHOOK_URL not set, notifications disabled");
            Arc::new(NullNotifier)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.config)?);

    match cli.command {
        Commands::Run => {
            println!("🔄 Running batch...");
            let ledger = open_ledger(&config)?;

            let sources: Vec<Box<dyn CalendarSource>> = config
                .monitoring
                .calendar_feeds
                .iter()
                .enumerate()
                .map(|(i, url)| {
                    Box::new(HttpCalendarFeed::new(&format!("feed-{i}"), url))
                        as Box<dyn CalendarSource>
                })
                .collect();
            if sources.is_empty() {
                warn!("No calendar feeds configured; nothing to do");
            }

            let assessment: Arc<dyn AssessmentApi> = Arc::new(HttpAssessmentClient::from_env(
                Duration::from_secs(config.assessment.timeout_seconds),
            )?);
            let files = Arc::new(FsBuildFileStore::open(&config.build_file.storage_dir)?);
            let processor = SessionProcessor::new(files, assessment, config.clone());
            let notifier = build_notifier(&config);

            let runner = BatchRunner::new(sources, ledger, processor, notifier, config.clone());
            let summary = runner.run().await;

            println!("\n📊 Batch results:");
            println!("   Fetched: {}", summary.fetched);
            println!("   Processed: {}", summary.processed);
            println!("   Already processed: {}", summary.already_processed);
            println!("   Unmatched: {}", summary.unmatched);
            println!("   Errors: {}", summary.errors.len());
            if !summary.errors.is_empty() {
                println!("\n⚠️  Errors encountered:");
                for e in &summary.errors {
                    println!("   - {e}");
                }
            }
        }
        Commands::Stats => {
            let ledger = open_ledger(&config)?;
            let stats = ledger.stats().await?;
            println!("📒 Ledger statistics:");
            println!("   Total rows: {}", stats.total);
            println!("   Phase 1: {}", stats.phase1);
            println!("   Phase 2: {}", stats.phase2);
            println!("   With email: {}", stats.with_email);
            println!("   With Build File: {}", stats.with_build_file);
        }
        Commands::Prune => {
            let ledger = open_ledger(&config)?;
            let horizon = chrono::Duration::days(config.ledger.retention_days);
            let removed = ledger.prune_older_than(horizon).await?;
            info!(removed, "Pruned ledger");
            println!("🧹 Removed {removed} rows past the retention horizon");
        }
        Commands::Reset { yes } => {
            if !yes {
                error!("Refusing to reset the ledger without --yes");
                println!("❌ Pass --yes to drop every ledger row");
                std::process::exit(1);
            }
            let ledger = open_ledger(&config)?;
            ledger.reset().await?;
            println!("🗑️  Ledger reset");
        }
    }
    Ok(())
}
