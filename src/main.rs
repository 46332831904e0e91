//! # Lux Scraper
//!
//! A scheduled scraping daemon that collects luxury and semiconductor news
//! from a fixed set of web pages and feeds into a shared article store.
//!
//! ## Features
//!
//! - Fourteen sources: rendered listing pages, static HTML and RSS feeds
//! - Continuous mode with weighted random source selection, human-like
//!   pacing and progressive deep scraping of article bodies
//! - Batch mode for cron use, with per-source exponential backoff, email
//!   alerts and a single deduplicated sync at the end
//! - JSON file store for local runs, Supabase for deployments
//!
//! ## Usage
//!
//! ```sh
//! lux_scraper daemon
//! lux_scraper --store supabase run --now
//! lux_scraper probe --source "Hacker News"
//! ```
//!
//! ## Architecture
//!
//! 1. **Sources**: a declarative registry consumed by one extraction engine
//! 2. **Scheduling**: continuous or batch state machine, one source at a time
//! 3. **Persistence**: URL-keyed upserts that never revert deep-scrape state
//! 4. **Shutdown**: signals raise a flag observed between steps

use clap::Parser;
use reqwest::Client;
use std::error::Error;
use tracing::{debug, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod backoff;
mod cli;
mod config;
mod error;
mod extract;
mod models;
mod notify;
mod probe;
mod random;
mod render;
mod scheduler;
mod scrapers;
mod shutdown;
mod store;
mod utils;

use backoff::BackoffTracker;
use cli::{Cli, Command, StoreKind};
use config::ScraperConfig;
use error::InitError;
use notify::Alerts;
use random::OsRandom;
use render::http::build_client;
use render::PageRenderer;
use scheduler::batch::Batch;
use scheduler::daemon::Daemon;
use scrapers::{find_source, registry, Scrapers, SourceEntry};
use shutdown::{listen_for_signals, Shutdown};
use store::{FileStore, Store, SupabaseStore};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "lux_scraper starting up");

    let args = Cli::parse();
    debug!(command = ?args.command, store = ?args.store, "Parsed CLI arguments");

    let config = ScraperConfig::load(args.config.as_deref()).await?;
    let client = build_client()?;
    let shutdown = Shutdown::new();
    let signals = listen_for_signals(shutdown.clone());

    match &args.command {
        Command::Daemon => {
            let store = open_store(&args, &client).await?;
            let scrapers = Scrapers::new(client.clone(), make_renderer(&client, true), config.clone());
            info!(store = ?args.store, "Mode: continuous with deep scraping");
            Daemon::new(
                registry(),
                &scrapers,
                &scrapers,
                &store,
                &config,
                shutdown.clone(),
                OsRandom::new(),
            )
            .run()
            .await;
            scrapers.renderer().shutdown().await;
        }
        Command::Run { now } => {
            let store = open_store(&args, &client).await?;
            let alerts = Alerts::from_settings(
                client.clone(),
                args.resend_api_key.clone(),
                args.alert_email.clone(),
            );
            let scrapers = Scrapers::new(client.clone(), make_renderer(&client, false), config.clone());
            let jitter = args.is_production() && !now;
            info!(store = ?args.store, jitter, "Mode: batch");
            let batch = Batch {
                sources: registry(),
                runner: &scrapers,
                store: &store,
                notifier: &alerts,
                config: &config,
                shutdown: &shutdown,
            };
            let mut backoff = BackoffTracker::new(config.max_backoff_hours);
            let summary = batch.run(&mut OsRandom::new(), &mut backoff, jitter).await;
            if summary.interrupted {
                info!("Batch run interrupted by shutdown");
            }
            scrapers.renderer().shutdown().await;
        }
        Command::Probe { source } => {
            let targets: Vec<&SourceEntry> = match source {
                Some(name) => vec![find_source(name)?],
                None => registry().iter().collect(),
            };
            let scrapers = Scrapers::new(client.clone(), make_renderer(&client, false), config.clone());
            let report = probe::probe(&scrapers, &targets, &shutdown).await;
            scrapers.renderer().shutdown().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    signals.abort();
    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn open_store(args: &Cli, client: &Client) -> Result<Store, InitError> {
    match args.store {
        StoreKind::File => Ok(Store::File(FileStore::open(&args.data_dir).await?)),
        StoreKind::Supabase => {
            let url = args
                .supabase_url
                .as_deref()
                .ok_or_else(|| InitError::Store("SUPABASE_URL is not set".into()))?;
            let key = args.supabase_key.as_deref().unwrap_or_default();
            Ok(Store::Supabase(SupabaseStore::new(client.clone(), url, key)?))
        }
    }
}

#[cfg(feature = "chromium")]
fn make_renderer(_client: &Client, shared: bool) -> render::chromium::ChromiumRenderer {
    use render::chromium::SessionMode;
    let mode = if shared {
        SessionMode::Shared
    } else {
        SessionMode::PerCall
    };
    render::chromium::ChromiumRenderer::new(mode)
}

#[cfg(not(feature = "chromium"))]
fn make_renderer(client: &Client, _shared: bool) -> render::HttpRenderer {
    render::HttpRenderer::new(client.clone())
}
