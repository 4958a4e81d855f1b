//! jobfeed - Aggregate job listings into enriched records
//!
//! Fetches a page of listings from the upstream API, enriches each listing
//! with its detail through the cache, and prints the records as JSON.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobfeed::cache::{CacheManager, CacheStore, FileStore, MemoryStore};
use jobfeed::cli::{Cli, Mode, StartupConfig};
use jobfeed::config::Config;
use jobfeed::schedule::{RunHandle, RunMessage, ScheduleConfig};
use jobfeed::{Aggregator, EnrichedRecord, UpstreamClient};

/// Logs go to stderr so stdout carries only the JSON output
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobfeed=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Builds the cache store selected by the flags and config
fn build_store(config: &Config, memory_cache: bool) -> Result<Arc<dyn CacheStore>, Box<dyn Error>> {
    if memory_cache {
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = match &config.cache.dir {
        Some(dir) => FileStore::with_dir(dir.clone()),
        None => FileStore::new().ok_or(
            "could not determine a cache directory; use --cache-dir or --memory-cache",
        )?,
    };
    info!(dir = %store.dir().display(), "using on-disk cache");
    Ok(Arc::new(store))
}

fn print_records(records: &[EnrichedRecord]) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

/// Aggregates on an interval until Ctrl-C, printing each successful run
///
/// A failed run leaves the last good output as the current one.
async fn watch(aggregator: Aggregator, config: ScheduleConfig) -> Result<(), Box<dyn Error>> {
    let mut handle = RunHandle::spawn(aggregator, config);

    loop {
        tokio::select! {
            message = handle.recv() => match message {
                Some(RunMessage::Started) => info!("aggregation run started"),
                Some(RunMessage::Completed(aggregation)) => print_records(&aggregation.records)?,
                Some(RunMessage::Failed(reason)) => {
                    error!(reason = %reason, "aggregation run failed")
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let startup = StartupConfig::from_cli(&cli)?;
    let config = startup.config;

    let store = build_store(&config, startup.memory_cache)?;
    let cache = CacheManager::new(store, config.environment.clone())
        .with_ttl_policy(config.ttl_policy());

    match startup.mode {
        Mode::HealthCheck => {
            let status = cache.health_check().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.healthy {
                return Err(format!("cache unhealthy: {}", status.message).into());
            }
            return Ok(());
        }
        Mode::ClearCache => {
            let removed = cache.clear().await;
            println!("removed {} cache entries", removed);
            return Ok(());
        }
        Mode::Once | Mode::Watch { .. } => {}
    }

    let client = UpstreamClient::new(config.base_url.clone())
        .with_retry_policy(config.retry_policy())
        .with_batch_options(config.batch_options());
    let aggregator =
        Aggregator::new(cache, Arc::new(client)).with_options(config.aggregate_options());

    if let Mode::Watch { interval_secs } = startup.mode {
        let schedule = ScheduleConfig {
            interval: Duration::from_secs(interval_secs),
            max_records: config.max_records,
        };
        return watch(aggregator, schedule).await;
    }

    let records = aggregator.aggregate(config.max_records).await?;
    print_records(&records)
}
