//! cache-warmup - pre-populates the file cache
//!
//! Fetches each URL through the retrying HTTP client and stores the JSON
//! body in the file cache under a key derived from the URL.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{error, info};

use fetchcache::cache::{file_key, FileCache};
use fetchcache::{telemetry, Config, HttpClient};

#[derive(Parser)]
#[command(name = "cache-warmup")]
#[command(about = "Fetch JSON endpoints and store them in the file cache", long_about = None)]
struct Cli {
    /// Maximum number of requests in flight
    #[arg(short, long, default_value_t = 5)]
    concurrency: usize,

    /// Cache directory, overrides CACHE_DIR
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// URLs to fetch
    #[arg(required = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("Application error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs the warmup and returns the number of failed URLs.
async fn run(cli: Cli) -> Result<usize> {
    let mut config = Config::from_env();
    if let Some(dir) = cli.dir {
        config.cache_dir = dir;
    }
    let _guard = telemetry::init(&config).context("failed to initialise logging")?;

    let client = HttpClient::new(config.http_config()).context("failed to build HTTP client")?;
    let files = FileCache::new(&config.cache_dir);
    let concurrency = cli.concurrency.max(1);

    info!(
        "Warming {} URL(s) into {} (concurrency={})",
        cli.urls.len(),
        files.dir().display(),
        concurrency
    );
    let started = Instant::now();

    let results: Vec<bool> = stream::iter(cli.urls)
        .map(|url| {
            let client = client.clone();
            let files = &files;
            async move { warm(&client, files, &url).await }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let succeeded = results.iter().filter(|ok| **ok).count();
    let failed = results.len() - succeeded;
    let rate = if results.is_empty() {
        0.0
    } else {
        succeeded as f64 / results.len() as f64 * 100.0
    };

    info!(
        "Warmup finished in {:.2}s: {} succeeded, {} failed ({:.1}%)",
        started.elapsed().as_secs_f64(),
        succeeded,
        failed,
        rate
    );

    Ok(failed)
}

async fn warm(client: &HttpClient, files: &FileCache, url: &str) -> bool {
    let body = match client.get(url).send().await {
        Ok(response) => response.json::<Value>().await,
        Err(e) => Err(e),
    };

    match body {
        Ok(json) => {
            let key = file_key(url);
            if files.store(&key, &json) {
                info!("Cached {} as {}", url, key);
                true
            } else {
                error!("Fetched {} but could not store it", url);
                false
            }
        }
        Err(e) => {
            error!("Failed to warm {}: {}", url, e);
            false
        }
    }
}
