//! Pictor CLI - classify locators and drive the resource cache from a shell.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pictor_core::config::PathsConfig;
use pictor_core::{classify, CacheConfig, CacheStore, HttpFetcher, ResourceLoader, SqliteProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "pictor")]
#[command(about = "Classify resource locators and manage the network resource cache")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// JSON file with cache settings; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the cache databases
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Cache namespace
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Days before a cached resource is fetched again
    #[arg(long, global = true)]
    stale_days: Option<u64>,

    /// Maximum number of cached resources
    #[arg(long, global = true)]
    max_entries: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resource kind of each locator
    Classify {
        #[arg(required = true)]
        locators: Vec<String>,
    },
    /// Load a resource, through the cache when it is remote
    Load {
        locator: String,

        /// Write the bytes to this file instead of printing a summary
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Base directory for relative asset locators
        #[arg(long)]
        asset_root: Option<PathBuf>,
    },
    /// Show cache statistics
    Stats,
    /// Delete expired entries
    Sweep,
    /// Delete every cached entry
    Clear,
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

fn build_config(args: &Args) -> Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CacheConfig::default(),
    };

    if let Some(namespace) = &args.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(days) = args.stale_days {
        let secs = days
            .checked_mul(SECS_PER_DAY)
            .with_context(|| format!("--stale-days {} is too large", days))?;
        config.stale_period = Duration::from_secs(secs);
    }
    if let Some(max_entries) = args.max_entries {
        config.max_entries = max_entries;
    }

    config.validate()?;
    Ok(config)
}

fn cache_dir(args: &Args) -> PathBuf {
    args.cache_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(PathsConfig::CACHE_DIR_NAME)
    })
}

fn open_store(args: &Args) -> Result<CacheStore> {
    let config = build_config(args)?;
    let provider = SqliteProvider::new(cache_dir(args));
    debug!("Cache directory: {}", provider.cache_dir().display());

    let fetcher = Arc::new(HttpFetcher::new()?);
    let store = CacheStore::open(&config, &provider, fetcher)?;
    if store.is_degraded() {
        info!(
            "Primary cache '{}' was unusable, running on '{}'",
            config.namespace,
            store.namespace()
        );
    }
    Ok(store)
}

fn classify_lines(locators: &[String]) -> Vec<String> {
    locators
        .iter()
        .map(|locator| format!("{}\t{}", classify(locator), locator))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    // Output below is the command's result (intentional stdout)
    match &args.command {
        Command::Classify { locators } => {
            for line in classify_lines(locators) {
                println!("{}", line);
            }
        }
        Command::Load {
            locator,
            out,
            asset_root,
        } => {
            let store = Arc::new(open_store(&args)?);
            let mut loader = ResourceLoader::new(store);
            if let Some(root) = asset_root {
                loader = loader.with_asset_root(root);
            }

            let resource = loader.load(locator).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(path, &resource.bytes)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("Wrote {} bytes to {}", resource.bytes.len(), path.display());
                }
                None => println!("{}\t{} bytes", resource.kind, resource.bytes.len()),
            }
        }
        Command::Stats => {
            let stats = open_store(&args)?.stats()?;
            println!("namespace:    {}", stats.namespace);
            println!("entries:      {}/{}", stats.entry_count, stats.max_entries);
            println!("size:         {} bytes", stats.total_size_bytes);
            println!("stale after:  {:?}", stats.stale_period);
            println!("degraded:     {}", stats.degraded);
        }
        Command::Sweep => {
            let swept = open_store(&args)?.sweep_expired()?;
            println!("Removed {} expired entries", swept);
        }
        Command::Clear => {
            let cleared = open_store(&args)?.clear()?;
            println!("Removed {} entries", cleared);
        }
    }

    Ok(())
}
