use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use readable_feeds::Config;

#[derive(Parser, Debug)]
#[command(
    name = "readable-feeds",
    version,
    about = "Enriches RSS feeds with the readable content of each linked article"
)]
struct Args {
    /// TOML config file; command-line flags take precedence over its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Glob pattern identifying the feeds that should be processed
    #[arg(short, long, value_name = "GLOB")]
    feeds: Option<String>,

    /// Directory where downloaded articles are cached (no caching if not specified)
    #[arg(short, long, alias = "cacheDir", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Rewrite the feed files; without it articles are fetched and cached only
    #[arg(long)]
    write: bool,

    /// Max milliseconds to wait for one article before failing that item
    #[arg(long, alias = "fetchTimeout", value_name = "MS")]
    fetch_timeout: Option<u64>,

    /// Max size in bytes of a fetched page, otherwise that item is failed
    #[arg(long, alias = "fetchMaxSize", value_name = "BYTES")]
    fetch_max_size: Option<u64>,

    /// Number of articles fetched at once
    #[arg(short = 'j', long, value_name = "N")]
    parallelism: Option<usize>,

    /// User-Agent header sent with article requests
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Allow links pointing at localhost or private network addresses
    #[arg(long)]
    allow_private_hosts: bool,
}

impl Args {
    /// Layers the command-line flags over `config`.
    fn apply(self, mut config: Config) -> Config {
        if let Some(feeds) = self.feeds {
            config.feeds = Some(feeds);
        }
        if let Some(dir) = self.cache_dir {
            config.cache_dir = Some(dir);
        }
        if self.write {
            config.write = true;
        }
        if let Some(ms) = self.fetch_timeout {
            config.fetch_timeout = ms;
        }
        if let Some(bytes) = self.fetch_max_size {
            config.fetch_max_size = bytes;
        }
        if let Some(n) = self.parallelism {
            config.parallelism = n;
        }
        if let Some(ua) = self.user_agent {
            config.user_agent = ua;
        }
        if self.allow_private_hosts {
            config.block_private_hosts = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Default to info-level output when RUST_LOG is not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = Args::parse();

    let config = match args.config.take() {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
        None => Config::default(),
    };
    let config = args.apply(config);
    config.validate().context("Invalid configuration")?;

    let summary = match readable_feeds::run(&config).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            return Err(e).context("Failed to enrich feeds");
        }
    };

    println!(
        "Processed {} feeds ({} items): {} enriched, {} placeholders, {} already enriched, {} files written",
        summary.files,
        summary.items,
        summary.enriched,
        summary.placeholders,
        summary.skipped,
        summary.written
    );
    Ok(())
}
