//! One run over every feed file matched by the configured glob.
//!
//! Files are processed strictly one after another, in lexicographic path
//! order. Per-item failures are absorbed by the enricher; anything that makes
//! a whole file unusable (unreadable, malformed, wrong shape) stops the run,
//! leaving later files untouched.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::Instrument;

use crate::config::{Config, ConfigError};
use crate::content::{Fetch, FetchError, HttpFetcher};
use crate::enrich::Enricher;
use crate::feed::{DocumentError, FeedDocument};
use crate::storage::Cache;
use crate::util::write_atomic;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid feeds pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] FetchError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid feed {}: {source}", path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

/// Totals across all processed files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    pub items: usize,
    pub enriched: usize,
    pub placeholders: usize,
    pub skipped: usize,
    /// Files rewritten on disk
    pub written: usize,
}

/// Processes every feed file matched by `config.feeds`.
///
/// # Errors
///
/// Fails on an invalid configuration or glob pattern, and on the first feed
/// file that cannot be read, parsed or written. Files before the failing one
/// keep whatever was already written.
pub async fn run(config: &Config) -> Result<RunSummary, RunError> {
    config.validate()?;
    let pattern = config.feeds.as_deref().ok_or(ConfigError::Missing("feeds"))?;

    let paths = feed_paths(pattern)?;
    if paths.is_empty() {
        tracing::warn!(pattern, "No feed files matched");
    }

    let fetcher = HttpFetcher::with_user_agent(
        &config.user_agent,
        config.fetch_limits(),
        config.host_policy(),
    )?;
    let cache = Cache::from_dir(config.cache_dir.clone()).await;
    let enricher = Enricher::new(fetcher, cache).with_parallelism(config.parallelism);

    let mut summary = RunSummary::default();
    for path in &paths {
        let span = tracing::info_span!("feed", path = %path.display());
        process_file(&enricher, path, config.write, &mut summary)
            .instrument(span)
            .await?;
    }

    tracing::info!(
        files = summary.files,
        items = summary.items,
        enriched = summary.enriched,
        placeholders = summary.placeholders,
        written = summary.written,
        "Run complete"
    );
    Ok(summary)
}

/// Files matched by `pattern`, sorted by path.
fn feed_paths(pattern: &str) -> Result<Vec<PathBuf>, RunError> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = entry.map_err(|e| RunError::Io {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn process_file<F: Fetch>(
    enricher: &Enricher<F>,
    path: &Path,
    write: bool,
    summary: &mut RunSummary,
) -> Result<(), RunError> {
    let xml = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RunError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let document = FeedDocument::parse(&xml).map_err(|source| RunError::Document {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(items = document.items().len(), "Updating feed");
    let outcome = enricher.enrich(document).await;

    summary.files += 1;
    summary.items += outcome.stats.total;
    summary.enriched += outcome.stats.enriched;
    summary.placeholders += outcome.stats.placeholders;
    summary.skipped += outcome.stats.skipped;

    if !outcome.changed() {
        tracing::debug!("No new items, feed left as is");
        return Ok(());
    }
    if !write {
        tracing::info!("Dry run, feed not written");
        return Ok(());
    }

    let xml = outcome
        .document
        .to_xml()
        .map_err(|source| RunError::Document {
            path: path.to_path_buf(),
            source,
        })?;
    write_atomic(path, xml.as_bytes())
        .await
        .map_err(|source| RunError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    summary.written += 1;
    tracing::info!("Wrote feed");
    Ok(())
}
