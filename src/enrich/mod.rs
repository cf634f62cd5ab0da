//! The enrichment pass: fetch, extract and inject article content into the
//! items of a feed.
//!
//! Every item that does not yet carry the marker is resolved through the
//! cache: on a miss the linked page is fetched and run through the
//! [`Extractor`]. Failures never abort the pass; the item gets a placeholder
//! instead, and that placeholder is what gets cached for the link.
//!
//! An enriched description looks like:
//!
//! ```text
//! {original}<br/><!-- hnss:readable-content --><hr/>{article html or placeholder}
//! ```

pub mod batch;

use bytes::Bytes;

use crate::content::{Extractor, Fetch, HttpFetcher};
use crate::feed::{FeedDocument, FeedItem, MARKER_TAG};
use crate::storage::Cache;

/// Injected when the article could not be downloaded.
pub const RETRIEVE_PLACEHOLDER: &str = "Unable to retrieve article";

/// Injected when the page was downloaded but holds no readable article.
pub const EXTRACT_PLACEHOLDER: &str = "Unable to extract article";

/// Number of items processed together when none is configured.
pub const DEFAULT_PARALLELISM: usize = 20;

/// Counters for one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub total: usize,
    /// Items that already carried the marker
    pub skipped: usize,
    /// Items that received article content
    pub enriched: usize,
    /// Items that received a placeholder
    pub placeholders: usize,
    /// Size of each concurrent group, in processing order
    pub group_sizes: Vec<usize>,
}

#[derive(Debug)]
pub struct EnrichOutcome {
    pub document: FeedDocument,
    pub stats: EnrichStats,
}

impl EnrichOutcome {
    /// Whether any item's description was modified.
    pub fn changed(&self) -> bool {
        self.stats.enriched + self.stats.placeholders > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Skipped,
    Enriched,
    Placeholder,
}

/// Enriches feed documents using a fetcher, a cache and an extractor.
pub struct Enricher<F = HttpFetcher> {
    fetcher: F,
    cache: Cache,
    extractor: Extractor,
    parallelism: usize,
}

impl<F: Fetch> Enricher<F> {
    pub fn new(fetcher: F, cache: Cache) -> Self {
        Self {
            fetcher,
            cache,
            extractor: Extractor::new(),
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Sets how many items are fetched concurrently (minimum 1).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Runs one enrichment pass over `document`.
    ///
    /// Items keep their count and order. Items already carrying the marker
    /// are passed through untouched and never fetched, so running the pass
    /// twice changes nothing the second time.
    pub async fn enrich(&self, document: FeedDocument) -> EnrichOutcome {
        let items = document.items().to_vec();
        let mut stats = EnrichStats {
            total: items.len(),
            group_sizes: batch::group_sizes(items.len(), self.parallelism),
            ..EnrichStats::default()
        };

        let results =
            batch::process_in_groups(items, self.parallelism, move |item| self.enrich_item(item))
                .await;

        let mut enriched = Vec::with_capacity(results.len());
        for (item, outcome) in results {
            match outcome {
                ItemOutcome::Skipped => stats.skipped += 1,
                ItemOutcome::Enriched => stats.enriched += 1,
                ItemOutcome::Placeholder => stats.placeholders += 1,
            }
            enriched.push(item);
        }

        tracing::info!(
            total = stats.total,
            skipped = stats.skipped,
            enriched = stats.enriched,
            placeholders = stats.placeholders,
            "Enrichment pass complete"
        );

        EnrichOutcome {
            document: document.with_items(enriched),
            stats,
        }
    }

    async fn enrich_item(&self, item: FeedItem) -> (FeedItem, ItemOutcome) {
        if item.is_enriched() {
            tracing::debug!(url = item.link(), "Already enriched, skipping");
            return (item, ItemOutcome::Skipped);
        }

        let link = item.link().to_string();
        let content = self
            .cache
            .with_cache(&link, || self.retrieve(&link))
            .await
            .unwrap_or_else(|never| match never {});

        let outcome = if is_placeholder(&content) {
            ItemOutcome::Placeholder
        } else {
            ItemOutcome::Enriched
        };

        let description = format!(
            "{}<br/><!-- {MARKER_TAG} --><hr/>{}",
            item.description(),
            String::from_utf8_lossy(&content)
        );
        (item.with_description(description), outcome)
    }

    /// Fetches and extracts `link`, substituting a placeholder on failure.
    async fn retrieve(&self, link: &str) -> Result<Bytes, std::convert::Infallible> {
        tracing::debug!(url = link, "Cache miss");

        let page = match self.fetcher.fetch(link).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url = link, error = %e, "Failed to retrieve article");
                return Ok(Bytes::from_static(RETRIEVE_PLACEHOLDER.as_bytes()));
            }
        };

        match self.extractor.extract(link, &page) {
            Ok(article) => {
                tracing::info!(url = link, title = %article.title, "Fetched article");
                Ok(Bytes::from(article.content))
            }
            Err(e) => {
                tracing::warn!(url = link, error = %e, "Failed to extract article");
                Ok(Bytes::from_static(EXTRACT_PLACEHOLDER.as_bytes()))
            }
        }
    }
}

fn is_placeholder(content: &[u8]) -> bool {
    content == RETRIEVE_PLACEHOLDER.as_bytes() || content == EXTRACT_PLACEHOLDER.as_bytes()
}
