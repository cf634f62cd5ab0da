//! Article retrieval and readable-content extraction.
//!
//! - `fetcher` - size- and time-bounded HTTP fetching into memory
//! - `readability` - decoding, the paragraph gate and the [`Extractor`]
//! - `scoring` - Readability-based content isolation behind [`ContentScorer`]
//!
//! # Example
//!
//! ```ignore
//! use readable_feeds::content::{Extractor, Fetch, FetchLimits, HttpFetcher};
//! use readable_feeds::util::HostPolicy;
//!
//! let fetcher = HttpFetcher::new(reqwest::Client::new(), FetchLimits::default(), HostPolicy::PublicOnly);
//! let html = fetcher.fetch("https://example.com/post").await?;
//! let article = Extractor::new().extract("https://example.com/post", &html)?;
//! ```

mod fetcher;
mod readability;
mod scoring;

pub use fetcher::{
    Fetch, FetchError, FetchLimits, HttpFetcher, DEFAULT_MAX_BYTES, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use readability::{Article, ExtractError, Extractor};
pub use scoring::{ContentScorer, ReadabilityScorer};
