//! Main-content isolation for pages that passed the paragraph gate.
//!
//! The default scorer runs Mozilla's Readability algorithm through
//! `dom_smoothie`: candidate containers are scored by paragraph density,
//! class/id hints and link density, siblings of the winner are merged in, and
//! the result is cleaned with relative links resolved against the page URL.

use dom_smoothie::{Config, Readability};

use super::readability::Article;

/// Extracted bodies with less text than this are not considered readable.
const MIN_ARTICLE_TEXT_LEN: usize = 140;

/// Upper bound on elements Readability will walk in one page.
const MAX_ELEMENTS_TO_PARSE: usize = 9000;

/// Isolates the readable content of an HTML page.
///
/// Implementations return `None` when no usable content block exists.
pub trait ContentScorer {
    fn score(&self, html: &str, url: Option<&str>) -> Option<Article>;
}

/// [`ContentScorer`] backed by `dom_smoothie`'s Readability port.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadabilityScorer;

impl ContentScorer for ReadabilityScorer {
    fn score(&self, html: &str, url: Option<&str>) -> Option<Article> {
        let cfg = Config {
            max_elements_to_parse: MAX_ELEMENTS_TO_PARSE,
            ..Default::default()
        };

        let mut readability = match Readability::new(html, url, Some(cfg)) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url, error = %e, "Readability rejected document");
                return None;
            }
        };
        let article = match readability.parse() {
            Ok(article) => article,
            Err(e) => {
                tracing::debug!(url, error = %e, "Readability found no content");
                return None;
            }
        };

        let text_len = article.text_content.trim().chars().count();
        if text_len < MIN_ARTICLE_TEXT_LEN {
            tracing::debug!(url, text_len, "Extracted content too short");
            return None;
        }

        Some(Article {
            title: article.title.trim().to_string(),
            content: article.content.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://news.example.org/2024/03/compilers";

    fn page(body: &str) -> String {
        format!(
            "<!DOCTYPE html><html><head><title>How Compilers Optimize Loops</title></head>\
             <body>{body}</body></html>"
        )
    }

    fn long_article() -> &'static str {
        r#"<nav class="menu"><a href="/">Home</a> <a href="/topics">Topics</a></nav>
        <article>
          <h1>How Compilers Optimize Loops</h1>
          <p>Loop optimizations are among the oldest tricks in a compiler's toolbox, and they
             still account for a large share of the speedups seen in numeric code today.</p>
          <p>Unrolling, hoisting invariant expressions, and strength reduction each remove a
             little work from every iteration, which adds up quickly in hot loops.</p>
          <p>See <a href="/2024/02/vectorization">the earlier piece on vectorization</a> for
             how the same loops are turned into wide SIMD instructions.</p>
        </article>
        <script>analytics.track();</script>"#
    }

    #[test]
    fn test_extracts_main_content() {
        let article = ReadabilityScorer
            .score(&page(long_article()), Some(PAGE_URL))
            .unwrap();

        assert!(article.title.starts_with("How Compilers Optimize Loops"));
        assert!(article.content.contains("strength reduction"));
        assert!(!article.content.contains("analytics.track"));
        assert!(!article.content.contains("Topics"));
    }

    #[test]
    fn test_relative_links_resolved() {
        let article = ReadabilityScorer
            .score(&page(long_article()), Some(PAGE_URL))
            .unwrap();

        assert!(article
            .content
            .contains("https://news.example.org/2024/02/vectorization"));
    }

    #[test]
    fn test_short_content_is_rejected() {
        let html = page("<p>A single short sentence.</p>");

        assert!(ReadabilityScorer.score(&html, Some(PAGE_URL)).is_none());
    }

    #[test]
    fn test_missing_url_still_extracts() {
        let article = ReadabilityScorer.score(&page(long_article()), None).unwrap();

        assert!(article.content.contains("Unrolling"));
    }
}
