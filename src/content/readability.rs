use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use scraper::{ElementRef, Html};
use thiserror::Error;
use url::Url;

use super::scoring::{ContentScorer, ReadabilityScorer};

/// Documents with fewer `<p>` elements than this are rejected before scoring.
const MIN_PARAGRAPHS: usize = 1;

/// How far into the payload to look for a `charset=` declaration.
const CHARSET_SNIFF_LEN: usize = 1024;

/// Readable version of a web page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    /// Cleaned HTML of the main content block
    pub content: String,
}

/// Why a fetched page could not be turned into an [`Article`].
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Cheap gate: the page has no paragraphs (feeds, PDFs rendered as text, JSON...)
    #[error("Unable to find any <p> tags")]
    NotAnArticle,
    /// The scorer could not isolate a readable content block
    #[error("Unable to create a readable version")]
    NotReadable,
    /// The payload is not a text document
    #[error("Unable to parse document: {0}")]
    ParseError(String),
}

/// Turns raw page bytes into an [`Article`].
///
/// Extraction runs in two stages: a cheap paragraph count that rejects
/// anything that is obviously not an article, then the [`ContentScorer`]
/// which does the expensive work of isolating the main content.
#[derive(Debug, Clone, Default)]
pub struct Extractor<S = ReadabilityScorer> {
    scorer: S,
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: ContentScorer> Extractor<S> {
    pub fn with_scorer(scorer: S) -> Self {
        Self { scorer }
    }

    /// Extracts the readable content of the page fetched from `url`.
    ///
    /// `url` is used to resolve relative links in the extracted content.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::ParseError`] - empty or binary payload
    /// - [`ExtractError::NotAnArticle`] - no `<p>` elements; the scorer is not invoked
    /// - [`ExtractError::NotReadable`] - the scorer found no usable content block
    pub fn extract(&self, url: &str, html: &[u8]) -> Result<Article, ExtractError> {
        let text = decode_html(html)?;
        let document = Html::parse_document(&text);

        // Run a simple heuristic to see if the document is a valid web page or
        // not. This filters out resources such as PDFs or feeds before paying
        // for the scorer.
        if count_paragraphs(&document, MIN_PARAGRAPHS) < MIN_PARAGRAPHS {
            return Err(ExtractError::NotAnArticle);
        }

        let base = Url::parse(url).ok().map(|_| url);
        self.scorer
            .score(&text, base)
            .ok_or(ExtractError::NotReadable)
    }
}

/// Counts `<p>` elements, stopping once `enough` have been seen.
fn count_paragraphs(document: &Html, enough: usize) -> usize {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "p")
        .take(enough)
        .count()
}

/// Decodes page bytes into text.
///
/// UTF-8 is used as is. A page declaring another charset is decoded with it,
/// and an unrecognised label falls back to Windows-1252. Undeclared non-UTF-8
/// input is decoded lossily as long as invalid sequences are rare (under 5%
/// of the payload); a payload dominated by invalid sequences is binary and
/// rejected.
fn decode_html(bytes: &[u8]) -> Result<Cow<'_, str>, ExtractError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ExtractError::ParseError("empty document".to_string()));
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(Cow::Borrowed(text)),
        Err(e) => match declared_encoding(bytes) {
            Some(encoding) if encoding != UTF_8 => {
                let (text, _, _) = encoding.decode(bytes);
                Ok(text)
            }
            _ => {
                let lossy = String::from_utf8_lossy(bytes);
                let invalid = lossy.matches('\u{FFFD}').count();
                if invalid.saturating_mul(20) < bytes.len() {
                    Ok(lossy)
                } else {
                    Err(ExtractError::ParseError(format!(
                        "payload is not text (invalid UTF-8 after byte {})",
                        e.valid_up_to()
                    )))
                }
            }
        },
    }
}

/// Encoding named by the first `charset=` declaration near the top of the
/// page, if any.
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(CHARSET_SNIFF_LEN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();

    let idx = head.find("charset=")?;
    let label: String = head[idx + "charset=".len()..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();

    Some(Encoding::for_label(label.as_bytes()).unwrap_or(WINDOWS_1252))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ARTICLE_URL: &str = "https://blog.example.com/2024/05/ownership";

    /// Wraps the real scorer and counts how often it runs.
    #[derive(Default)]
    struct CountingScorer {
        calls: AtomicUsize,
    }

    impl ContentScorer for CountingScorer {
        fn score(&self, html: &str, url: Option<&str>) -> Option<Article> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ReadabilityScorer.score(html, url)
        }
    }

    fn article_page() -> String {
        r#"<!DOCTYPE html>
<html>
<head><title>Understanding Ownership in Practice | Example Blog</title></head>
<body>
  <nav class="menu"><a href="/">Home</a> <a href="/archive">Archive</a></nav>
  <div class="post-content">
    <h1>Understanding Ownership in Practice</h1>
    <p>Ownership is the feature that makes the language distinctive, and it has deep
       implications for how programs are structured, tested, and maintained over time.</p>
    <p>Every value has a single owner, and when the owner goes out of scope, the value is
       dropped. Borrowing lets code use a value without taking ownership of it, which keeps
       data races out of safe code.</p>
    <p>Read the <a href="/2024/04/borrowing">previous post on borrowing</a> for the basics,
       then come back here for the patterns used in larger code bases.</p>
  </div>
  <footer><p>Copyright 2024, Example Blog, all rights reserved, forever and ever.</p></footer>
  <script>trackPageView();</script>
</body>
</html>"#
            .to_string()
    }

    #[test]
    fn test_extracts_article() {
        let article = Extractor::new()
            .extract(ARTICLE_URL, article_page().as_bytes())
            .unwrap();

        assert!(article.title.starts_with("Understanding Ownership in Practice"));
        assert!(article.content.contains("Every value has a single owner"));
        assert!(article
            .content
            .contains("https://blog.example.com/2024/04/borrowing"));
        assert!(!article.content.contains("Archive"));
        assert!(!article.content.contains("Copyright"));
        assert!(!article.content.contains("trackPageView"));
    }

    #[test]
    fn test_no_paragraphs_is_not_an_article_and_skips_scorer() {
        let extractor = Extractor::with_scorer(CountingScorer::default());
        let html = "<html><body><div>Just a div</div><ul><li>and a list</li></ul></body></html>";

        let result = extractor.extract(ARTICLE_URL, html.as_bytes());

        assert!(matches!(result, Err(ExtractError::NotAnArticle)));
        assert_eq!(extractor.scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_plain_text_payload_is_not_an_article() {
        let extractor = Extractor::with_scorer(CountingScorer::default());
        let payload = b"%PDF-1.4 1 0 obj << /Type /Catalog >> endobj trailer";

        let result = extractor.extract(ARTICLE_URL, payload);

        assert!(matches!(result, Err(ExtractError::NotAnArticle)));
        assert_eq!(extractor.scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scorer_invoked_once_for_candidate_pages() {
        let extractor = Extractor::with_scorer(CountingScorer::default());

        let _ = extractor.extract(ARTICLE_URL, article_page().as_bytes());

        assert_eq!(extractor.scorer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_too_little_content_is_not_readable() {
        let html = "<html><body><p>Too short to be an article.</p></body></html>";

        let result = Extractor::new().extract(ARTICLE_URL, html.as_bytes());

        assert!(matches!(result, Err(ExtractError::NotReadable)));
    }

    #[test]
    fn test_empty_payload_is_parse_error() {
        assert!(matches!(
            Extractor::new().extract(ARTICLE_URL, b""),
            Err(ExtractError::ParseError(_))
        ));
        assert!(matches!(
            Extractor::new().extract(ARTICLE_URL, b"  \n\t "),
            Err(ExtractError::ParseError(_))
        ));
    }

    #[test]
    fn test_binary_payload_is_parse_error() {
        let payload: Vec<u8> = (0..512).map(|i| 0x80 | (i % 0x40) as u8).collect();

        let result = Extractor::new().extract(ARTICLE_URL, &payload);

        assert!(matches!(result, Err(ExtractError::ParseError(_))));
    }

    #[test]
    fn test_latin1_page_is_decoded() {
        let mut page = b"<html><head><meta charset=\"ISO-8859-1\"></head><body><p>Caf".to_vec();
        page.push(0xE9);
        page.extend_from_slice(b"</p></body></html>");

        let text = decode_html(&page).unwrap();
        assert!(text.contains("Caf\u{e9}"));
    }

    #[test]
    fn test_mostly_utf8_page_is_decoded_lossily() {
        let mut page = article_page().into_bytes();
        page.insert(200, 0xFF);

        let text = decode_html(&page).unwrap();
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_windows_1252_punctuation_is_decoded() {
        let mut page = b"<html><head><meta charset=\"windows-1252\"></head><body><p>She said ".to_vec();
        page.extend_from_slice(&[0x93, b'h', b'i', 0x94]);
        page.extend_from_slice(b" and paid 5");
        page.push(0x80);
        page.extend_from_slice(b"</p></body></html>");

        let text = decode_html(&page).unwrap();
        assert!(text.contains("\u{201C}hi\u{201D}"));
        assert!(text.contains("5\u{20AC}"));
        assert!(!text.chars().any(|c| ('\u{80}'..='\u{9F}').contains(&c)));
    }

    #[test]
    fn test_unknown_label_falls_back_to_windows_1252() {
        let mut page = b"<meta charset=\"x-made-up\"><p>caf".to_vec();
        page.push(0xE9);
        page.push(0x97);

        let text = decode_html(&page).unwrap();
        assert!(text.ends_with("caf\u{e9}\u{2014}"));
    }

    #[test]
    fn test_charset_sniffing() {
        assert_eq!(
            declared_encoding(
                b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=windows-1252\">"
            ),
            Some(WINDOWS_1252)
        );
        assert_eq!(
            declared_encoding(b"<meta charset=\"ISO-8859-2\">"),
            Some(encoding_rs::ISO_8859_2)
        );
        assert_eq!(declared_encoding(b"<meta charset=\"utf-8\">"), Some(UTF_8));
        assert_eq!(declared_encoding(b"<p>no declaration</p>"), None);
    }
}
