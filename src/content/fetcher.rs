use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::util::{validate_url, HostPolicy, UrlValidationError};

/// Default cap on a fetched page (5 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Default wall-clock budget for a single fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// User-Agent sent with every article request unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = concat!("readable-feeds/", env!("CARGO_PKG_VERSION"));

/// Transport-level failures while retrieving an article.
///
/// Every variant is recovered per item by the enricher; none of them aborts a
/// run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The deadline elapsed before the full body arrived
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Declared or received size exceeded the cap
    #[error("Response size of {actual} bytes exceeded limit of {max} bytes")]
    TooLarge { actual: u64, max: u64 },
    /// Network-level error (DNS, connection, TLS, reset mid-body, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The item link is not something we are willing to request
    #[error("Invalid link: {0}")]
    InvalidUrl(#[from] UrlValidationError),
}

/// Size and time bounds applied to every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub max_bytes: u64,
    pub timeout: Duration,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Retrieves the raw bytes behind a URL.
///
/// The enricher is generic over this trait so tests can count or script
/// fetches without a network.
pub trait Fetch {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// [`Fetch`] implementation backed by `reqwest`, enforcing [`FetchLimits`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limits: FetchLimits,
    host_policy: HostPolicy,
}

impl HttpFetcher {
    /// Wraps an existing client (allows custom configuration).
    pub fn new(client: reqwest::Client, limits: FetchLimits, host_policy: HostPolicy) -> Self {
        Self {
            client,
            limits,
            host_policy,
        }
    }

    /// Builds a client that identifies itself with `user_agent`.
    pub fn with_user_agent(
        user_agent: &str,
        limits: FetchLimits,
        host_policy: HostPolicy,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::new(client, limits, host_policy))
    }

    async fn fetch_within_deadline(&self, url: url::Url) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let declared = response.content_length();
        read_limited(response.bytes_stream(), declared, self.limits.max_bytes).await
    }
}

impl Fetch for HttpFetcher {
    /// Fetches `url` into memory.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - link failed validation, nothing was sent
    /// - [`FetchError::Timeout`] - connect, headers and body did not finish within the deadline
    /// - [`FetchError::TooLarge`] - declared or streamed size exceeded `max_bytes`
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::Network`] - any other transport failure
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let url = validate_url(url, self.host_policy)?;
        let timeout = self.limits.timeout;

        // The deadline covers the whole exchange; dropping the inner future
        // on expiry closes the connection.
        tokio::time::timeout(timeout, self.fetch_within_deadline(url))
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }
}

/// Collects a body stream into memory, refusing to hold more than `max` bytes.
///
/// A declared length above the cap fails before any chunk is read. While
/// streaming, the chunk that would push the running total past the cap fails
/// the read immediately; the stream is dropped and no further chunks are
/// pulled.
pub(crate) async fn read_limited<S, E>(
    stream: S,
    declared: Option<u64>,
    max: u64,
) -> Result<Bytes, FetchError>
where
    S: Stream<Item = Result<Bytes, E>>,
    FetchError: From<E>,
{
    // Fast path: check Content-Length header
    if let Some(len) = declared {
        if len > max {
            return Err(FetchError::TooLarge { actual: len, max });
        }
    }

    let capacity = declared.unwrap_or(0).min(max);
    let mut body = BytesMut::with_capacity(usize::try_from(capacity).unwrap_or(0));
    let mut stream = std::pin::pin!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        // SEC-003: Use saturating_add to prevent integer overflow in size check
        let received = (body.len() as u64).saturating_add(chunk.len() as u64);
        if received > max {
            return Err(FetchError::TooLarge {
                actual: received,
                max,
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body.freeze())
}
